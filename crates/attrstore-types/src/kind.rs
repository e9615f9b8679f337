//! Value kinds, their capability table, and the broadcast matrix.
//!
//! Both tables are declared once, here. Adding a kind means adding a variant,
//! a row in [`ValueKind::traits`], its broadcast rules in [`can_broadcast`],
//! and an arm in [`crate::dispatch`].

use std::fmt;

/// Runtime tag of a supported value kind.
///
/// Declaration order is the central kind order: it breaks ties during
/// most-complex resolution and fixes the serialized type tags.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(u16)]
pub enum ValueKind {
    Bool = 0,
    Int32 = 1,
    Int64 = 2,
    Float = 3,
    Double = 4,
    Vector2 = 5,
    Vector3 = 6,
    Vector4 = 7,
    Rotator = 8,
    Quat = 9,
    Transform = 10,
    String = 11,
    Name = 12,
}

/// Fixed capability set of a value kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::struct_excessive_bools)]
pub struct KindTraits {
    pub can_min_max: bool,
    pub can_sub_add: bool,
    pub can_mul_div: bool,
    pub can_interpolate: bool,
    /// Values are interned: equal values share a value key.
    pub compress_data: bool,
}

impl KindTraits {
    const NONE: Self = Self {
        can_min_max: false,
        can_sub_add: false,
        can_mul_div: false,
        can_interpolate: false,
        compress_data: false,
    };

    const NUMERIC: Self = Self {
        can_min_max: true,
        can_sub_add: true,
        can_mul_div: true,
        can_interpolate: true,
        compress_data: false,
    };

    /// Whether any arithmetic primitive exists for the kind.
    pub const fn has_arithmetic(self) -> bool {
        self.can_min_max || self.can_sub_add || self.can_mul_div
    }
}

impl ValueKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::Bool,
        Self::Int32,
        Self::Int64,
        Self::Float,
        Self::Double,
        Self::Vector2,
        Self::Vector3,
        Self::Vector4,
        Self::Rotator,
        Self::Quat,
        Self::Transform,
        Self::String,
        Self::Name,
    ];

    /// Stable type tag used by the serialized representation.
    #[inline]
    pub const fn tag(self) -> u16 {
        self as u16
    }

    /// Resolve a stored type tag. Returns `None` for unknown tags.
    pub const fn from_tag(tag: u16) -> Option<Self> {
        if (tag as usize) < Self::ALL.len() {
            Some(Self::ALL[tag as usize])
        } else {
            None
        }
    }

    /// Capability table.
    pub const fn traits(self) -> KindTraits {
        match self {
            Self::Bool => KindTraits::NONE,
            Self::Int32
            | Self::Int64
            | Self::Float
            | Self::Double
            | Self::Vector2
            | Self::Vector3
            | Self::Vector4 => KindTraits::NUMERIC,
            Self::Rotator => KindTraits {
                can_sub_add: true,
                can_interpolate: true,
                ..KindTraits::NONE
            },
            Self::Quat | Self::Transform => KindTraits {
                can_mul_div: true,
                can_interpolate: true,
                ..KindTraits::NONE
            },
            Self::String | Self::Name => KindTraits {
                compress_data: true,
                ..KindTraits::NONE
            },
        }
    }

    /// Scalar integer or floating-point kinds.
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64 | Self::Float | Self::Double)
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }

    pub const fn is_vector(self) -> bool {
        matches!(self, Self::Vector2 | Self::Vector3 | Self::Vector4)
    }

    pub const fn is_text(self) -> bool {
        matches!(self, Self::String | Self::Name)
    }

    /// Kinds with a total (or IEEE partial) ordering usable by `<` / `>`.
    pub const fn is_ordered(self) -> bool {
        matches!(
            self,
            Self::Bool | Self::Int32 | Self::Int64 | Self::Float | Self::Double | Self::String | Self::Name
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Vector2 => "Vector2",
            Self::Vector3 => "Vector3",
            Self::Vector4 => "Vector4",
            Self::Rotator => "Rotator",
            Self::Quat => "Quat",
            Self::Transform => "Transform",
            Self::String => "String",
            Self::Name => "Name",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast matrix: whether a value of kind `from` converts to `to`.
///
/// Kind `to` is "more complex" than `from` exactly when this holds.
pub const fn can_broadcast(from: ValueKind, to: ValueKind) -> bool {
    use ValueKind as K;

    if from as u16 == to as u16 {
        return true;
    }
    match to {
        K::Bool | K::Rotator => false,
        K::Int32 => matches!(from, K::Bool),
        K::Int64 => matches!(from, K::Bool | K::Int32),
        K::Float => matches!(from, K::Bool | K::Int32 | K::Int64),
        K::Double => matches!(from, K::Bool | K::Int32 | K::Int64 | K::Float),
        K::Vector2 => matches!(from, K::Int32 | K::Int64 | K::Float | K::Double),
        K::Vector3 => matches!(from, K::Int32 | K::Int64 | K::Float | K::Double | K::Vector2),
        K::Vector4 => matches!(
            from,
            K::Int32 | K::Int64 | K::Float | K::Double | K::Vector2 | K::Vector3
        ),
        K::Quat => matches!(from, K::Rotator),
        K::Transform => matches!(from, K::Vector3 | K::Rotator | K::Quat),
        K::String => true,
        K::Name => matches!(from, K::String),
    }
}

/// Two input kinds with no common broadcast target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConflict {
    /// Most complex kind resolved so far.
    pub current: ValueKind,
    /// Kind that could not be reconciled with it.
    pub incoming: ValueKind,
    /// Position of the incoming kind in the input list.
    pub index: usize,
}

impl fmt::Display for BroadcastConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kind {} at position {} is not broadcast-compatible with {}",
            self.incoming, self.index, self.current
        )
    }
}

/// Resolve the most complex kind among `kinds`.
///
/// Walks the kinds in order; the running kind is replaced when it broadcasts
/// to the next one, kept when the next one broadcasts to it (first wins when
/// both directions hold). Returns `Ok(None)` for an empty input.
pub fn resolve_most_complex(
    kinds: impl IntoIterator<Item = ValueKind>,
) -> Result<Option<ValueKind>, BroadcastConflict> {
    let mut current: Option<ValueKind> = None;
    for (index, incoming) in kinds.into_iter().enumerate() {
        let Some(running) = current else {
            current = Some(incoming);
            continue;
        };
        if can_broadcast(incoming, running) {
            continue;
        }
        if can_broadcast(running, incoming) {
            current = Some(incoming);
            continue;
        }
        return Err(BroadcastConflict {
            current: running,
            incoming,
            index,
        });
    }
    Ok(current)
}
