//! Type-erased attribute values.
//!
//! [`MetadataValue`] carries one value of any [`ValueKind`] across the
//! object-safe attribute surface and the codec, and implements the broadcast
//! conversions between kinds.
#![allow(clippy::cast_precision_loss)]

use std::fmt;

use crate::kind::{ValueKind, can_broadcast};
use crate::math::{Name, Quat, Rotator, Transform, Vector2, Vector3, Vector4};

/// A dynamically-typed attribute value.
///
/// One variant per [`ValueKind`]. This is the erased form used wherever the
/// concrete kind is only known at runtime: type-erased attribute reads,
/// default values in the codec, and broadcast conversions.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MetadataValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Vector2(Vector2),
    Vector3(Vector3),
    Vector4(Vector4),
    Rotator(Rotator),
    Quat(Quat),
    Transform(Transform),
    String(String),
    Name(Name),
}

impl MetadataValue {
    /// Returns the kind tag of this value.
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int32(_) => ValueKind::Int32,
            Self::Int64(_) => ValueKind::Int64,
            Self::Float(_) => ValueKind::Float,
            Self::Double(_) => ValueKind::Double,
            Self::Vector2(_) => ValueKind::Vector2,
            Self::Vector3(_) => ValueKind::Vector3,
            Self::Vector4(_) => ValueKind::Vector4,
            Self::Rotator(_) => ValueKind::Rotator,
            Self::Quat(_) => ValueKind::Quat,
            Self::Transform(_) => ValueKind::Transform,
            Self::String(_) => ValueKind::String,
            Self::Name(_) => ValueKind::Name,
        }
    }

    /// Zero / identity value of `kind`.
    pub fn zero_of(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Self::Bool(false),
            ValueKind::Int32 => Self::Int32(0),
            ValueKind::Int64 => Self::Int64(0),
            ValueKind::Float => Self::Float(0.0),
            ValueKind::Double => Self::Double(0.0),
            ValueKind::Vector2 => Self::Vector2(Vector2::ZERO),
            ValueKind::Vector3 => Self::Vector3(Vector3::ZERO),
            ValueKind::Vector4 => Self::Vector4(Vector4::ZERO),
            ValueKind::Rotator => Self::Rotator(Rotator::ZERO),
            ValueKind::Quat => Self::Quat(Quat::IDENTITY),
            ValueKind::Transform => Self::Transform(Transform::IDENTITY),
            ValueKind::String => Self::String(String::new()),
            ValueKind::Name => Self::Name(Name::none()),
        }
    }

    /// Scalar view of numeric and boolean values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int32(i) => Some(f64::from(*i)),
            Self::Int64(i) => Some(*i as f64),
            Self::Float(f) => Some(f64::from(*f)),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Convert to a more complex kind following the broadcast matrix.
    ///
    /// Returns `None` when [`can_broadcast`] forbids the conversion. Scalars
    /// splat into every vector component; narrower vectors zero-fill the
    /// extra components; rotators and quaternions become rotation-only
    /// transforms, a `Vector3` a translation-only transform; every kind
    /// renders to `String` through `Display`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn broadcast_to(&self, target: ValueKind) -> Option<Self> {
        let from = self.kind();
        if !can_broadcast(from, target) {
            return None;
        }
        if from == target {
            return Some(self.clone());
        }
        let converted = match (self, target) {
            (_, ValueKind::String) => Self::String(self.to_string()),
            (Self::String(s), ValueKind::Name) => Self::Name(Name::new(s.clone())),
            (Self::Bool(b), ValueKind::Int32) => Self::Int32(i32::from(*b)),
            (Self::Bool(b), ValueKind::Int64) => Self::Int64(i64::from(*b)),
            (Self::Int32(i), ValueKind::Int64) => Self::Int64(i64::from(*i)),
            (Self::Vector2(v), ValueKind::Vector3) => Self::Vector3(Vector3::new(v.x, v.y, 0.0)),
            (Self::Vector2(v), ValueKind::Vector4) => {
                Self::Vector4(Vector4::new(v.x, v.y, 0.0, 0.0))
            }
            (Self::Vector3(v), ValueKind::Vector4) => {
                Self::Vector4(Vector4::new(v.x, v.y, v.z, 0.0))
            }
            (Self::Vector3(v), ValueKind::Transform) => {
                Self::Transform(Transform::from_translation(*v))
            }
            (Self::Rotator(r), ValueKind::Quat) => Self::Quat(r.quaternion()),
            (Self::Rotator(r), ValueKind::Transform) => {
                Self::Transform(Transform::from_rotation(r.quaternion()))
            }
            (Self::Quat(q), ValueKind::Transform) => Self::Transform(Transform::from_rotation(*q)),
            (scalar, _) => {
                let s = scalar.as_f64()?;
                match target {
                    ValueKind::Float => Self::Float(s as f32),
                    ValueKind::Double => Self::Double(s),
                    ValueKind::Vector2 => Self::Vector2(Vector2::splat(s)),
                    ValueKind::Vector3 => Self::Vector3(Vector3::splat(s)),
                    ValueKind::Vector4 => Self::Vector4(Vector4::splat(s)),
                    _ => return None,
                }
            }
        };
        Some(converted)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int32(i) => write!(f, "{i}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Vector2(v) => write!(f, "{v}"),
            Self::Vector3(v) => write!(f, "{v}"),
            Self::Vector4(v) => write!(f, "{v}"),
            Self::Rotator(v) => write!(f, "{v}"),
            Self::Quat(v) => write!(f, "{v}"),
            Self::Transform(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
            Self::Name(n) => write!(f, "{n}"),
        }
    }
}

macro_rules! from_native {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for MetadataValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )+
    };
}

from_native!(
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
    Vector2 => Vector2,
    Vector3 => Vector3,
    Vector4 => Vector4,
    Rotator => Rotator,
    Quat => Quat,
    Transform => Transform,
    String => String,
    Name => Name,
);

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}
