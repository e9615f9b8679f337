//! Value kinds, capability traits, and the kind dispatch bridge.
//!
//! Everything generic in attrstore is written once against a
//! [`MetadataType`] parameter and instantiated per supported kind through
//! [`dispatch`]. The erased representation of a single value is
//! [`MetadataValue`].

pub mod dispatch;
pub mod encoding;
pub mod kind;
pub mod math;
pub mod traits;
pub mod value;

pub use dispatch::{KindVisitor, dispatch, dispatch_tag};
pub use kind::{BroadcastConflict, KindTraits, ValueKind, can_broadcast, resolve_most_complex};
pub use math::{Name, Quat, Rotator, Transform, Vector2, Vector3, Vector4};
pub use traits::MetadataType;
pub use value::MetadataValue;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Row identifier for one entity's attribute data within a table.
///
/// Keys are issued monotonically per table and never reused. Keys below a
/// table's item-key offset are expressed in the parent table's numbering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct EntryKey(i64);

impl EntryKey {
    /// Sentinel for "no entry". Writes addressed to it are no-ops.
    pub const INVALID: Self = Self(-1);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Get the raw i64 value.
    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl Default for EntryKey {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "entry#{}", self.0)
        } else {
            f.write_str("entry#invalid")
        }
    }
}

/// Identifier of one stored value in an attribute's value chain.
///
/// Value keys are chain-global: a child attribute numbers its local values
/// after every value its parent chain held when the child was created.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ValueKey(i64);

impl ValueKey {
    /// Sentinel meaning "the attribute's default value".
    pub const DEFAULT: Self = Self(-1);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Get the raw i64 value.
    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_default(self) -> bool {
        self.0 < 0
    }
}

impl Default for ValueKey {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("value#default")
        } else {
            write!(f, "value#{}", self.0)
        }
    }
}

/// Per-table attribute identifier, assigned in creation order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct AttributeId(i64);

impl AttributeId {
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attr#{}", self.0)
    }
}

/// Process-unique table identifier.
///
/// Parent relations between tables are expressed through this handle rather
/// than through ownership.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct TableId(u64);

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

impl TableId {
    /// Allocate a fresh, never-before-issued table id.
    pub fn allocate() -> Self {
        Self(NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw id. Does not reserve it; use [`TableId::allocate`] for
    /// live tables.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}
