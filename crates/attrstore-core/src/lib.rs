//! Hierarchical, copy-on-write attribute tables.
//!
//! An [`AttributeTable`] maps entity rows ([`EntryKey`]s) to values of named
//! [`Attribute`]s. Child tables layer over a parent without copying it:
//! reads fall back through the parent chain, writes land locally.
//!
//! [`EntryKey`]: attrstore_types::EntryKey

pub mod arena;
pub mod attribute;
pub mod codec;
pub mod entries;
pub mod erased;
pub mod observe;
pub mod table;

pub use arena::TableArena;
pub use attribute::{Attribute, CopyRequest, MergeOp};
pub use codec::{decode_table, encode_table};
pub use entries::EntryIndex;
pub use erased::{AttributeBase, NewAttribute, downcast_attribute, new_attribute_of_kind};
pub use observe::{
    DiagnosticCountsSnapshot, DiagnosticEvent, DiagnosticLog, DiagnosticObserver, NoOpObserver,
};
pub use table::AttributeTable;
