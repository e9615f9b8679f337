//! Entry-key space of one table.
//!
//! A table's keys below `item_key_offset` are expressed in the parent
//! table's numbering. Local rows start at the offset; each records the
//! parent entry it was derived from (or `EntryKey::INVALID`).

use attrstore_types::{EntryKey, TableId};
use parking_lot::RwLock;
use tracing::warn;

#[derive(Debug, Default)]
struct Rows {
    item_key_offset: i64,
    parent_keys: Vec<EntryKey>,
}

/// Local entry rows plus the offset into the parent's key space.
///
/// Shared between a table and every attribute it owns, so attributes can
/// translate a local key to the parent's numbering without going through
/// the table's attribute lock.
#[derive(Debug)]
pub struct EntryIndex {
    table: TableId,
    rows: RwLock<Rows>,
}

impl EntryIndex {
    pub(crate) fn new(table: TableId) -> Self {
        Self {
            table,
            rows: RwLock::new(Rows::default()),
        }
    }

    pub(crate) fn with_offset(table: TableId, item_key_offset: i64) -> Self {
        Self {
            table,
            rows: RwLock::new(Rows {
                item_key_offset,
                parent_keys: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn table_id(&self) -> TableId {
        self.table
    }

    /// Set the offset of an empty index. Returns `false` once rows exist.
    pub(crate) fn set_offset(&self, offset: i64) -> bool {
        let mut rows = self.rows.write();
        if !rows.parent_keys.is_empty() {
            return false;
        }
        rows.item_key_offset = offset;
        true
    }

    #[must_use]
    pub fn item_key_offset(&self) -> i64 {
        self.rows.read().item_key_offset
    }

    /// Offset plus local rows: one past the highest key this table can issue
    /// right now.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn item_count(&self) -> i64 {
        let rows = self.rows.read();
        rows.item_key_offset + rows.parent_keys.len() as i64
    }

    #[must_use]
    pub fn local_count(&self) -> usize {
        self.rows.read().parent_keys.len()
    }

    /// Append one local row. Keys are never reused.
    #[allow(clippy::cast_possible_wrap)]
    pub fn add_entry(&self, parent_entry: EntryKey) -> EntryKey {
        let mut rows = self.rows.write();
        let key = rows.item_key_offset + rows.parent_keys.len() as i64;
        rows.parent_keys.push(parent_entry);
        EntryKey::new(key)
    }

    /// Append `count` rows without parent entries, under one lock.
    #[allow(clippy::cast_possible_wrap)]
    pub fn add_entries(&self, count: usize) -> Vec<EntryKey> {
        let mut rows = self.rows.write();
        let first = rows.item_key_offset + rows.parent_keys.len() as i64;
        rows.parent_keys
            .extend(std::iter::repeat_n(EntryKey::INVALID, count));
        (0..count as i64).map(|i| EntryKey::new(first + i)).collect()
    }

    /// Translate `key` to the parent's numbering.
    ///
    /// Keys below the offset come back unchanged. `None` means `key` is at
    /// or past the end of the local rows.
    #[must_use]
    pub fn lookup_parent(&self, key: EntryKey) -> Option<EntryKey> {
        let rows = self.rows.read();
        let raw = key.get();
        if raw < rows.item_key_offset {
            return Some(key);
        }
        let index = usize::try_from(raw - rows.item_key_offset).ok()?;
        rows.parent_keys.get(index).copied()
    }

    /// Like [`lookup_parent`](Self::lookup_parent), but an out-of-range key
    /// is logged and becomes `EntryKey::INVALID`.
    #[must_use]
    pub fn parent_key(&self, key: EntryKey) -> EntryKey {
        self.lookup_parent(key).unwrap_or_else(|| {
            warn!(table = %self.table, %key, "entry key out of range for parent lookup");
            EntryKey::INVALID
        })
    }

    /// Copy of the local parent-key rows, in key order.
    #[must_use]
    pub fn parent_keys(&self) -> Vec<EntryKey> {
        self.rows.read().parent_keys.clone()
    }
}
