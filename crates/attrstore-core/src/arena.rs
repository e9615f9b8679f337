//! Owner of tables keyed by id.
//!
//! Tables only hold weak links to their parents. A host that wants parents
//! to outlive their children keeps every table in a [`TableArena`], which
//! refuses to drop a table while a registered child still points at it.

use std::collections::HashMap;
use std::sync::Arc;

use attrstore_types::TableId;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::observe::DiagnosticObserver;
use crate::table::AttributeTable;

#[derive(Debug, Default)]
pub struct TableArena {
    tables: RwLock<HashMap<TableId, Arc<AttributeTable>>>,
}

impl TableArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh root table.
    pub fn insert_root(&self) -> Arc<AttributeTable> {
        self.insert(AttributeTable::new_root())
    }

    pub fn insert_root_with_observer(
        &self,
        observer: Arc<dyn DiagnosticObserver>,
    ) -> Arc<AttributeTable> {
        self.insert(AttributeTable::new_root_with_observer(observer))
    }

    /// Register a new child of the table `parent`. `None` if `parent` is not
    /// in the arena.
    pub fn insert_child(&self, parent: TableId) -> Option<Arc<AttributeTable>> {
        let Some(parent) = self.get(parent) else {
            warn!(%parent, "insert_child on unknown parent");
            return None;
        };
        Some(self.insert(AttributeTable::new_child(&parent)))
    }

    /// Register an existing table (for example one returned by the codec).
    pub fn insert(&self, table: Arc<AttributeTable>) -> Arc<AttributeTable> {
        debug!(table = %table.id(), parent = ?table.parent_id(), "table registered");
        self.tables.write().insert(table.id(), Arc::clone(&table));
        table
    }

    pub fn get(&self, id: TableId) -> Option<Arc<AttributeTable>> {
        self.tables.read().get(&id).cloned()
    }

    /// Ids of registered tables whose parent is `id`.
    pub fn children_of(&self, id: TableId) -> Vec<TableId> {
        let mut ids: Vec<_> = self
            .tables
            .read()
            .values()
            .filter(|t| t.parent_id() == Some(id))
            .map(|t| t.id())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Unregister `id`. Refused while registered children reference it.
    pub fn remove(&self, id: TableId) -> Option<Arc<AttributeTable>> {
        let mut tables = self.tables.write();
        if tables.values().any(|t| t.parent_id() == Some(id)) {
            warn!(table = %id, "table still has children; not removed");
            return None;
        }
        tables.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use attrstore_types::EntryKey;

    use super::*;

    #[test]
    fn children_pin_parents() {
        let arena = TableArena::new();
        let root = arena.insert_root();
        let child = arena.insert_child(root.id()).unwrap();
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.children_of(root.id()), [child.id()]);

        assert!(arena.remove(root.id()).is_none());
        assert!(arena.remove(child.id()).is_some());
        assert!(arena.remove(root.id()).is_some());
        assert!(arena.is_empty());
    }

    #[test]
    fn parent_stays_reachable_through_arena() {
        let arena = TableArena::new();
        let root_id = {
            let root = arena.insert_root();
            let attr = root.create_attribute("h", 0_i32, false, false).unwrap();
            let k = root.add_entry(EntryKey::INVALID);
            attr.set_value(k, 4);
            root.id()
        };
        let child = arena.insert_child(root_id).unwrap();
        assert_eq!(child.parent().map(|p| p.id()), Some(root_id));
        let h = child.typed_attribute::<i32>("h").unwrap();
        assert_eq!(h.get_value_from_item_key(EntryKey::new(0)), 4);
    }

    #[test]
    fn unknown_parent() {
        let arena = TableArena::new();
        assert!(arena.insert_child(TableId::new(u64::MAX)).is_none());
    }
}
