//! Hierarchical attribute tables.
//!
//! A table owns named attributes and an entry-key space. A child table is
//! layered over its parent: it sees every parent attribute through a
//! parent-linked local attribute and only stores what it overrides.
//!
//! Every public mutator degrades instead of failing: problems are logged,
//! reported to the table's [`DiagnosticObserver`], and the call becomes a
//! no-op (or uses only the valid side of a merge).
//!
//! Lock order is child before parent. A table never locks a descendant.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use attrstore_error::Result;
use attrstore_types::{AttributeId, EntryKey, MetadataType, MetadataValue, TableId, ValueKind};
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::attribute::{Attribute, CopyRequest, MergeOp};
use crate::entries::EntryIndex;
use crate::erased::{AttributeBase, NewAttribute, downcast_attribute, new_attribute_of_kind};
use crate::observe::{DiagnosticEvent, DiagnosticObserver, NoOpObserver};

#[derive(Debug, Clone)]
struct ParentLink {
    id: TableId,
    table: Weak<AttributeTable>,
}

#[derive(Debug)]
struct Lineage {
    parent: Option<ParentLink>,
    root: TableId,
}

#[derive(Debug, Default)]
struct AttributeMap {
    by_name: HashMap<String, Arc<dyn AttributeBase>>,
    next_id: i64,
}

impl AttributeMap {
    fn allocate_id(&mut self) -> AttributeId {
        let id = AttributeId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn sorted(&self) -> Vec<Arc<dyn AttributeBase>> {
        let mut attrs: Vec<_> = self.by_name.values().cloned().collect();
        attrs.sort_by_key(|a| a.id());
        attrs
    }
}

/// Per-entity attribute storage with copy-on-write inheritance.
pub struct AttributeTable {
    id: TableId,
    lineage: RwLock<Lineage>,
    attributes: RwLock<AttributeMap>,
    entries: Arc<EntryIndex>,
    observer: Arc<dyn DiagnosticObserver>,
}

impl std::fmt::Debug for AttributeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeTable")
            .field("id", &self.id)
            .field("parent", &self.parent_id())
            .field("attributes", &self.attribute_names())
            .field("item_count", &self.item_count())
            .finish_non_exhaustive()
    }
}

impl AttributeTable {
    fn with_observer(observer: Arc<dyn DiagnosticObserver>) -> Self {
        let id = TableId::allocate();
        Self {
            id,
            lineage: RwLock::new(Lineage {
                parent: None,
                root: id,
            }),
            attributes: RwLock::new(AttributeMap::default()),
            entries: Arc::new(EntryIndex::new(id)),
            observer,
        }
    }

    /// Root table that drops diagnostics.
    #[must_use]
    pub fn new_root() -> Arc<Self> {
        Self::new_root_with_observer(Arc::new(NoOpObserver))
    }

    #[must_use]
    pub fn new_root_with_observer(observer: Arc<dyn DiagnosticObserver>) -> Arc<Self> {
        Arc::new(Self::with_observer(observer))
    }

    /// Child of `parent`, already initialized. Inherits the parent's
    /// observer.
    #[must_use]
    pub fn new_child(parent: &Arc<Self>) -> Arc<Self> {
        let child = Arc::new(Self::with_observer(Arc::clone(&parent.observer)));
        child.initialize(parent);
        child
    }

    /// Rebuild a table from decoded parts.
    pub(crate) fn restored(
        parent: Option<&Arc<Self>>,
        observer: Arc<dyn DiagnosticObserver>,
        item_key_offset: i64,
        build: impl FnOnce(&Arc<EntryIndex>) -> Result<Vec<Arc<dyn AttributeBase>>>,
    ) -> Result<Arc<Self>> {
        let id = TableId::allocate();
        let entries = Arc::new(EntryIndex::with_offset(id, item_key_offset));
        let attrs = build(&entries)?;
        let mut map = AttributeMap::default();
        for attr in attrs {
            map.next_id = map.next_id.max(attr.id().get() + 1);
            map.by_name.insert(attr.name(), attr);
        }
        let lineage = match parent {
            Some(p) => Lineage {
                parent: Some(ParentLink {
                    id: p.id,
                    table: Arc::downgrade(p),
                }),
                root: p.root_id(),
            },
            None => Lineage {
                parent: None,
                root: id,
            },
        };
        Ok(Arc::new(Self {
            id,
            lineage: RwLock::new(lineage),
            attributes: RwLock::new(map),
            entries,
            observer,
        }))
    }

    fn emit(&self, event: &DiagnosticEvent) {
        self.observer.on_event(event);
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn parent_id(&self) -> Option<TableId> {
        self.lineage.read().parent.as_ref().map(|p| p.id)
    }

    /// Parent table, if it is still alive.
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.lineage
            .read()
            .parent
            .as_ref()
            .and_then(|p| p.table.upgrade())
    }

    pub fn root_id(&self) -> TableId {
        self.lineage.read().root
    }

    pub fn observer(&self) -> &Arc<dyn DiagnosticObserver> {
        &self.observer
    }

    pub fn entries(&self) -> &Arc<EntryIndex> {
        &self.entries
    }

    /// Whether `other` is this table or one of its live ancestors.
    pub fn is_self_or_ancestor(&self, other: TableId) -> bool {
        if other == self.id {
            return true;
        }
        let mut cursor = self.parent();
        while let Some(table) = cursor {
            if table.id == other {
                return true;
            }
            cursor = table.parent();
        }
        false
    }

    /// Bind `parent` and pull in its attributes by reference.
    ///
    /// One-shot: a second call, or a call on a table that already has
    /// attributes or entries, is a logged no-op returning `false`.
    pub fn initialize(&self, parent: &Arc<Self>) -> bool {
        let parent_root = parent.root_id();
        {
            let mut lineage = self.lineage.write();
            let fresh = lineage.parent.is_none()
                && parent.id != self.id
                && self.attributes.read().by_name.is_empty()
                && self.entries.local_count() == 0;
            if !fresh {
                drop(lineage);
                warn!(table = %self.id, parent = %parent.id, "table already initialized");
                self.emit(&DiagnosticEvent::AlreadyInitialized { table: self.id });
                return false;
            }
            lineage.parent = Some(ParentLink {
                id: parent.id,
                table: Arc::downgrade(parent),
            });
            lineage.root = parent_root;
        }
        self.entries.set_offset(parent.item_count());
        let added = self.add_attributes(parent);
        debug!(table = %self.id, parent = %parent.id, inherited = added, "table initialized");
        true
    }

    /// Add a parent-linked local attribute for every attribute of `parent`
    /// not present here. `parent` must be this table's parent.
    pub fn add_attributes(&self, parent: &Self) -> usize {
        if self.parent_id() != Some(parent.id) {
            warn!(table = %self.id, other = %parent.id, "add_attributes from a non-parent table");
            return 0;
        }
        let inherited = parent.attributes.read().sorted();
        let mut map = self.attributes.write();
        let mut added = 0;
        for attr in inherited {
            let name = attr.name();
            if map.by_name.contains_key(&name) {
                continue;
            }
            let id = map.allocate_id();
            map.by_name
                .insert(name, attr.derive_child(id, Arc::clone(&self.entries)));
            added += 1;
        }
        added
    }

    fn parent_attribute(&self, name: &str) -> Option<Arc<dyn AttributeBase>> {
        self.parent().and_then(|p| p.attribute(name))
    }

    /// Create `name` of kind `T`, or return the existing attribute.
    ///
    /// An existing attribute of another kind yields `None` with a
    /// diagnostic. With `override_parent`, the new attribute is chained to
    /// the parent table's same-named attribute.
    pub fn create_attribute<T: MetadataType>(
        &self,
        name: &str,
        default_value: T,
        allows_interpolation: bool,
        override_parent: bool,
    ) -> Option<Arc<Attribute<T>>> {
        let attr = self.create_attribute_of_kind(
            T::KIND,
            name,
            &default_value.into_value(),
            allows_interpolation,
            override_parent,
        )?;
        let typed = downcast_attribute::<T>(&attr);
        if typed.is_none() {
            self.kind_mismatch(name, T::KIND, attr.kind());
        }
        typed
    }

    /// Typed lookup, creating the attribute with `default_value` when absent.
    pub fn find_or_create_attribute<T: MetadataType>(
        &self,
        name: &str,
        default_value: T,
        allows_interpolation: bool,
    ) -> Option<Arc<Attribute<T>>> {
        if let Some(existing) = self.attribute(name) {
            let typed = downcast_attribute::<T>(&existing);
            if typed.is_none() {
                self.kind_mismatch(name, T::KIND, existing.kind());
            }
            return typed;
        }
        self.create_attribute(name, default_value, allows_interpolation, false)
    }

    /// Erased creation through the tag-checked factory.
    ///
    /// Returns the existing attribute (whatever its kind) when `name` is
    /// taken, and `None` when `default_value` does not broadcast to `kind`.
    pub fn create_attribute_of_kind(
        &self,
        kind: ValueKind,
        name: &str,
        default_value: &MetadataValue,
        allows_interpolation: bool,
        override_parent: bool,
    ) -> Option<Arc<dyn AttributeBase>> {
        let parent = if override_parent {
            self.parent_attribute(name).filter(|p| {
                let same = p.kind() == kind;
                if !same {
                    self.kind_mismatch(name, kind, p.kind());
                }
                same
            })
        } else {
            None
        };

        let mut map = self.attributes.write();
        if let Some(existing) = map.by_name.get(name) {
            warn!(table = %self.id, attribute = name, "attribute already exists");
            let existing = Arc::clone(existing);
            drop(map);
            self.emit(&DiagnosticEvent::AttributeExists {
                table: self.id,
                name: name.to_owned(),
            });
            return Some(existing);
        }

        let built = new_attribute_of_kind(
            kind,
            NewAttribute {
                name,
                id: AttributeId::new(map.next_id),
                default_value,
                allows_interpolation,
                parent: parent.as_ref(),
                entries: Arc::clone(&self.entries),
            },
        );
        match built {
            Ok(attr) => {
                map.allocate_id();
                map.by_name.insert(name.to_owned(), Arc::clone(&attr));
                debug!(table = %self.id, attribute = name, %kind, "attribute created");
                Some(attr)
            }
            Err(err) => {
                drop(map);
                error!(table = %self.id, attribute = name, %err, "attribute creation failed");
                self.emit(&DiagnosticEvent::ValueRejected {
                    name: name.to_owned(),
                    from: default_value.kind(),
                    to: kind,
                });
                None
            }
        }
    }

    fn kind_mismatch(&self, name: &str, expected: ValueKind, actual: ValueKind) {
        error!(table = %self.id, attribute = name, %expected, %actual, "attribute kind mismatch");
        self.emit(&DiagnosticEvent::KindMismatch {
            table: self.id,
            name: name.to_owned(),
            expected,
            actual,
        });
    }

    fn missing(&self, name: &str) {
        warn!(table = %self.id, attribute = name, "attribute not found");
        self.emit(&DiagnosticEvent::AttributeMissing {
            table: self.id,
            name: name.to_owned(),
        });
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.read().by_name.contains_key(name)
    }

    pub fn attribute(&self, name: &str) -> Option<Arc<dyn AttributeBase>> {
        self.attributes.read().by_name.get(name).cloned()
    }

    /// Typed lookup; `None` when absent or of another kind.
    pub fn typed_attribute<T: MetadataType>(&self, name: &str) -> Option<Arc<Attribute<T>>> {
        self.attribute(name)
            .and_then(|a| downcast_attribute::<T>(&a))
    }

    /// Attribute names in creation order.
    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes
            .read()
            .sorted()
            .iter()
            .map(|a| a.name())
            .collect()
    }

    /// `(name, kind)` pairs in creation order.
    pub fn attributes_with_kinds(&self) -> Vec<(String, ValueKind)> {
        self.attributes
            .read()
            .sorted()
            .iter()
            .map(|a| (a.name(), a.kind()))
            .collect()
    }

    pub(crate) fn attributes_sorted(&self) -> Vec<Arc<dyn AttributeBase>> {
        self.attributes.read().sorted()
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.read().by_name.len()
    }

    pub fn add_entry(&self, parent_entry: EntryKey) -> EntryKey {
        self.entries.add_entry(parent_entry)
    }

    pub fn add_entries(&self, count: usize) -> Vec<EntryKey> {
        self.entries.add_entries(count)
    }

    /// One past the highest key issued, counting the parent's keys.
    pub fn item_count(&self) -> i64 {
        self.entries.item_count()
    }

    pub fn local_item_count(&self) -> usize {
        self.entries.local_count()
    }

    pub fn item_key_offset(&self) -> i64 {
        self.entries.item_key_offset()
    }

    /// Key of the parent entry backing `key`.
    ///
    /// Keys below the offset are already parent keys and come back
    /// unchanged. Out-of-range keys give `EntryKey::INVALID` and a
    /// diagnostic.
    pub fn parent_key(&self, key: EntryKey) -> EntryKey {
        self.entries.lookup_parent(key).unwrap_or_else(|| {
            warn!(table = %self.id, %key, "entry key out of range");
            self.emit(&DiagnosticEvent::ParentKeyOutOfRange { table: self.id, key });
            EntryKey::INVALID
        })
    }

    /// Give `key` a row, preferring to adopt an existing parent entry.
    ///
    /// Returns `true` when a parent entry was adopted. A valid `key` is left
    /// untouched.
    pub fn initialize_on_set(
        &self,
        key: &mut EntryKey,
        parent_key_a: EntryKey,
        table_a: Option<&Self>,
        parent_key_b: EntryKey,
        table_b: Option<&Self>,
    ) -> bool {
        if key.is_valid() {
            return false;
        }
        let parent = self.parent_id();
        let adoptable = |k: EntryKey, t: Option<&Self>| {
            k.is_valid() && parent.is_some() && t.map(Self::id) == parent
        };
        if adoptable(parent_key_a, table_a) {
            *key = parent_key_a;
            return true;
        }
        if adoptable(parent_key_b, table_b) {
            *key = parent_key_b;
            return true;
        }
        *key = self.add_entry(EntryKey::INVALID);
        false
    }

    /// Same-named attribute of `source`, checked against `kind`.
    fn counterpart(
        &self,
        source: Option<&Self>,
        subset: Option<&Self>,
        name: &str,
        kind: ValueKind,
    ) -> Option<Arc<dyn AttributeBase>> {
        let source = source?;
        if subset.is_some_and(|s| !s.has_attribute(name)) {
            return None;
        }
        let attr = source.attribute(name)?;
        if attr.kind() != kind {
            self.kind_mismatch(name, kind, attr.kind());
            return None;
        }
        Some(attr)
    }

    /// Merge every local attribute from `table_a`/`table_b` into `out_key`.
    pub fn merge_attributes(
        &self,
        key_a: EntryKey,
        table_a: Option<&Self>,
        key_b: EntryKey,
        table_b: Option<&Self>,
        out_key: EntryKey,
        op: MergeOp,
    ) {
        self.merge_attributes_subset(key_a, table_a, None, key_b, table_b, None, out_key, op);
    }

    /// As [`merge_attributes`](Self::merge_attributes), with each side
    /// restricted to the attribute names of an optional subset table.
    ///
    /// A same-named attribute of a different kind is reported and treated
    /// as absent.
    #[allow(clippy::too_many_arguments)]
    pub fn merge_attributes_subset(
        &self,
        key_a: EntryKey,
        table_a: Option<&Self>,
        subset_a: Option<&Self>,
        key_b: EntryKey,
        table_b: Option<&Self>,
        subset_b: Option<&Self>,
        out_key: EntryKey,
        op: MergeOp,
    ) {
        if !out_key.is_valid() {
            return;
        }
        for attr in self.attributes_sorted() {
            let name = attr.name();
            let kind = attr.kind();
            let a = self.counterpart(table_a, subset_a, &name, kind);
            let b = self.counterpart(table_b, subset_b, &name, kind);
            attr.merge_value(
                out_key,
                a.as_deref().map(|x| (x, key_a)),
                b.as_deref().map(|x| (x, key_b)),
                op,
            );
        }
    }

    /// Zero every interpolable attribute at `key`.
    pub fn reset_weighted_attributes(&self, key: EntryKey) {
        for attr in self.attributes_sorted() {
            attr.set_zero_value(key);
        }
    }

    /// Blend several entries of `source` into `out_key`.
    ///
    /// Interpolable attributes become the weighted sum; the others take the
    /// value of the highest-weight input.
    pub fn accumulate_weighted_attributes(
        &self,
        inputs: &[(EntryKey, f64)],
        source: &Self,
        out_key: EntryKey,
    ) {
        if !out_key.is_valid() || inputs.is_empty() {
            return;
        }
        let heaviest = inputs
            .iter()
            .copied()
            .max_by(|x, y| x.1.total_cmp(&y.1))
            .map(|(k, _)| k);
        for attr in self.attributes_sorted() {
            let name = attr.name();
            let Some(other) = self.counterpart(Some(source), None, &name, attr.kind()) else {
                continue;
            };
            if attr.allows_interpolation() {
                attr.set_zero_value(out_key);
                for &(key, weight) in inputs {
                    attr.accumulate_value(out_key, other.as_ref(), key, weight);
                }
            } else if let Some(key) = heaviest {
                attr.set_value_from(out_key, other.as_ref(), key);
            }
        }
    }

    /// Copy every local attribute's value for `source_key` of `source`.
    pub fn set_attributes(&self, out_key: EntryKey, source: &Self, source_key: EntryKey) {
        if !out_key.is_valid() {
            return;
        }
        for attr in self.attributes_sorted() {
            let name = attr.name();
            if let Some(other) = self.counterpart(Some(source), None, &name, attr.kind()) {
                attr.set_value_from(out_key, other.as_ref(), source_key);
            }
        }
    }

    fn insert_copy(
        &self,
        source: Arc<dyn AttributeBase>,
        new_name: &str,
        same_table: bool,
        keep_parent: bool,
        copy_entries: bool,
        copy_values: bool,
    ) -> Option<Arc<dyn AttributeBase>> {
        let mut map = self.attributes.write();
        if map.by_name.contains_key(new_name) {
            drop(map);
            warn!(table = %self.id, attribute = new_name, "copy target already exists");
            self.emit(&DiagnosticEvent::AttributeExists {
                table: self.id,
                name: new_name.to_owned(),
            });
            return None;
        }
        let request = CopyRequest {
            new_name: new_name.to_owned(),
            id: map.allocate_id(),
            entries: Arc::clone(&self.entries),
            same_table,
            keep_parent,
            copy_entries,
            copy_values,
        };
        let copy = source.copy(&request);
        map.by_name.insert(new_name.to_owned(), Arc::clone(&copy));
        Some(copy)
    }

    /// Copy an attribute of this table under a new name.
    pub fn copy_attribute(
        &self,
        source_name: &str,
        new_name: &str,
        keep_parent: bool,
        copy_entries: bool,
        copy_values: bool,
    ) -> Option<Arc<dyn AttributeBase>> {
        let Some(source) = self.attribute(source_name) else {
            self.missing(source_name);
            return None;
        };
        self.insert_copy(source, new_name, true, keep_parent, copy_entries, copy_values)
    }

    /// Copy an attribute owned by `source_table` into this table.
    ///
    /// `keep_parent` requires `source_table` to be this table or one of its
    /// ancestors; otherwise the copy is refused.
    pub fn copy_existing_attribute(
        &self,
        source: &Arc<dyn AttributeBase>,
        source_table: &Self,
        new_name: &str,
        keep_parent: bool,
        copy_entries: bool,
        copy_values: bool,
    ) -> Option<Arc<dyn AttributeBase>> {
        if keep_parent && !self.is_self_or_ancestor(source_table.id) {
            warn!(
                table = %self.id,
                source = %source_table.id,
                attribute = new_name,
                "keep_parent copy across unrelated tables"
            );
            self.emit(&DiagnosticEvent::RootMismatch {
                table: self.id,
                name: new_name.to_owned(),
            });
            return None;
        }
        let same_table = source_table.id == self.id;
        self.insert_copy(
            Arc::clone(source),
            new_name,
            same_table,
            keep_parent,
            copy_entries,
            copy_values,
        )
    }

    pub fn rename_attribute(&self, old_name: &str, new_name: &str) -> bool {
        let mut map = self.attributes.write();
        if map.by_name.contains_key(new_name) {
            drop(map);
            warn!(table = %self.id, attribute = new_name, "rename target already exists");
            self.emit(&DiagnosticEvent::AttributeExists {
                table: self.id,
                name: new_name.to_owned(),
            });
            return false;
        }
        let Some(attr) = map.by_name.remove(old_name) else {
            drop(map);
            self.missing(old_name);
            return false;
        };
        attr.set_name(new_name);
        map.by_name.insert(new_name.to_owned(), attr);
        true
    }

    /// Drop the entry bindings of `name`, keeping the attribute itself.
    pub fn clear_attribute(&self, name: &str) -> bool {
        match self.attribute(name) {
            Some(attr) => {
                attr.clear_entries();
                true
            }
            None => {
                self.missing(name);
                false
            }
        }
    }

    pub fn delete_attribute(&self, name: &str) -> bool {
        let removed = self.attributes.write().by_name.remove(name);
        if removed.is_none() {
            self.missing(name);
        }
        removed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use attrstore_types::{Name, Quat, ValueKey};
    use proptest::prelude::*;

    use super::*;
    use crate::observe::DiagnosticLog;

    fn logged_root() -> (Arc<AttributeTable>, Arc<DiagnosticLog>) {
        let log = Arc::new(DiagnosticLog::default());
        let table = AttributeTable::new_root_with_observer(Arc::clone(&log) as _);
        (table, log)
    }

    fn e(raw: i64) -> EntryKey {
        EntryKey::new(raw)
    }

    #[test]
    fn create_returns_existing() {
        let (table, log) = logged_root();
        let a = table.create_attribute("density", 0.0_f32, true, false).unwrap();
        let b = table.create_attribute("density", 1.0_f32, true, false).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*b.default_value(), 0.0);
        assert!(log.any(|ev| matches!(ev, DiagnosticEvent::AttributeExists { .. })));

        assert!(table.create_attribute("density", 0_i32, true, false).is_none());
        assert!(log.any(|ev| matches!(ev, DiagnosticEvent::KindMismatch { .. })));
    }

    #[test]
    fn attribute_ids_follow_creation_order() {
        let table = AttributeTable::new_root();
        table.create_attribute("b", 0_i32, false, false);
        table.create_attribute("a", 0_i32, false, false);
        assert_eq!(table.attribute_names(), ["b", "a"]);
        assert_eq!(table.attribute("a").unwrap().id(), AttributeId::new(1));
    }

    #[test]
    fn interpolation_needs_kind_support() {
        let table = AttributeTable::new_root();
        let s = table.create_attribute("tag", String::new(), true, false).unwrap();
        assert!(!s.allows_interpolation());
        let d = table.create_attribute("d", 0.0_f64, true, false).unwrap();
        assert!(d.allows_interpolation());
    }

    #[test]
    fn child_inherits_by_reference() {
        let parent = AttributeTable::new_root();
        let density = parent.create_attribute("density", 0.0_f32, true, false).unwrap();
        let keys = parent.add_entries(2);
        density.set_value(keys[0], 1.0);
        density.set_value(keys[1], 2.0);

        let child = AttributeTable::new_child(&parent);
        assert_eq!(child.item_key_offset(), 2);
        assert_eq!(child.root_id(), parent.id());
        let local = child.add_entry(keys[1]);
        assert_eq!(local, e(2));

        let inherited = child.typed_attribute::<f32>("density").unwrap();
        assert!(inherited.parent().is_some());
        assert_eq!(inherited.value_count(), 0);
        assert_eq!(inherited.get_value_from_item_key(local), 2.0);
        assert_eq!(inherited.get_value_from_item_key(keys[0]), 1.0);
    }

    #[test]
    fn initialize_is_one_shot() {
        let (parent, log) = logged_root();
        let child = AttributeTable::new_child(&parent);
        let other = AttributeTable::new_root();
        assert!(!child.initialize(&other));
        assert_eq!(child.parent_id(), Some(parent.id()));

        let busy = AttributeTable::new_root_with_observer(Arc::clone(&log) as _);
        busy.add_entry(EntryKey::INVALID);
        assert!(!busy.initialize(&parent));
        assert!(log.any(|ev| matches!(ev, DiagnosticEvent::AlreadyInitialized { .. })));
    }

    #[test]
    fn parent_key_translation() {
        let (parent, log) = logged_root();
        parent.add_entries(3);
        let child = AttributeTable::new_child(&parent);
        let k = child.add_entry(e(1));
        assert_eq!(child.parent_key(k), e(1));
        assert_eq!(child.parent_key(e(0)), e(0));
        assert_eq!(child.parent_key(e(99)), EntryKey::INVALID);
        assert!(log.any(|ev| matches!(ev, DiagnosticEvent::ParentKeyOutOfRange { .. })));
    }

    #[test]
    fn initialize_on_set_adopts_parent_entries() {
        let parent = AttributeTable::new_root();
        parent.add_entries(2);
        let child = AttributeTable::new_child(&parent);
        let stranger = AttributeTable::new_root();

        let mut key = EntryKey::INVALID;
        assert!(child.initialize_on_set(&mut key, e(1), Some(&parent), e(0), None));
        assert_eq!(key, e(1));

        let mut key = EntryKey::INVALID;
        assert!(child.initialize_on_set(&mut key, e(1), Some(&stranger), e(0), Some(&parent)));
        assert_eq!(key, e(0));

        let mut key = EntryKey::INVALID;
        assert!(!child.initialize_on_set(&mut key, e(1), Some(&stranger), EntryKey::INVALID, None));
        assert_eq!(key, e(2));

        let mut kept = e(5);
        assert!(!child.initialize_on_set(&mut kept, e(1), Some(&parent), e(0), None));
        assert_eq!(kept, e(5));
    }

    #[test]
    fn override_parent_chains_new_attribute() {
        let parent = AttributeTable::new_root();
        let k = parent.add_entry(EntryKey::INVALID);
        let child = AttributeTable::new_child(&parent);
        let p = parent.create_attribute("late", 0_i64, false, false).unwrap();
        p.set_value(k, 42);

        let chained = child.create_attribute("late", 0_i64, false, true).unwrap();
        assert_eq!(chained.get_value_from_item_key(k), 42);

        let unchained = child.create_attribute("other", 0_i64, false, true).unwrap();
        assert!(unchained.parent().is_none());
    }

    #[test]
    fn merge_attributes_applies_op() {
        let table = AttributeTable::new_root();
        let w = table.create_attribute("weight", 0.0_f64, true, false).unwrap();
        let tag = table.create_attribute("tag", String::new(), false, false).unwrap();
        let keys = table.add_entries(3);
        w.set_value(keys[0], 1.5);
        w.set_value(keys[1], 2.5);
        tag.set_value(keys[0], "a".into());
        tag.set_value(keys[1], "b".into());

        table.merge_attributes(keys[0], Some(&table), keys[1], Some(&table), keys[2], MergeOp::Add);
        assert_eq!(w.get_value_from_item_key(keys[2]), 4.0);
        assert_eq!(tag.get_value_from_item_key(keys[2]), "a");
    }

    #[test]
    fn merge_subset_restricts_sides() {
        let source = AttributeTable::new_root();
        let s = source.create_attribute("x", 0_i32, true, false).unwrap();
        let sk = source.add_entry(EntryKey::INVALID);
        s.set_value(sk, 3);

        let out = AttributeTable::new_root();
        let o = out.create_attribute("x", 0_i32, true, false).unwrap();
        let ok = out.add_entry(EntryKey::INVALID);
        let empty_subset = AttributeTable::new_root();

        out.merge_attributes_subset(
            sk, Some(&source), Some(&empty_subset),
            sk, None, None,
            ok, MergeOp::Add,
        );
        assert_eq!(o.local_value_key(ok), None);

        out.merge_attributes_subset(sk, Some(&source), None, sk, None, None, ok, MergeOp::Add);
        assert_eq!(o.get_value_from_item_key(ok), 3);
    }

    #[test]
    fn merge_kind_mismatch_keeps_default() {
        let (out, log) = logged_root();
        let o = out.create_attribute("v", 0.0_f64, true, false).unwrap();
        let ok = out.add_entry(EntryKey::INVALID);

        let other = AttributeTable::new_root();
        let s = other.create_attribute("v", String::new(), false, false).unwrap();
        let sk = other.add_entry(EntryKey::INVALID);
        s.set_value(sk, "text".into());

        out.merge_attributes(sk, Some(&other), sk, Some(&other), ok, MergeOp::Add);
        assert_eq!(o.get_value_from_item_key(ok), 0.0);
        assert!(!o.has_non_default_value(ok));
        assert!(log.any(|ev| matches!(ev, DiagnosticEvent::KindMismatch { .. })));
    }

    #[test]
    fn weighted_blend() {
        let table = AttributeTable::new_root();
        let d = table.create_attribute("d", 0.0_f64, true, false).unwrap();
        let q = table.create_attribute("q", Quat::IDENTITY, true, false).unwrap();
        let n = table.create_attribute("n", Name::none(), false, false).unwrap();
        let keys = table.add_entries(3);
        d.set_value(keys[0], 10.0);
        d.set_value(keys[1], 20.0);
        n.set_value(keys[0], Name::from("light"));
        n.set_value(keys[1], Name::from("heavy"));

        table.accumulate_weighted_attributes(&[(keys[0], 0.25), (keys[1], 0.75)], &table, keys[2]);
        assert_eq!(d.get_value_from_item_key(keys[2]), 17.5);
        assert_eq!(n.get_value_from_item_key(keys[2]), Name::from("heavy"));
        assert!(q.has_non_default_value(keys[2]));

        table.reset_weighted_attributes(keys[2]);
        assert_eq!(d.get_value_from_item_key(keys[2]), 0.0);
    }

    #[test]
    fn set_attributes_copies_one_entry() {
        let source = AttributeTable::new_root();
        let s = source.create_attribute("h", 0_i64, false, false).unwrap();
        let sk = source.add_entry(EntryKey::INVALID);
        s.set_value(sk, 9);

        let target = AttributeTable::new_root();
        let t = target.create_attribute("h", 0_i64, false, false).unwrap();
        let tk = target.add_entry(EntryKey::INVALID);
        target.set_attributes(tk, &source, sk);
        assert_eq!(t.get_value_from_item_key(tk), 9);
    }

    #[test]
    fn structural_mutators() {
        let (table, log) = logged_root();
        let a = table.create_attribute("a", 0_i32, false, false).unwrap();
        let k = table.add_entry(EntryKey::INVALID);
        a.set_value(k, 5);

        let copy = table.copy_attribute("a", "b", false, true, true).unwrap();
        assert_eq!(copy.value_from_item_key(k), MetadataValue::Int32(5));
        assert!(table.copy_attribute("a", "b", false, true, true).is_none());

        assert!(table.rename_attribute("b", "c"));
        assert!(!table.has_attribute("b"));
        assert_eq!(table.attribute("c").unwrap().name(), "c");
        assert!(!table.rename_attribute("missing", "d"));

        assert!(table.clear_attribute("a"));
        assert_eq!(a.entry_count(), 0);
        assert!(table.has_attribute("a"));

        assert!(table.delete_attribute("a"));
        assert!(!table.delete_attribute("a"));
        assert_eq!(table.attributes_with_kinds(), [("c".to_owned(), ValueKind::Int32)]);
        assert!(log.any(|ev| matches!(ev, DiagnosticEvent::AttributeMissing { .. })));
    }

    #[test]
    fn keep_parent_copy_requires_ancestor() {
        let (parent, log) = logged_root();
        let p = parent.create_attribute("p", 0_i32, false, false).unwrap();
        let k = parent.add_entry(EntryKey::INVALID);
        p.set_value(k, 3);
        let child = AttributeTable::new_child(&parent);
        let erased = parent.attribute("p").unwrap();

        let layered = child
            .copy_existing_attribute(&erased, &parent, "layered", true, false, false)
            .unwrap();
        assert!(layered.has_parent());
        assert_eq!(layered.value_from_item_key(k), MetadataValue::Int32(3));

        let stranger = AttributeTable::new_root_with_observer(Arc::clone(&log) as _);
        assert!(stranger
            .copy_existing_attribute(&erased, &parent, "x", true, false, false)
            .is_none());
        assert!(log.any(|ev| matches!(ev, DiagnosticEvent::RootMismatch { .. })));

        let flat = stranger
            .copy_existing_attribute(&erased, &parent, "x", false, false, true)
            .unwrap();
        assert!(!flat.has_parent());
        assert_eq!(flat.value(ValueKey::new(0)), MetadataValue::Int32(3));
    }

    #[test]
    fn concurrent_creation_and_writes() {
        let table = AttributeTable::new_root();
        table.add_entries(64);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    let attr = table.find_or_create_attribute("shared", 0_i64, false).unwrap();
                    for i in 0..16 {
                        attr.set_value(EntryKey::new(t * 16 + i), t * 16 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(table.attribute_count(), 1);
        let attr = table.typed_attribute::<i64>("shared").unwrap();
        for i in 0..64 {
            assert_eq!(attr.get_value_from_item_key(EntryKey::new(i)), i);
        }
    }

    #[test]
    fn concurrent_initialize_binds_one_parent() {
        let target = AttributeTable::new_root();
        let parents: Vec<_> = (0..8).map(|_| AttributeTable::new_root()).collect();
        let handles: Vec<_> = parents
            .iter()
            .map(|parent| {
                let target = Arc::clone(&target);
                let parent = Arc::clone(parent);
                std::thread::spawn(move || target.initialize(&parent))
            })
            .collect();
        let bound: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(bound.iter().filter(|b| **b).count(), 1);
        let winner = bound.iter().position(|b| *b).unwrap();
        assert_eq!(target.parent_id(), Some(parents[winner].id()));
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent(a in -100.0_f64..100.0, b in -100.0_f64..100.0, tag_a in "[xy]", tag_b in "[xy]") {
            let table = AttributeTable::new_root();
            let w = table.create_attribute("w", 0.0_f64, true, false).unwrap();
            let t = table.create_attribute("t", String::new(), false, false).unwrap();
            let ka = table.add_entry(EntryKey::INVALID);
            let kb = table.add_entry(EntryKey::INVALID);
            w.set_value(ka, a);
            w.set_value(kb, b);
            t.set_value(ka, tag_a);
            t.set_value(kb, tag_b);

            let out = AttributeTable::new_child(&table);
            let first = out.add_entry(EntryKey::INVALID);
            let second = out.add_entry(EntryKey::INVALID);
            for key in [first, second] {
                out.merge_attributes_subset(ka, Some(&table), None, kb, Some(&table), None, key, MergeOp::Max);
            }
            for name in ["w", "t"] {
                let attr = out.attribute(name).unwrap();
                prop_assert_eq!(attr.value_from_item_key(first), attr.value_from_item_key(second));
            }
        }

        #[test]
        fn prop_child_fallback_matches_parent(values in proptest::collection::vec(any::<i32>(), 1..12)) {
            let parent = AttributeTable::new_root();
            let attr = parent.create_attribute("v", 0_i32, true, false).unwrap();
            let keys = parent.add_entries(values.len());
            for (k, v) in keys.iter().zip(&values) {
                attr.set_value(*k, *v);
            }
            let child = AttributeTable::new_child(&parent);
            let inherited = child.attribute("v").unwrap();
            for k in &keys {
                let local = child.add_entry(*k);
                prop_assert_eq!(
                    inherited.value_from_item_key(local),
                    attr.get_value_from_item_key(child.parent_key(local)).into_value()
                );
            }
        }
    }
}
