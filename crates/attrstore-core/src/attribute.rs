//! Typed attribute storage.
//!
//! An [`Attribute<T>`] owns an append-only value list and an entry→value-key
//! map. Value keys are chain-global: local values are numbered after every
//! value the parent chain held when this attribute was created, so a key
//! issued anywhere up the chain resolves through [`Attribute::get_value`].

use std::collections::HashMap;
use std::sync::Arc;

use attrstore_types::{AttributeId, EntryKey, MetadataType, ValueKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::entries::EntryIndex;

/// Arithmetic applied by [`Attribute::merge_value`] when both sides exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeOp {
    Min,
    Max,
    Sub,
    Add,
    Mul,
    Div,
}

impl MergeOp {
    /// `None` when the kind has no such primitive.
    pub fn apply<T: MetadataType>(self, a: &T, b: &T) -> Option<T> {
        match self {
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Sub => a.sub(b),
            Self::Add => a.add(b),
            Self::Mul => a.mul(b),
            Self::Div => a.div(b),
        }
    }
}

/// Parameters for [`Attribute::copy`].
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub(crate) new_name: String,
    pub(crate) id: AttributeId,
    /// Key space of the table receiving the copy.
    pub(crate) entries: Arc<EntryIndex>,
    /// Whether the receiving table is the source's own table.
    pub(crate) same_table: bool,
    pub(crate) keep_parent: bool,
    pub(crate) copy_entries: bool,
    pub(crate) copy_values: bool,
}

#[allow(clippy::cast_possible_wrap)]
const fn as_key(raw: usize) -> i64 {
    raw as i64
}

/// Typed per-entity storage for one named attribute.
#[derive(Debug)]
pub struct Attribute<T: MetadataType> {
    name: RwLock<String>,
    id: AttributeId,
    default_value: T,
    allows_interpolation: bool,
    parent: Option<Arc<Attribute<T>>>,
    entries: Arc<EntryIndex>,
    value_key_offset: i64,
    values: RwLock<Vec<T>>,
    entry_to_value: RwLock<HashMap<EntryKey, ValueKey>>,
}

impl<T: MetadataType> Attribute<T> {
    pub(crate) fn new(
        name: impl Into<String>,
        id: AttributeId,
        default_value: T,
        allows_interpolation: bool,
        parent: Option<Arc<Self>>,
        entries: Arc<EntryIndex>,
    ) -> Self {
        let value_key_offset = parent
            .as_ref()
            .map_or(0, |p| p.value_key_offset + as_key(p.value_count()));
        Self {
            name: RwLock::new(name.into()),
            id,
            default_value,
            allows_interpolation: allows_interpolation && T::CAN_INTERPOLATE,
            parent,
            entries,
            value_key_offset,
            values: RwLock::new(Vec::new()),
            entry_to_value: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild from decoded parts. Bindings are taken as-is.
    pub(crate) fn restore(
        mut self,
        values: Vec<T>,
        bindings: impl IntoIterator<Item = (EntryKey, ValueKey)>,
    ) -> Self {
        *self.values.get_mut() = values;
        self.entry_to_value.get_mut().extend(bindings);
        self
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        name.clone_into(&mut self.name.write());
    }

    pub const fn id(&self) -> AttributeId {
        self.id
    }

    pub const fn default_value(&self) -> &T {
        &self.default_value
    }

    pub const fn allows_interpolation(&self) -> bool {
        self.allows_interpolation
    }

    pub const fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    pub const fn value_key_offset(&self) -> i64 {
        self.value_key_offset
    }

    pub(crate) fn entries(&self) -> &Arc<EntryIndex> {
        &self.entries
    }

    /// Number of locally stored values.
    pub fn value_count(&self) -> usize {
        self.values.read().len()
    }

    /// Number of local entry bindings.
    pub fn entry_count(&self) -> usize {
        self.entry_to_value.read().len()
    }

    /// Locally bound entry keys, ascending.
    pub fn local_entry_keys(&self) -> Vec<EntryKey> {
        let mut keys: Vec<_> = self.entry_to_value.read().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Local bindings, ascending by entry key.
    pub fn local_bindings(&self) -> Vec<(EntryKey, ValueKey)> {
        let mut pairs: Vec<_> = self
            .entry_to_value
            .read()
            .iter()
            .map(|(e, v)| (*e, *v))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Copy of the local value list.
    pub fn local_values(&self) -> Vec<T> {
        self.values.read().clone()
    }

    pub fn clear_entries(&self) {
        self.entry_to_value.write().clear();
    }

    /// Whether `other` is this attribute or one of its ancestors.
    pub fn is_self_or_ancestor(&self, other: &Self) -> bool {
        let mut cursor = Some(self);
        while let Some(attr) = cursor {
            if std::ptr::eq(attr, other) {
                return true;
            }
            cursor = attr.parent.as_deref();
        }
        false
    }

    /// Resolve a chain-global value key. Unknown keys read as the default.
    pub fn get_value(&self, key: ValueKey) -> T {
        if key.is_default() {
            return self.default_value.clone();
        }
        let raw = key.get();
        if raw < self.value_key_offset {
            return self
                .parent
                .as_ref()
                .map_or_else(|| self.default_value.clone(), |p| p.get_value(key));
        }
        usize::try_from(raw - self.value_key_offset)
            .ok()
            .and_then(|i| self.values.read().get(i).cloned())
            .unwrap_or_else(|| self.default_value.clone())
    }

    /// Value of `entry`: local binding, then the parent chain, then the
    /// default.
    pub fn get_value_from_item_key(&self, entry: EntryKey) -> T {
        if !entry.is_valid() {
            return self.default_value.clone();
        }
        if let Some(key) = self.local_value_key(entry) {
            return self.get_value(key);
        }
        match &self.parent {
            Some(parent) => parent.get_value_from_item_key(self.entries.parent_key(entry)),
            None => self.default_value.clone(),
        }
    }

    /// Binding held by this attribute itself, ignoring the parent chain.
    pub fn local_value_key(&self, entry: EntryKey) -> Option<ValueKey> {
        self.entry_to_value.read().get(&entry).copied()
    }

    /// Value key `entry` resolves to through the chain.
    pub fn get_value_key(&self, entry: EntryKey) -> ValueKey {
        if !entry.is_valid() {
            return ValueKey::DEFAULT;
        }
        if let Some(key) = self.local_value_key(entry) {
            return key;
        }
        self.parent.as_ref().map_or(ValueKey::DEFAULT, |p| {
            p.get_value_key(self.entries.parent_key(entry))
        })
    }

    pub fn has_non_default_value(&self, entry: EntryKey) -> bool {
        !self.get_value_key(entry).is_default()
    }

    /// First stored key holding `value`, parent chain first.
    ///
    /// Only compressible kinds are searched; everything else always gets
    /// `ValueKey::DEFAULT`.
    pub fn find_value(&self, value: &T) -> ValueKey {
        if !T::COMPRESS_DATA {
            return ValueKey::DEFAULT;
        }
        if let Some(key) = self.find_in_parent(value) {
            return key;
        }
        self.values
            .read()
            .iter()
            .position(|v| v == value)
            .map_or(ValueKey::DEFAULT, |i| {
                ValueKey::new(self.value_key_offset + as_key(i))
            })
    }

    fn find_in_parent(&self, value: &T) -> Option<ValueKey> {
        let key = self.parent.as_ref()?.find_value(value);
        (!key.is_default() && key.get() < self.value_key_offset).then_some(key)
    }

    /// Find-or-append under a single write lock on the value list.
    fn intern(&self, value: T) -> ValueKey {
        if T::COMPRESS_DATA {
            if let Some(key) = self.find_in_parent(&value) {
                return key;
            }
        }
        let mut values = self.values.write();
        if T::COMPRESS_DATA {
            if let Some(i) = values.iter().position(|v| *v == value) {
                return ValueKey::new(self.value_key_offset + as_key(i));
            }
        }
        values.push(value);
        ValueKey::new(self.value_key_offset + as_key(values.len() - 1))
    }

    /// Store `value` for `entry`. No-op on an invalid key.
    pub fn set_value(&self, entry: EntryKey, value: T) {
        if !entry.is_valid() {
            return;
        }
        let key = self.intern(value);
        self.entry_to_value.write().insert(entry, key);
    }

    /// Bind an existing chain-global value key.
    pub fn set_value_key(&self, entry: EntryKey, key: ValueKey) {
        if !entry.is_valid() {
            return;
        }
        self.entry_to_value.write().insert(entry, key);
    }

    /// Take the value `source` holds for `source_entry`.
    ///
    /// When `source` is this attribute or an ancestor the value key is bound
    /// directly instead of storing the value again.
    pub fn set_value_from(&self, entry: EntryKey, source: &Self, source_entry: EntryKey) {
        if !entry.is_valid() {
            return;
        }
        if self.is_self_or_ancestor(source) {
            let key = source.get_value_key(source_entry);
            let reachable = std::ptr::eq(self, source) || key.get() < self.value_key_offset;
            if key.is_default() {
                let value = source.get_value_from_item_key(source_entry);
                if value == self.default_value {
                    self.set_value_key(entry, ValueKey::DEFAULT);
                } else {
                    self.set_value(entry, value);
                }
                return;
            }
            if reachable {
                self.set_value_key(entry, key);
                return;
            }
        }
        self.set_value(entry, source.get_value_from_item_key(source_entry));
    }

    /// Binary merge into `entry`.
    ///
    /// With both sides present on an interpolable attribute, `op` is
    /// computed. Otherwise A wins over B; except that two present sides on a
    /// kind without arithmetic leave an existing value, local or inherited,
    /// untouched.
    pub fn merge_value(
        &self,
        entry: EntryKey,
        a: Option<(&Self, EntryKey)>,
        b: Option<(&Self, EntryKey)>,
        op: MergeOp,
    ) {
        if !entry.is_valid() {
            return;
        }
        if let (Some((attr_a, key_a)), Some((attr_b, key_b))) = (a, b) {
            if self.allows_interpolation {
                let va = attr_a.get_value_from_item_key(key_a);
                let vb = attr_b.get_value_from_item_key(key_b);
                if let Some(merged) = op.apply(&va, &vb) {
                    self.set_value(entry, merged);
                    return;
                }
            }
            if !T::KIND.traits().has_arithmetic() && self.has_non_default_value(entry) {
                trace!(%entry, kind = %T::KIND, "merge keeps existing value");
                return;
            }
        }
        if let Some((attr, key)) = a.or(b) {
            self.set_value_from(entry, attr, key);
        }
    }

    /// `value(entry) += weight * other(other_entry)`.
    pub fn accumulate_value(&self, entry: EntryKey, other: &Self, other_entry: EntryKey, weight: f64) {
        if !self.allows_interpolation || !entry.is_valid() {
            return;
        }
        let current = self.get_value_from_item_key(entry);
        let incoming = other.get_value_from_item_key(other_entry);
        if let Some(sum) = current.weighted_sum(&incoming, weight) {
            self.set_value(entry, sum);
        }
    }

    /// Bind the kind's zero / identity value.
    pub fn set_zero_value(&self, entry: EntryKey) {
        if self.allows_interpolation {
            self.set_value(entry, T::zero_value());
        }
    }

    /// Every value visible through the chain, in key order.
    fn chain_values(&self) -> Vec<T> {
        let mut out = self
            .parent
            .as_ref()
            .map(|p| p.chain_values())
            .unwrap_or_default();
        out.truncate(usize::try_from(self.value_key_offset).unwrap_or(0));
        out.extend(self.values.read().iter().cloned());
        out
    }

    /// Build a new attribute from this one.
    ///
    /// With `keep_parent` in the same table the copy shares this attribute's
    /// parent and duplicates its local data; into a descendant table it is
    /// layered over this attribute and inherits everything. Without
    /// `keep_parent` the chain is flattened into a root attribute.
    pub fn copy(self: &Arc<Self>, request: &CopyRequest) -> Self {
        let CopyRequest {
            new_name,
            id,
            entries,
            same_table,
            keep_parent,
            copy_entries,
            copy_values,
        } = request;

        if *keep_parent && !*same_table {
            return Self::new(
                new_name.clone(),
                *id,
                self.default_value.clone(),
                self.allows_interpolation,
                Some(Arc::clone(self)),
                Arc::clone(entries),
            );
        }

        if *keep_parent {
            let copy = Self::new(
                new_name.clone(),
                *id,
                self.default_value.clone(),
                self.allows_interpolation,
                self.parent.clone(),
                Arc::clone(entries),
            );
            let values = if *copy_values || *copy_entries {
                self.local_values()
            } else {
                Vec::new()
            };
            let bindings = if *copy_entries {
                self.local_bindings()
            } else {
                Vec::new()
            };
            return copy.restore(values, bindings);
        }

        let copy = Self::new(
            new_name.clone(),
            *id,
            self.default_value.clone(),
            self.allows_interpolation,
            None,
            Arc::clone(entries),
        );
        let values = if *copy_values || *copy_entries {
            self.chain_values()
        } else {
            Vec::new()
        };
        let bindings: Vec<_> = if *copy_entries {
            (0..self.entries.item_count())
                .map(EntryKey::new)
                .filter_map(|e| {
                    let key = self.get_value_key(e);
                    (!key.is_default()).then_some((e, key))
                })
                .collect()
        } else {
            Vec::new()
        };
        copy.restore(values, bindings)
    }

    /// Empty attribute in a child table, chained to this one.
    pub(crate) fn derive_child(self: &Arc<Self>, id: AttributeId, entries: Arc<EntryIndex>) -> Self {
        Self::new(
            self.name(),
            id,
            self.default_value.clone(),
            self.allows_interpolation,
            Some(Arc::clone(self)),
            entries,
        )
    }
}
