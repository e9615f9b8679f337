//! Kind-erased view of an attribute.
//!
//! Tables hold `Arc<dyn AttributeBase>`. Concrete [`Attribute<T>`] values
//! are only built through [`new_attribute_of_kind`] (kind chosen by
//! [`dispatch`]) or the table's typed constructors, so the runtime kind of
//! an erased attribute always equals `T::KIND`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use attrstore_error::{AttrError, Result};
use attrstore_types::encoding::{put_signed, put_value, put_varint};
use attrstore_types::{
    AttributeId, EntryKey, KindVisitor, MetadataType, MetadataValue, ValueKey, ValueKind,
    dispatch,
};
use tracing::error;

use crate::attribute::{Attribute, CopyRequest, MergeOp};
use crate::entries::EntryIndex;

/// Object-safe interface over `Attribute<T>` for every `T`.
pub trait AttributeBase: Send + Sync + fmt::Debug {
    fn name(&self) -> String;
    fn id(&self) -> AttributeId;
    fn kind(&self) -> ValueKind;
    fn allows_interpolation(&self) -> bool;
    fn has_parent(&self) -> bool;
    fn value_key_offset(&self) -> i64;
    fn value_count(&self) -> usize;
    fn entry_count(&self) -> usize;
    fn local_entry_keys(&self) -> Vec<EntryKey>;

    fn default_value(&self) -> MetadataValue;
    fn value_from_item_key(&self, entry: EntryKey) -> MetadataValue;
    fn value_key(&self, entry: EntryKey) -> ValueKey;
    fn value(&self, key: ValueKey) -> MetadataValue;
    fn has_non_default_value(&self, entry: EntryKey) -> bool;

    /// Store `value` after broadcasting it to this attribute's kind.
    ///
    /// Returns `false` when the value cannot be broadcast.
    fn set_value_erased(&self, entry: EntryKey, value: &MetadataValue) -> bool;
    fn set_value_key(&self, entry: EntryKey, key: ValueKey);
    fn clear_entries(&self);

    /// `false` when `source` is of another kind.
    fn set_value_from(&self, entry: EntryKey, source: &dyn AttributeBase, source_entry: EntryKey)
    -> bool;

    /// Binary merge. A side whose kind differs is treated as absent; the
    /// return value is `false` if that happened.
    fn merge_value(
        &self,
        entry: EntryKey,
        a: Option<(&dyn AttributeBase, EntryKey)>,
        b: Option<(&dyn AttributeBase, EntryKey)>,
        op: MergeOp,
    ) -> bool;

    fn accumulate_value(
        &self,
        entry: EntryKey,
        other: &dyn AttributeBase,
        other_entry: EntryKey,
        weight: f64,
    ) -> bool;
    fn set_zero_value(&self, entry: EntryKey);

    fn copy(self: Arc<Self>, request: &CopyRequest) -> Arc<dyn AttributeBase>;

    /// Empty, parent-linked attribute for a child table.
    fn derive_child(self: Arc<Self>, id: AttributeId, entries: Arc<EntryIndex>)
    -> Arc<dyn AttributeBase>;

    /// Default value, local values and local bindings.
    fn encode_payload(&self, buf: &mut Vec<u8>);

    #[doc(hidden)]
    fn set_name(&self, name: &str);
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Checked downcast of an erased handle.
pub fn downcast_attribute<T: MetadataType>(
    attribute: &Arc<dyn AttributeBase>,
) -> Option<Arc<Attribute<T>>> {
    Arc::clone(attribute)
        .into_any_arc()
        .downcast::<Attribute<T>>()
        .ok()
}

fn typed<T: MetadataType>(attribute: &dyn AttributeBase) -> Option<&Attribute<T>> {
    attribute.as_any().downcast_ref::<Attribute<T>>()
}

/// `Some(None)` marks a side that is present but of another kind.
#[allow(clippy::option_option)]
fn typed_side<'a, T: MetadataType>(
    side: Option<(&'a dyn AttributeBase, EntryKey)>,
) -> Option<Option<(&'a Attribute<T>, EntryKey)>> {
    side.map(|(attr, key)| typed::<T>(attr).map(|t| (t, key)))
}

impl<T: MetadataType> AttributeBase for Attribute<T> {
    fn name(&self) -> String {
        Self::name(self)
    }

    fn id(&self) -> AttributeId {
        Self::id(self)
    }

    fn kind(&self) -> ValueKind {
        T::KIND
    }

    fn allows_interpolation(&self) -> bool {
        Self::allows_interpolation(self)
    }

    fn has_parent(&self) -> bool {
        self.parent().is_some()
    }

    fn value_key_offset(&self) -> i64 {
        Self::value_key_offset(self)
    }

    fn value_count(&self) -> usize {
        Self::value_count(self)
    }

    fn entry_count(&self) -> usize {
        Self::entry_count(self)
    }

    fn local_entry_keys(&self) -> Vec<EntryKey> {
        Self::local_entry_keys(self)
    }

    fn default_value(&self) -> MetadataValue {
        Self::default_value(self).clone().into_value()
    }

    fn value_from_item_key(&self, entry: EntryKey) -> MetadataValue {
        self.get_value_from_item_key(entry).into_value()
    }

    fn value_key(&self, entry: EntryKey) -> ValueKey {
        self.get_value_key(entry)
    }

    fn value(&self, key: ValueKey) -> MetadataValue {
        self.get_value(key).into_value()
    }

    fn has_non_default_value(&self, entry: EntryKey) -> bool {
        Self::has_non_default_value(self, entry)
    }

    fn set_value_erased(&self, entry: EntryKey, value: &MetadataValue) -> bool {
        let Some(value) = T::from_broadcast(value) else {
            error!(
                attribute = %self.name(),
                from = %value.kind(),
                to = %T::KIND,
                "value does not broadcast to attribute kind"
            );
            return false;
        };
        self.set_value(entry, value);
        true
    }

    fn set_value_key(&self, entry: EntryKey, key: ValueKey) {
        Self::set_value_key(self, entry, key);
    }

    fn clear_entries(&self) {
        Self::clear_entries(self);
    }

    fn set_value_from(
        &self,
        entry: EntryKey,
        source: &dyn AttributeBase,
        source_entry: EntryKey,
    ) -> bool {
        let Some(source) = typed::<T>(source) else {
            return false;
        };
        Self::set_value_from(self, entry, source, source_entry);
        true
    }

    fn merge_value(
        &self,
        entry: EntryKey,
        a: Option<(&dyn AttributeBase, EntryKey)>,
        b: Option<(&dyn AttributeBase, EntryKey)>,
        op: MergeOp,
    ) -> bool {
        let (a, b) = (typed_side::<T>(a), typed_side::<T>(b));
        let clean = !matches!(a, Some(None)) && !matches!(b, Some(None));
        Self::merge_value(self, entry, a.flatten(), b.flatten(), op);
        clean
    }

    fn accumulate_value(
        &self,
        entry: EntryKey,
        other: &dyn AttributeBase,
        other_entry: EntryKey,
        weight: f64,
    ) -> bool {
        let Some(other) = typed::<T>(other) else {
            return false;
        };
        Self::accumulate_value(self, entry, other, other_entry, weight);
        true
    }

    fn set_zero_value(&self, entry: EntryKey) {
        Self::set_zero_value(self, entry);
    }

    fn copy(self: Arc<Self>, request: &CopyRequest) -> Arc<dyn AttributeBase> {
        Arc::new(Self::copy(&self, request))
    }

    fn derive_child(
        self: Arc<Self>,
        id: AttributeId,
        entries: Arc<EntryIndex>,
    ) -> Arc<dyn AttributeBase> {
        Arc::new(Self::derive_child(&self, id, entries))
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) {
        put_value(buf, &self.default_value().clone().into_value());
        let values = self.local_values();
        put_varint(buf, values.len() as u64);
        for v in values {
            put_value(buf, &v.into_value());
        }
        let bindings = self.local_bindings();
        put_varint(buf, bindings.len() as u64);
        for (entry, key) in bindings {
            put_signed(buf, entry.get());
            put_signed(buf, key.get());
        }
    }

    fn set_name(&self, name: &str) {
        Self::set_name(self, name);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Arguments for building an attribute of a runtime kind.
#[derive(Debug)]
pub struct NewAttribute<'a> {
    pub name: &'a str,
    pub id: AttributeId,
    pub default_value: &'a MetadataValue,
    pub allows_interpolation: bool,
    pub parent: Option<&'a Arc<dyn AttributeBase>>,
    pub entries: Arc<EntryIndex>,
}

struct Build<'a>(NewAttribute<'a>);

impl KindVisitor for Build<'_> {
    type Output = Result<Arc<dyn AttributeBase>>;

    fn visit<T: MetadataType>(self) -> Self::Output {
        let args = self.0;
        let default = T::from_broadcast(args.default_value).ok_or_else(|| {
            AttrError::NotBroadcastable {
                from: args.default_value.kind().to_string(),
                to: T::KIND.to_string(),
            }
        })?;
        let parent = args
            .parent
            .map(|p| {
                downcast_attribute::<T>(p)
                    .ok_or_else(|| AttrError::type_mismatch(args.name, T::KIND, p.kind()))
            })
            .transpose()?;
        Ok(Arc::new(Attribute::<T>::new(
            args.name,
            args.id,
            default,
            args.allows_interpolation,
            parent,
            args.entries,
        )))
    }
}

/// Tag-checked factory: the concrete `Attribute<T>` is picked by `kind`.
///
/// The default value is broadcast to `kind`; a parent must be of `kind`.
pub fn new_attribute_of_kind(kind: ValueKind, args: NewAttribute<'_>) -> Result<Arc<dyn AttributeBase>> {
    dispatch(kind, Build(args))
}
