//! Binary image of one table.
//!
//! ```text
//! magic "ATRS" | version | item_key_offset | attribute count
//! per attribute, in id order:
//!   name | type tag | interpolation flag | parent flag | id
//!   | value_key_offset | default | values | (entry, value key) pairs
//! parent-key count | parent keys
//! ```
//!
//! Integers are varints (zig-zag when signed), floats big-endian IEEE bits,
//! strings length-prefixed UTF-8. The layout is versioned but not a stable
//! storage format.

use std::collections::HashSet;
use std::sync::Arc;

use attrstore_error::{AttrError, Result};
use attrstore_types::encoding::{ByteReader, put_signed, put_str, put_varint, read_value};
use attrstore_types::{
    AttributeId, EntryKey, KindVisitor, MetadataType, ValueKey, dispatch_tag,
};
use tracing::{debug, error};

use crate::attribute::Attribute;
use crate::entries::EntryIndex;
use crate::erased::{AttributeBase, downcast_attribute};
use crate::observe::{DiagnosticObserver, NoOpObserver};
use crate::table::AttributeTable;

pub const MAGIC: &[u8; 4] = b"ATRS";
pub const VERSION: u64 = 1;

/// Serialize the local content of `table`.
///
/// Parent-linked attributes record only their own values and bindings; the
/// parent table must be supplied again on decode.
#[must_use]
pub fn encode_table(table: &AttributeTable) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    put_varint(&mut buf, VERSION);
    put_signed(&mut buf, table.item_key_offset());

    let attrs = table.attributes_sorted();
    put_varint(&mut buf, attrs.len() as u64);
    for attr in &attrs {
        put_str(&mut buf, &attr.name());
        put_varint(&mut buf, u64::from(attr.kind().tag()));
        buf.push(u8::from(attr.allows_interpolation()));
        buf.push(u8::from(attr.has_parent()));
        put_signed(&mut buf, attr.id().get());
        put_signed(&mut buf, attr.value_key_offset());
        attr.encode_payload(&mut buf);
    }

    let parent_keys = table.entries().parent_keys();
    put_varint(&mut buf, parent_keys.len() as u64);
    for key in parent_keys {
        put_signed(&mut buf, key.get());
    }
    debug!(table = %table.id(), bytes = buf.len(), attributes = attrs.len(), "table encoded");
    buf
}

fn truncated(what: &str) -> AttrError {
    AttrError::corrupt(format!("truncated while reading {what}"))
}

fn flag(reader: &mut ByteReader<'_>, what: &str) -> Result<bool> {
    reader.bool().ok_or_else(|| AttrError::corrupt(format!("bad {what} flag")))
}

struct AttributeHeader<'a> {
    name: String,
    id: AttributeId,
    allows_interpolation: bool,
    value_key_offset: i64,
    parent: Option<&'a Arc<dyn AttributeBase>>,
    entries: &'a Arc<EntryIndex>,
}

struct DecodeAttribute<'a, 'r, 'b> {
    header: AttributeHeader<'a>,
    reader: &'r mut ByteReader<'b>,
}

fn read_typed<T: MetadataType>(reader: &mut ByteReader<'_>, what: &str) -> Result<T> {
    read_value(reader, T::KIND)
        .and_then(|v| T::from_value(&v))
        .ok_or_else(|| truncated(what))
}

impl KindVisitor for DecodeAttribute<'_, '_, '_> {
    type Output = Result<Arc<dyn AttributeBase>>;

    fn visit<T: MetadataType>(self) -> Self::Output {
        let Self { header, reader } = self;
        let parent = header
            .parent
            .map(|p| {
                downcast_attribute::<T>(p).ok_or_else(|| {
                    AttrError::type_mismatch(&header.name, T::KIND, p.kind())
                })
            })
            .transpose()?;

        let default = read_typed::<T>(reader, "default value")?;
        let count = reader.length().ok_or_else(|| truncated("value count"))?;
        let mut values = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            values.push(read_typed::<T>(reader, "value")?);
        }
        let count = reader.length().ok_or_else(|| truncated("binding count"))?;
        let mut bindings = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let entry = reader.signed().ok_or_else(|| truncated("binding entry"))?;
            let key = reader.signed().ok_or_else(|| truncated("binding value key"))?;
            bindings.push((EntryKey::new(entry), ValueKey::new(key)));
        }

        let attr = Attribute::new(
            header.name,
            header.id,
            default,
            header.allows_interpolation,
            parent,
            Arc::clone(header.entries),
        );
        if attr.value_key_offset() != header.value_key_offset {
            return Err(AttrError::corrupt(format!(
                "value key offset {} does not match parent chain ({})",
                header.value_key_offset,
                attr.value_key_offset()
            )));
        }
        Ok(Arc::new(attr.restore(values, bindings)))
    }
}

/// Rebuild a table from [`encode_table`] output.
///
/// Parent-linked attributes are re-attached to the same-named attribute of
/// `parent`. The new table inherits `parent`'s observer, or gets a no-op
/// observer as a root.
pub fn decode_table(bytes: &[u8], parent: Option<&Arc<AttributeTable>>) -> Result<Arc<AttributeTable>> {
    let result = decode(bytes, parent);
    if let Err(err) = &result {
        error!(%err, bytes = bytes.len(), "table image rejected");
    }
    result
}

fn decode(bytes: &[u8], parent: Option<&Arc<AttributeTable>>) -> Result<Arc<AttributeTable>> {
    let mut reader = ByteReader::new(bytes);
    if reader.take(4) != Some(MAGIC.as_slice()) {
        return Err(AttrError::corrupt("bad magic"));
    }
    let version = reader.varint().ok_or_else(|| truncated("version"))?;
    if version != VERSION {
        return Err(AttrError::corrupt(format!("unsupported version {version}")));
    }
    let item_key_offset = reader.signed().ok_or_else(|| truncated("item key offset"))?;
    match parent {
        None if item_key_offset != 0 => {
            return Err(AttrError::InvalidParent {
                detail: format!("image has item key offset {item_key_offset} but no parent"),
            });
        }
        Some(p) if item_key_offset > p.item_count() || item_key_offset < 0 => {
            return Err(AttrError::InvalidParent {
                detail: format!(
                    "image item key offset {item_key_offset} exceeds parent item count {}",
                    p.item_count()
                ),
            });
        }
        _ => {}
    }

    let observer = parent.map_or_else(
        || Arc::new(NoOpObserver) as Arc<dyn DiagnosticObserver>,
        |p| Arc::clone(p.observer()),
    );

    // Parent keys trail the attributes; rows are appended to the shared
    // index once every attribute is built.
    let attr_count = reader.length().ok_or_else(|| truncated("attribute count"))?;
    let table = AttributeTable::restored(parent, observer, item_key_offset, |entries| {
        let mut attrs = Vec::with_capacity(attr_count.min(1024));
        let mut seen = HashSet::new();
        for _ in 0..attr_count {
            let name = reader.str().ok_or_else(|| truncated("attribute name"))?.to_owned();
            if !seen.insert(name.clone()) {
                return Err(AttrError::corrupt(format!("duplicate attribute {name}")));
            }
            let tag = reader.u16().ok_or_else(|| truncated("type tag"))?;
            let allows_interpolation = flag(&mut reader, "interpolation")?;
            let linked = flag(&mut reader, "parent")?;
            let id = reader.signed().ok_or_else(|| truncated("attribute id"))?;
            let value_key_offset = reader.signed().ok_or_else(|| truncated("value key offset"))?;

            let parent_attr = if linked {
                let found = parent.and_then(|p| p.attribute(&name));
                Some(found.ok_or_else(|| AttrError::InvalidParent {
                    detail: format!("no parent attribute for {name}"),
                })?)
            } else {
                None
            };
            let header = AttributeHeader {
                name,
                id: AttributeId::new(id),
                allows_interpolation,
                value_key_offset,
                parent: parent_attr.as_ref(),
                entries,
            };
            let attr = dispatch_tag(
                tag,
                DecodeAttribute {
                    header,
                    reader: &mut reader,
                },
            )
            .ok_or(AttrError::UnknownTypeTag { tag })??;
            attrs.push(attr);
        }

        let rows = reader.length().ok_or_else(|| truncated("parent key count"))?;
        for _ in 0..rows {
            let key = reader.signed().ok_or_else(|| truncated("parent key"))?;
            entries.add_entry(EntryKey::new(key));
        }
        Ok(attrs)
    })?;

    if !reader.is_empty() {
        return Err(AttrError::corrupt(format!(
            "{} trailing bytes",
            bytes.len() - reader.position()
        )));
    }
    debug!(table = %table.id(), parent = ?parent.map(|p| p.id()), "table decoded");
    Ok(table)
}
