//! Runtime kind tag → compile-time type bridge.
//!
//! Generic algorithms implement [`KindVisitor`] once; [`dispatch`] picks the
//! concrete [`MetadataType`] for a runtime [`ValueKind`]. This is the only
//! exhaustive match from kinds to Rust types in the workspace.

use tracing::debug;

use crate::kind::ValueKind;
use crate::math::{Name, Quat, Rotator, Transform, Vector2, Vector3, Vector4};
use crate::traits::MetadataType;

/// A generic callback instantiated once per supported kind.
pub trait KindVisitor {
    type Output;

    fn visit<T: MetadataType>(self) -> Self::Output;
}

/// Invoke `visitor` with the concrete type for `kind`.
pub fn dispatch<V: KindVisitor>(kind: ValueKind, visitor: V) -> V::Output {
    match kind {
        ValueKind::Bool => visitor.visit::<bool>(),
        ValueKind::Int32 => visitor.visit::<i32>(),
        ValueKind::Int64 => visitor.visit::<i64>(),
        ValueKind::Float => visitor.visit::<f32>(),
        ValueKind::Double => visitor.visit::<f64>(),
        ValueKind::Vector2 => visitor.visit::<Vector2>(),
        ValueKind::Vector3 => visitor.visit::<Vector3>(),
        ValueKind::Vector4 => visitor.visit::<Vector4>(),
        ValueKind::Rotator => visitor.visit::<Rotator>(),
        ValueKind::Quat => visitor.visit::<Quat>(),
        ValueKind::Transform => visitor.visit::<Transform>(),
        ValueKind::String => visitor.visit::<String>(),
        ValueKind::Name => visitor.visit::<Name>(),
    }
}

/// Invoke `visitor` for a raw type tag.
///
/// Returns `None` when the tag names no known kind.
pub fn dispatch_tag<V: KindVisitor>(tag: u16, visitor: V) -> Option<V::Output> {
    let Some(kind) = ValueKind::from_tag(tag) else {
        debug!(tag, "dispatch on unknown type tag");
        return None;
    };
    Some(dispatch(kind, visitor))
}
