//! Public API facade for attrstore.
//!
//! Re-exports the table model from `attrstore-core`, the value kinds from
//! `attrstore-types`, the operation pipeline and built-ins from
//! `attrstore-ops`, and the shared error type.

pub use attrstore_core::{
    Attribute, AttributeBase, AttributeTable, CopyRequest, DiagnosticCountsSnapshot,
    DiagnosticEvent, DiagnosticLog, DiagnosticObserver, EntryIndex, MergeOp, NewAttribute,
    NoOpObserver, TableArena, decode_table, downcast_attribute, encode_table,
    new_attribute_of_kind,
};
pub use attrstore_error::{AttrError, ErrorCategory, Result};
pub use attrstore_ops::{
    AttributeOperation, EntryIterator, EntrySource, IteratorRole, KindSupport, OperationContext,
    OperationInput, OperationOutput, OperationRegistry, OperationRequest, OutputPin,
    PipelineConfig, run_operation,
};
pub use attrstore_types::{
    AttributeId, EntryKey, KindTraits, KindVisitor, MetadataType, MetadataValue, Name, Quat,
    Rotator, TableId, Transform, ValueKey, ValueKind, Vector2, Vector3, Vector4, dispatch,
};

/// Built-in operations, for callers that wire them up without a registry.
pub mod builtins {
    pub use attrstore_ops::{
        Atan2, BinaryMaths, BitwiseOp, BooleanOp, BreakVector, Compare, Length, Lerp, Reduce,
        Select, Trig, UnaryMaths, register_builtins,
    };
}

/// Look up `name` in `registry` and run it.
///
/// `None` when no operation of that name is registered.
pub fn run_named(
    registry: &OperationRegistry,
    name: &str,
    request: &OperationRequest,
    config: &PipelineConfig,
) -> Option<OperationOutput> {
    let operation = registry.find(name)?;
    Some(run_operation(operation.as_ref(), request, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_named_resolves_case_insensitively() {
        let registry = OperationRegistry::with_builtins();
        let table = AttributeTable::new_root();
        let n = table.create_attribute("n", 0_i32, true, false).unwrap();
        let keys = table.add_entries(2);
        n.set_value(keys[0], -3);
        n.set_value(keys[1], 4);
        let request = OperationRequest::new(vec![OperationInput::entries(&table, "n", keys)]);

        let out = run_named(&registry, "ABS", &request, &PipelineConfig::default()).unwrap();
        assert_eq!(out.values::<i32>(0), vec![3, 4]);
        assert!(run_named(&registry, "blur", &request, &PipelineConfig::default()).is_none());
    }
}
