//! Element-wise operations over attribute tables.
//!
//! This crate defines the open [`AttributeOperation`] trait, the
//! [`run_operation`] pipeline that validates inputs, resolves a working kind
//! and drives per-input [`EntryIterator`]s in lock-step, and a set of
//! built-in operations.
//!
//! It also provides a small in-memory [`OperationRegistry`] for registering
//! and resolving operations by name, case-insensitively.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

pub mod bitwise;
pub mod boolean;
pub mod compare;
pub mod config;
pub mod iterator;
pub mod maths;
pub mod operation;
pub mod pipeline;
pub mod reduce;
pub mod select;
pub mod trig;
pub mod vector;

pub use bitwise::{BitwiseOp, register_bitwise_builtins};
pub use boolean::{BooleanOp, register_boolean_builtins};
pub use compare::{Compare, register_compare_builtins};
pub use config::PipelineConfig;
pub use iterator::{EntryIterator, IteratorRole, walk_lockstep};
pub use maths::{BinaryMaths, Lerp, UnaryMaths, register_maths_builtins};
pub use operation::{AttributeOperation, KindSupport};
pub use pipeline::{
    EntrySource, OperationContext, OperationInput, OperationOutput, OperationRequest, OutputPin,
    run_operation,
};
pub use reduce::{Reduce, register_reduce_builtins};
pub use select::{Select, register_select_builtins};
pub use trig::{Atan2, Trig, register_trig_builtins};
pub use vector::{BreakVector, Length, register_vector_builtins};

/// Registry of operations keyed by their lowercase name.
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn AttributeOperation>>,
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.names())
            .finish()
    }
}

impl OperationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in operation.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        registry
    }

    /// Register an operation under its name.
    ///
    /// Overwrites any operation with the same name. Returns the previous
    /// operation if one existed.
    pub fn register<O>(&mut self, operation: O) -> Option<Arc<dyn AttributeOperation>>
    where
        O: AttributeOperation + 'static,
    {
        self.register_arc(Arc::new(operation))
    }

    pub fn register_arc(
        &mut self,
        operation: Arc<dyn AttributeOperation>,
    ) -> Option<Arc<dyn AttributeOperation>> {
        let key = canonical_name(operation.name());
        self.operations.insert(key, operation)
    }

    /// Look up an operation by name, ignoring ASCII case.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<dyn AttributeOperation>> {
        let canon = canonical_name(name);
        let result = self.operations.get(&canon).map(Arc::clone);
        debug!(
            name = %canon,
            hit = if result.is_some() { "exact" } else { "miss" },
            "registry lookup"
        );
        result
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(&canonical_name(name))
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.operations.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Register every built-in operation.
pub fn register_builtins(registry: &mut OperationRegistry) {
    register_maths_builtins(registry);
    register_compare_builtins(registry);
    register_boolean_builtins(registry);
    register_bitwise_builtins(registry);
    register_trig_builtins(registry);
    register_vector_builtins(registry);
    register_select_builtins(registry);
    register_reduce_builtins(registry);
}

fn canonical_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use attrstore_error::Result;
    use attrstore_types::ValueKind;

    use super::*;

    struct Nop(&'static str);

    impl AttributeOperation for Nop {
        fn name(&self) -> &str {
            self.0
        }

        fn num_inputs(&self) -> usize {
            1
        }

        fn is_supported_kind(&self, _kind: ValueKind, _pin: usize) -> KindSupport {
            KindSupport::SUPPORTED
        }

        fn execute(&self, _cx: &mut OperationContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lookup_ignores_case() {
        let mut registry = OperationRegistry::new();
        assert!(registry.register(Nop("Blend")).is_none());
        assert!(registry.find("BLEND").is_some());
        assert!(registry.find("blend").is_some());
        assert!(registry.find("blur").is_none());
        assert!(registry.contains("bLeNd"));
    }

    #[test]
    fn register_overwrites() {
        let mut registry = OperationRegistry::new();
        registry.register(Nop("x"));
        let previous = registry.register(Nop("X"));
        assert_eq!(previous.map(|p| p.name().to_owned()), Some("x".to_owned()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn builtins_registered() {
        let registry = OperationRegistry::with_builtins();
        for name in [
            "add",
            "subtract",
            "multiply",
            "divide",
            "min",
            "max",
            "negate",
            "abs",
            "lerp",
            "equal",
            "not_equal",
            "greater",
            "greater_or_equal",
            "less",
            "less_or_equal",
            "and",
            "or",
            "xor",
            "not",
            "bit_and",
            "bit_or",
            "bit_xor",
            "bit_not",
            "sin",
            "cos",
            "tan",
            "asin",
            "acos",
            "atan",
            "atan2",
            "deg_to_rad",
            "rad_to_deg",
            "break_vector",
            "length",
            "select",
            "reduce_sum",
            "reduce_average",
            "reduce_min",
            "reduce_max",
        ] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
        assert_eq!(registry.len(), 39);
        assert_eq!(registry.find("Break_Vector").unwrap().num_outputs(), 4);
    }
}
