//! Boolean logic over `Bool` inputs.
#![allow(clippy::unnecessary_literal_bound)]

use attrstore_error::Result;
use attrstore_types::ValueKind;

use crate::OperationRegistry;
use crate::operation::{AttributeOperation, KindSupport};
use crate::pipeline::OperationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
    Xor,
    Not,
}

impl AttributeOperation for BooleanOp {
    fn name(&self) -> &str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Not => "not",
        }
    }

    fn num_inputs(&self) -> usize {
        if *self == Self::Not { 1 } else { 2 }
    }

    fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
        KindSupport::when(kind == ValueKind::Bool)
    }

    fn output_kind(&self, _pin: usize, _most_complex: ValueKind) -> ValueKind {
        ValueKind::Bool
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        match self {
            Self::And => cx.apply_binary::<bool, bool, bool>(0, |a, b| Some(*a && *b)),
            Self::Or => cx.apply_binary::<bool, bool, bool>(0, |a, b| Some(*a || *b)),
            Self::Xor => cx.apply_binary::<bool, bool, bool>(0, |a, b| Some(a != b)),
            Self::Not => cx.apply_unary::<bool, bool>(0, |a| Some(!*a)),
        }
    }
}

pub fn register_boolean_builtins(registry: &mut OperationRegistry) {
    for op in [BooleanOp::And, BooleanOp::Or, BooleanOp::Xor, BooleanOp::Not] {
        registry.register(op);
    }
}

#[cfg(test)]
mod tests {
    use attrstore_core::AttributeTable;
    use attrstore_types::EntryKey;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline::{OperationInput, OperationRequest, run_operation};

    #[test]
    fn truth_tables() {
        let t = AttributeTable::new_root();
        let p = t.create_attribute("p", false, false, false).unwrap();
        let q = t.create_attribute("q", false, false, false).unwrap();
        let keys = t.add_entries(4);
        for (i, k) in keys.iter().enumerate() {
            p.set_value(*k, i & 1 == 1);
            q.set_value(*k, i & 2 == 2);
        }
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "p", keys.clone()),
            OperationInput::entries(&t, "q", keys.clone()),
        ]);
        let config = PipelineConfig::default();
        let and = run_operation(&BooleanOp::And, &req, &config);
        assert_eq!(and.values::<bool>(0), vec![false, false, false, true]);
        let or = run_operation(&BooleanOp::Or, &req, &config);
        assert_eq!(or.values::<bool>(0), vec![false, true, true, true]);
        let xor = run_operation(&BooleanOp::Xor, &req, &config);
        assert_eq!(xor.values::<bool>(0), vec![false, true, true, false]);

        let req = OperationRequest::new(vec![OperationInput::entries(&t, "p", keys)]);
        let not = run_operation(&BooleanOp::Not, &req, &config);
        assert_eq!(not.values::<bool>(0), vec![true, false, true, false]);
        assert!(*not.typed_attribute::<bool>(0).unwrap().default_value());
    }

    #[test]
    fn integers_are_not_booleans() {
        let t = AttributeTable::new_root();
        t.create_attribute("n", 0_i32, true, false).unwrap();
        let k = t.add_entry(EntryKey::INVALID);
        let req = OperationRequest::new(vec![OperationInput::entries(&t, "n", vec![k])]);
        let out = run_operation(&BooleanOp::Not, &req, &PipelineConfig::default());
        assert!(out.is_empty());
    }
}
