//! Bitwise operations. Integer and boolean inputs are widened to `Int64`,
//! which is also the output kind.
#![allow(clippy::unnecessary_literal_bound)]

use attrstore_error::Result;
use attrstore_types::ValueKind;

use crate::OperationRegistry;
use crate::operation::{AttributeOperation, KindSupport};
use crate::pipeline::OperationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
    Not,
}

impl AttributeOperation for BitwiseOp {
    fn name(&self) -> &str {
        match self {
            Self::And => "bit_and",
            Self::Or => "bit_or",
            Self::Xor => "bit_xor",
            Self::Not => "bit_not",
        }
    }

    fn num_inputs(&self) -> usize {
        if *self == Self::Not { 1 } else { 2 }
    }

    fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
        KindSupport::when(kind.is_integer() || kind == ValueKind::Bool)
    }

    fn output_kind(&self, _pin: usize, _most_complex: ValueKind) -> ValueKind {
        ValueKind::Int64
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        match self {
            Self::And => cx.apply_binary::<i64, i64, i64>(0, |a, b| Some(a & b)),
            Self::Or => cx.apply_binary::<i64, i64, i64>(0, |a, b| Some(a | b)),
            Self::Xor => cx.apply_binary::<i64, i64, i64>(0, |a, b| Some(a ^ b)),
            Self::Not => cx.apply_unary::<i64, i64>(0, |a| Some(!a)),
        }
    }
}

pub fn register_bitwise_builtins(registry: &mut OperationRegistry) {
    for op in [BitwiseOp::And, BitwiseOp::Or, BitwiseOp::Xor, BitwiseOp::Not] {
        registry.register(op);
    }
}
