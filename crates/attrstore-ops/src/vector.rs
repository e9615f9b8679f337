//! Vector decomposition.
//!
//! Inputs of any vector kind are read as `Vector4`; narrower vectors come in
//! with their missing components at zero.
#![allow(clippy::unnecessary_literal_bound)]

use attrstore_error::Result;
use attrstore_types::{ValueKind, Vector4};

use crate::OperationRegistry;
use crate::operation::{AttributeOperation, KindSupport};
use crate::pipeline::OperationContext;

const COMPONENTS: [&str; 4] = ["X", "Y", "Z", "W"];

/// One input, four `Double` outputs (X, Y, Z, W). Disconnected pins are
/// skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakVector;

fn component(v: &Vector4, pin: usize) -> f64 {
    match pin {
        0 => v.x,
        1 => v.y,
        2 => v.z,
        _ => v.w,
    }
}

impl AttributeOperation for BreakVector {
    fn name(&self) -> &str {
        "break_vector"
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        COMPONENTS.len()
    }

    fn output_label(&self, pin: usize) -> &str {
        COMPONENTS.get(pin).copied().unwrap_or("W")
    }

    fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
        KindSupport::when(kind.is_vector())
    }

    fn output_kind(&self, _pin: usize, _most_complex: ValueKind) -> ValueKind {
        ValueKind::Double
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        for pin in 0..COMPONENTS.len() {
            cx.apply_unary::<Vector4, f64>(pin, move |v| Some(component(v, pin)))?;
        }
        Ok(())
    }
}

/// Euclidean length of a vector, as `Double`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Length;

impl AttributeOperation for Length {
    fn name(&self) -> &str {
        "length"
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
        KindSupport::when(kind.is_vector())
    }

    fn output_kind(&self, _pin: usize, _most_complex: ValueKind) -> ValueKind {
        ValueKind::Double
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        cx.apply_unary::<Vector4, f64>(0, |v| Some(v.length()))
    }
}

pub fn register_vector_builtins(registry: &mut OperationRegistry) {
    registry.register(BreakVector);
    registry.register(Length);
}
