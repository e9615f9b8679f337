//! Trigonometric operations.
//!
//! Inputs are any numeric kind, read as double; output is `Double`. Angles
//! are radians except for the two conversion operations.
#![allow(clippy::unnecessary_literal_bound)]

use attrstore_error::Result;
use attrstore_types::ValueKind;

use crate::OperationRegistry;
use crate::operation::{AttributeOperation, KindSupport};
use crate::pipeline::OperationContext;

/// A one-argument function of a double.
#[derive(Debug, Clone, Copy)]
pub struct Trig {
    name: &'static str,
    f: fn(f64) -> f64,
}

impl Trig {
    #[must_use]
    pub const fn new(name: &'static str, f: fn(f64) -> f64) -> Self {
        Self { name, f }
    }
}

impl AttributeOperation for Trig {
    fn name(&self) -> &str {
        self.name
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
        KindSupport::when(kind.is_numeric())
    }

    fn output_kind(&self, _pin: usize, _most_complex: ValueKind) -> ValueKind {
        ValueKind::Double
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        let f = self.f;
        cx.apply_unary::<f64, f64>(0, move |x| Some(f(*x)))
    }
}

/// `atan2(y, x)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Atan2;

impl AttributeOperation for Atan2 {
    fn name(&self) -> &str {
        "atan2"
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn input_label(&self, pin: usize) -> &str {
        if pin == 0 { "Y" } else { "X" }
    }

    fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
        KindSupport::when(kind.is_numeric())
    }

    fn output_kind(&self, _pin: usize, _most_complex: ValueKind) -> ValueKind {
        ValueKind::Double
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        cx.apply_binary::<f64, f64, f64>(0, |y, x| Some(y.atan2(*x)))
    }
}

pub fn register_trig_builtins(registry: &mut OperationRegistry) {
    registry.register(Trig::new("sin", f64::sin));
    registry.register(Trig::new("cos", f64::cos));
    registry.register(Trig::new("tan", f64::tan));
    registry.register(Trig::new("asin", f64::asin));
    registry.register(Trig::new("acos", f64::acos));
    registry.register(Trig::new("atan", f64::atan));
    registry.register(Trig::new("deg_to_rad", f64::to_radians));
    registry.register(Trig::new("rad_to_deg", f64::to_degrees));
    registry.register(Atan2);
}
