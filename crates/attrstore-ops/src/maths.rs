//! Arithmetic operations.
//!
//! Binary arithmetic runs at the working kind and is only offered for kinds
//! whose capability table has the matching primitive, so `add` accepts
//! rotators but not quaternions, `multiply` accepts transforms but not
//! rotators. Integer division by zero yields 0; float division follows IEEE.
#![allow(clippy::unnecessary_literal_bound)]

use attrstore_core::MergeOp;
use attrstore_error::Result;
use attrstore_types::{KindVisitor, MetadataType, MetadataValue, ValueKind, dispatch};

use crate::OperationRegistry;
use crate::operation::{AttributeOperation, KindSupport};
use crate::pipeline::OperationContext;

/// `add`, `subtract`, `multiply`, `divide`, `min`, `max`.
#[derive(Debug, Clone, Copy)]
pub struct BinaryMaths {
    op: MergeOp,
}

impl BinaryMaths {
    #[must_use]
    pub const fn new(op: MergeOp) -> Self {
        Self { op }
    }
}

struct Arith<'c, 'a> {
    cx: &'c mut OperationContext<'a>,
    op: MergeOp,
}

impl KindVisitor for Arith<'_, '_> {
    type Output = Result<()>;

    fn visit<T: MetadataType>(self) -> Result<()> {
        let op = self.op;
        self.cx.apply_binary::<T, T, T>(0, move |a, b| op.apply(a, b))
    }
}

impl AttributeOperation for BinaryMaths {
    fn name(&self) -> &str {
        match self.op {
            MergeOp::Add => "add",
            MergeOp::Sub => "subtract",
            MergeOp::Mul => "multiply",
            MergeOp::Div => "divide",
            MergeOp::Min => "min",
            MergeOp::Max => "max",
        }
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
        let traits = kind.traits();
        KindSupport::when(match self.op {
            MergeOp::Add | MergeOp::Sub => traits.can_sub_add,
            MergeOp::Mul | MergeOp::Div => traits.can_mul_div,
            MergeOp::Min | MergeOp::Max => traits.can_min_max,
        })
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        let kind = cx.working_kind();
        dispatch(kind, Arith { cx, op: self.op })
    }
}

/// Unary `negate` or `abs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryMaths {
    Negate,
    Abs,
}

struct Unary<'c, 'a> {
    cx: &'c mut OperationContext<'a>,
    op: UnaryMaths,
}

impl KindVisitor for Unary<'_, '_> {
    type Output = Result<()>;

    fn visit<T: MetadataType>(self) -> Result<()> {
        match self.op {
            UnaryMaths::Negate => self.cx.apply_unary::<T, T>(0, |a| T::zero_value().sub(a)),
            UnaryMaths::Abs => self.cx.apply_unary::<T, T>(0, abs_of::<T>),
        }
    }
}

fn abs_of<T: MetadataType>(a: &T) -> Option<T> {
    let abs = match a.clone().into_value() {
        MetadataValue::Int32(i) => MetadataValue::Int32(i.wrapping_abs()),
        MetadataValue::Int64(i) => MetadataValue::Int64(i.wrapping_abs()),
        MetadataValue::Float(f) => MetadataValue::Float(f.abs()),
        MetadataValue::Double(d) => MetadataValue::Double(d.abs()),
        MetadataValue::Vector2(v) => MetadataValue::Vector2(v.abs()),
        MetadataValue::Vector3(v) => MetadataValue::Vector3(v.abs()),
        MetadataValue::Vector4(v) => MetadataValue::Vector4(v.abs()),
        _ => return None,
    };
    T::from_value(&abs)
}

impl AttributeOperation for UnaryMaths {
    fn name(&self) -> &str {
        match self {
            Self::Negate => "negate",
            Self::Abs => "abs",
        }
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
        KindSupport::when(match self {
            Self::Negate => kind.traits().can_sub_add,
            Self::Abs => kind.is_numeric() || kind.is_vector(),
        })
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        let kind = cx.working_kind();
        dispatch(kind, Unary { cx, op: *self })
    }
}

/// `lerp(a, b, ratio)` = `a + (b - a) * ratio`.
///
/// The ratio pin is read as a double and does not take part in working-kind
/// resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lerp;

struct LerpAt<'c, 'a> {
    cx: &'c mut OperationContext<'a>,
}

impl KindVisitor for LerpAt<'_, '_> {
    type Output = Result<()>;

    fn visit<T: MetadataType>(self) -> Result<()> {
        self.cx
            .apply_ternary::<T, T, f64, T>(0, |a, b, t| a.weighted_sum(&b.sub(a)?, *t))
    }
}

impl AttributeOperation for Lerp {
    fn name(&self) -> &str {
        "lerp"
    }

    fn num_inputs(&self) -> usize {
        3
    }

    fn input_label(&self, pin: usize) -> &str {
        match pin {
            0 => "InputA",
            1 => "InputB",
            _ => "Ratio",
        }
    }

    fn is_supported_kind(&self, kind: ValueKind, pin: usize) -> KindSupport {
        if pin == 2 {
            return KindSupport::special_when(kind.is_numeric());
        }
        let traits = kind.traits();
        KindSupport::when(traits.can_sub_add && traits.can_interpolate)
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        let kind = cx.working_kind();
        dispatch(kind, LerpAt { cx })
    }
}

pub fn register_maths_builtins(registry: &mut OperationRegistry) {
    for op in [
        MergeOp::Add,
        MergeOp::Sub,
        MergeOp::Mul,
        MergeOp::Div,
        MergeOp::Min,
        MergeOp::Max,
    ] {
        registry.register(BinaryMaths::new(op));
    }
    registry.register(UnaryMaths::Negate);
    registry.register(UnaryMaths::Abs);
    registry.register(Lerp);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use attrstore_core::AttributeTable;
    use attrstore_types::{EntryKey, Quat, Vector3};

    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline::{OperationInput, OperationOutput, OperationRequest, run_operation};

    fn column<T: MetadataType>(table: &AttributeTable, name: &str, values: &[T]) -> Vec<EntryKey> {
        let attr = table
            .create_attribute(name, T::zero_value(), true, false)
            .unwrap();
        values
            .iter()
            .map(|v| {
                let k = table.add_entry(EntryKey::INVALID);
                attr.set_value(k, v.clone());
                k
            })
            .collect()
    }

    fn run2(
        op: &dyn AttributeOperation,
        t: &Arc<AttributeTable>,
        a: &str,
        b: &str,
        keys: &[EntryKey],
    ) -> OperationOutput {
        let req = OperationRequest::new(vec![
            OperationInput::entries(t, a, keys.to_vec()),
            OperationInput::entries(t, b, keys.to_vec()),
        ]);
        run_operation(op, &req, &PipelineConfig::default())
    }

    #[test]
    fn integer_arithmetic() {
        let t = AttributeTable::new_root();
        let ka = column(&t, "a", &[7_i32, -3, 8]);
        let b = t.create_attribute("b", 0_i32, true, false).unwrap();
        for (k, v) in ka.iter().zip([2, 4, 0]) {
            b.set_value(*k, v);
        }
        let sub = run2(&BinaryMaths::new(MergeOp::Sub), &t, "a", "b", &ka);
        assert_eq!(sub.values::<i32>(0), vec![5, -7, 8]);
        let div = run2(&BinaryMaths::new(MergeOp::Div), &t, "a", "b", &ka);
        assert_eq!(div.values::<i32>(0), vec![3, 0, 0]);
        let max = run2(&BinaryMaths::new(MergeOp::Max), &t, "a", "b", &ka);
        assert_eq!(max.values::<i32>(0), vec![7, 4, 8]);
    }

    #[test]
    fn mixed_kinds_promote() {
        let t = AttributeTable::new_root();
        let keys = column(&t, "v", &[Vector3::new(1.0, 2.0, 3.0)]);
        let s = t.create_attribute("s", 0.0_f32, true, false).unwrap();
        s.set_value(keys[0], 2.0);
        let out = run2(&BinaryMaths::new(MergeOp::Mul), &t, "v", "s", &keys);
        assert_eq!(out.values::<Vector3>(0), vec![Vector3::new(2.0, 4.0, 6.0)]);
    }

    #[test]
    fn add_rejects_quaternions() {
        let t = AttributeTable::new_root();
        let keys = column(&t, "q", &[Quat::IDENTITY]);
        let out = run2(&BinaryMaths::new(MergeOp::Add), &t, "q", "q", &keys);
        assert!(out.is_empty());
        let out = run2(&BinaryMaths::new(MergeOp::Mul), &t, "q", "q", &keys);
        assert_eq!(out.values::<Quat>(0), vec![Quat::IDENTITY]);
    }

    #[test]
    fn negate_and_abs() {
        let t = AttributeTable::new_root();
        let keys = column(&t, "x", &[-1.5_f64, 2.0]);
        let req = OperationRequest::new(vec![OperationInput::entries(&t, "x", keys)]);
        let neg = run_operation(&UnaryMaths::Negate, &req, &PipelineConfig::default());
        assert_eq!(neg.values::<f64>(0), vec![1.5, -2.0]);
        let abs = run_operation(&UnaryMaths::Abs, &req, &PipelineConfig::default());
        assert_eq!(abs.values::<f64>(0), vec![1.5, 2.0]);
    }

    #[test]
    fn abs_of_vector_is_componentwise() {
        assert_eq!(
            abs_of(&Vector3::new(-1.0, 2.0, -3.0)),
            Some(Vector3::new(1.0, 2.0, 3.0))
        );
        assert_eq!(abs_of(&true), None);
    }

    #[test]
    fn lerp_reads_ratio_as_double() {
        let t = AttributeTable::new_root();
        let keys = column(&t, "a", &[0.0_f64, 10.0]);
        let b = t.create_attribute("b", 0.0_f64, true, false).unwrap();
        b.set_value(keys[0], 4.0);
        b.set_value(keys[1], 20.0);
        let r = t.create_attribute("r", 0_i32, true, false).unwrap();
        let rk = t.add_entry(EntryKey::INVALID);
        r.set_value(rk, 1);
        t.create_attribute("half", 0.5_f32, true, false).unwrap();

        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", keys.clone()),
            OperationInput::entries(&t, "b", keys.clone()),
            OperationInput::attribute_entries(&t, "half"),
        ]);
        let out = run_operation(&Lerp, &req, &PipelineConfig::default());
        assert_eq!(out.values::<f64>(0), vec![2.0, 15.0]);

        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", keys.clone()),
            OperationInput::entries(&t, "b", keys),
            OperationInput::entries(&t, "r", vec![rk]),
        ]);
        let out = run_operation(&Lerp, &req, &PipelineConfig::default());
        assert_eq!(out.values::<f64>(0), vec![4.0, 20.0]);
    }

    #[test]
    fn lerp_ratio_must_be_numeric() {
        assert!(!Lerp.is_supported_kind(ValueKind::Vector3, 2).supported);
        assert!(Lerp.is_supported_kind(ValueKind::Float, 2).has_special_requirement);
        assert!(!Lerp.is_supported_kind(ValueKind::Quat, 0).supported);
    }
}
