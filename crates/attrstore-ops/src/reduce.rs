//! Reductions: every row of the input collapses into one output row.
//!
//! The output attribute keeps the input's default. An input without rows
//! produces an output attribute but no row.
#![allow(clippy::unnecessary_literal_bound, clippy::cast_precision_loss)]

use attrstore_error::Result;
use attrstore_types::{KindVisitor, MetadataType, ValueKind, dispatch};

use crate::OperationRegistry;
use crate::operation::{AttributeOperation, KindSupport};
use crate::pipeline::OperationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
    Sum,
    Average,
    Min,
    Max,
}

impl Reduce {
    fn fold<T: MetadataType>(self, values: &[T]) -> Option<T> {
        let (first, rest) = values.split_first()?;
        match self {
            Self::Sum => rest.iter().try_fold(first.clone(), |acc, v| acc.add(v)),
            Self::Average => {
                let sum = Self::Sum.fold(values)?;
                T::zero_value().weighted_sum(&sum, 1.0 / values.len() as f64)
            }
            Self::Min => rest.iter().try_fold(first.clone(), |acc, v| acc.min(v)),
            Self::Max => rest.iter().try_fold(first.clone(), |acc, v| acc.max(v)),
        }
    }
}

struct Fold<'c, 'a> {
    cx: &'c mut OperationContext<'a>,
    op: Reduce,
}

impl KindVisitor for Fold<'_, '_> {
    type Output = Result<()>;

    fn visit<T: MetadataType>(self) -> Result<()> {
        let values = self.cx.gather::<T>(0)?;
        let default = self.cx.input_default::<T>(0)?;
        let reduced = self.op.fold(&values);
        self.cx.write_reduced(0, default, reduced)
    }
}

impl AttributeOperation for Reduce {
    fn name(&self) -> &str {
        match self {
            Self::Sum => "reduce_sum",
            Self::Average => "reduce_average",
            Self::Min => "reduce_min",
            Self::Max => "reduce_max",
        }
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
        let traits = kind.traits();
        KindSupport::when(match self {
            Self::Sum | Self::Average => traits.can_sub_add && traits.can_interpolate,
            Self::Min | Self::Max => traits.can_min_max,
        })
    }

    fn reduces(&self) -> bool {
        true
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        let kind = cx.working_kind();
        dispatch(kind, Fold { cx, op: *self })
    }
}

pub fn register_reduce_builtins(registry: &mut OperationRegistry) {
    for op in [Reduce::Sum, Reduce::Average, Reduce::Min, Reduce::Max] {
        registry.register(op);
    }
}

#[cfg(test)]
mod tests {
    use attrstore_core::AttributeTable;
    use attrstore_types::{EntryKey, Vector2};
    use proptest::prelude::*;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline::{OperationInput, OperationRequest, run_operation};

    #[test]
    fn reductions_over_ints() {
        let t = AttributeTable::new_root();
        let n = t.create_attribute("n", -1_i32, true, false).unwrap();
        let keys = t.add_entries(4);
        for (k, v) in keys.iter().zip([4, 9, 1, 6]) {
            n.set_value(*k, v);
        }
        let req = OperationRequest::new(vec![OperationInput::entries(&t, "n", keys)]);
        let config = PipelineConfig::default();
        let expect = [
            (Reduce::Sum, 20),
            (Reduce::Average, 5),
            (Reduce::Min, 1),
            (Reduce::Max, 9),
        ];
        for (op, want) in expect {
            let out = run_operation(&op, &req, &config);
            assert_eq!(out.entry_keys.len(), 1, "{}", op.name());
            assert_eq!(out.values::<i32>(0), vec![want], "{}", op.name());
            assert_eq!(*out.typed_attribute::<i32>(0).unwrap().default_value(), -1);
        }
    }

    #[test]
    fn fresh_output_row() {
        let t = AttributeTable::new_root();
        let v = t.create_attribute("v", Vector2::ZERO, true, false).unwrap();
        let keys = t.add_entries(2);
        v.set_value(keys[0], Vector2::new(1.0, 0.0));
        v.set_value(keys[1], Vector2::new(3.0, 2.0));
        let req = OperationRequest::new(vec![OperationInput::entries(&t, "v", keys)]);
        let out = run_operation(&Reduce::Average, &req, &PipelineConfig::default());
        let table = out.table.as_ref().unwrap();
        assert_eq!(table.local_item_count(), 1);
        assert_eq!(out.entry_keys, vec![EntryKey::new(2)]);
        assert_eq!(out.values::<Vector2>(0), vec![Vector2::new(2.0, 1.0)]);
    }

    #[test]
    fn empty_input_has_no_row() {
        let t = AttributeTable::new_root();
        t.create_attribute("n", 3.5_f64, true, false).unwrap();
        let req = OperationRequest::new(vec![OperationInput::attribute_entries(&t, "n")]);
        let out = run_operation(&Reduce::Sum, &req, &PipelineConfig::default());
        assert!(!out.is_empty());
        assert!(out.entry_keys.is_empty());
        let attr = out.typed_attribute::<f64>(0).unwrap();
        assert!((attr.default_value() - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn text_cannot_be_summed() {
        assert!(!Reduce::Sum.is_supported_kind(ValueKind::String, 0).supported);
        assert!(!Reduce::Min.is_supported_kind(ValueKind::Rotator, 0).supported);
    }

    proptest! {
        #[test]
        fn prop_min_le_average_le_max(values in proptest::collection::vec(-1.0e6_f64..1.0e6, 1..40)) {
            let min = Reduce::Min.fold(&values).unwrap();
            let max = Reduce::Max.fold(&values).unwrap();
            let avg = Reduce::Average.fold(&values).unwrap();
            prop_assert!(min <= avg + 1e-6);
            prop_assert!(avg <= max + 1e-6);
        }
    }
}
