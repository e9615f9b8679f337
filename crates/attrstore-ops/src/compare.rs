//! Comparison operations. Output is always `Bool`.
//!
//! Equality works on every kind. Ordering comparisons need an ordered kind;
//! a float comparison against NaN leaves the row at the output default.
#![allow(clippy::unnecessary_literal_bound)]

use std::cmp::Ordering;

use attrstore_error::Result;
use attrstore_types::{KindVisitor, MetadataType, ValueKind, dispatch};

use crate::OperationRegistry;
use crate::operation::{AttributeOperation, KindSupport};
use crate::pipeline::OperationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Compare {
    pub const ALL: [Self; 6] = [
        Self::Equal,
        Self::NotEqual,
        Self::Greater,
        Self::GreaterOrEqual,
        Self::Less,
        Self::LessOrEqual,
    ];

    const fn needs_order(self) -> bool {
        !matches!(self, Self::Equal | Self::NotEqual)
    }

    fn test<T: MetadataType>(self, a: &T, b: &T) -> Option<bool> {
        match self {
            Self::Equal => Some(a == b),
            Self::NotEqual => Some(a != b),
            Self::Greater => a.compare(b).map(Ordering::is_gt),
            Self::GreaterOrEqual => a.compare(b).map(Ordering::is_ge),
            Self::Less => a.compare(b).map(Ordering::is_lt),
            Self::LessOrEqual => a.compare(b).map(Ordering::is_le),
        }
    }
}

struct Test<'c, 'a> {
    cx: &'c mut OperationContext<'a>,
    op: Compare,
}

impl KindVisitor for Test<'_, '_> {
    type Output = Result<()>;

    fn visit<T: MetadataType>(self) -> Result<()> {
        let op = self.op;
        self.cx.apply_binary::<T, T, bool>(0, move |a, b| op.test(a, b))
    }
}

impl AttributeOperation for Compare {
    fn name(&self) -> &str {
        match self {
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::Greater => "greater",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::Less => "less",
            Self::LessOrEqual => "less_or_equal",
        }
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
        KindSupport::when(!self.needs_order() || kind.is_ordered())
    }

    fn output_kind(&self, _pin: usize, _most_complex: ValueKind) -> ValueKind {
        ValueKind::Bool
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        let kind = cx.working_kind();
        dispatch(kind, Test { cx, op: *self })
    }
}

pub fn register_compare_builtins(registry: &mut OperationRegistry) {
    for op in Compare::ALL {
        registry.register(op);
    }
}

#[cfg(test)]
mod tests {
    use attrstore_core::AttributeTable;
    use attrstore_types::{EntryKey, Vector2};

    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline::{OperationInput, OperationRequest, run_operation};

    #[test]
    fn ordering_against_broadcast_threshold() {
        let t = AttributeTable::new_root();
        let x = t.create_attribute("x", 0_i64, true, false).unwrap();
        let keys: Vec<_> = [1_i64, 5, 9]
            .into_iter()
            .map(|v| {
                let k = t.add_entry(EntryKey::INVALID);
                x.set_value(k, v);
                k
            })
            .collect();
        let limit = t.create_attribute("limit", 0.0_f64, true, false).unwrap();
        let lk = t.add_entry(EntryKey::INVALID);
        limit.set_value(lk, 5.0);

        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "x", keys),
            OperationInput::entries(&t, "limit", vec![lk]),
        ]);
        let config = PipelineConfig::default();
        let ge = run_operation(&Compare::GreaterOrEqual, &req, &config);
        assert_eq!(ge.values::<bool>(0), vec![false, true, true]);
        assert_eq!(ge.attribute(0).unwrap().kind(), ValueKind::Bool);
        let lt = run_operation(&Compare::Less, &req, &config);
        assert_eq!(lt.values::<bool>(0), vec![true, false, false]);
    }

    #[test]
    fn equality_on_unordered_kinds() {
        let t = AttributeTable::new_root();
        let v = t.create_attribute("v", Vector2::ZERO, true, false).unwrap();
        let w = t.create_attribute("w", Vector2::ZERO, true, false).unwrap();
        let a = t.add_entry(EntryKey::INVALID);
        let b = t.add_entry(EntryKey::INVALID);
        v.set_value(a, Vector2::new(1.0, 2.0));
        w.set_value(a, Vector2::new(1.0, 2.0));
        v.set_value(b, Vector2::new(3.0, 0.0));

        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "v", vec![a, b]),
            OperationInput::entries(&t, "w", vec![a, b]),
        ]);
        let eq = run_operation(&Compare::Equal, &req, &PipelineConfig::default());
        assert_eq!(eq.values::<bool>(0), vec![true, false]);
        let gt = run_operation(&Compare::Greater, &req, &PipelineConfig::default());
        assert!(gt.is_empty());
    }

    #[test]
    fn nan_rows_keep_default() {
        assert_eq!(Compare::Less.test(&f64::NAN, &1.0), None);
        assert_eq!(Compare::NotEqual.test(&f64::NAN, &f64::NAN), Some(true));
    }

    #[test]
    fn text_orders_lexically() {
        assert_eq!(
            Compare::Less.test(&"apple".to_owned(), &"banana".to_owned()),
            Some(true)
        );
    }
}
