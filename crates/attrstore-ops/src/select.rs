//! Per-row choice between two inputs.
#![allow(clippy::unnecessary_literal_bound)]

use attrstore_error::Result;
use attrstore_types::{KindVisitor, MetadataType, ValueKind, dispatch};

use crate::OperationRegistry;
use crate::operation::{AttributeOperation, KindSupport};
use crate::pipeline::OperationContext;

/// `select(condition, a, b)`: `a` where the condition holds, else `b`.
///
/// The condition pin must be `Bool` and is excluded from working-kind
/// resolution; `a` and `b` may be any broadcast-compatible kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Select;

struct Pick<'c, 'a> {
    cx: &'c mut OperationContext<'a>,
}

impl KindVisitor for Pick<'_, '_> {
    type Output = Result<()>;

    fn visit<T: MetadataType>(self) -> Result<()> {
        self.cx.apply_ternary::<bool, T, T, T>(0, |c, a, b| {
            Some(if *c { a.clone() } else { b.clone() })
        })
    }
}

impl AttributeOperation for Select {
    fn name(&self) -> &str {
        "select"
    }

    fn num_inputs(&self) -> usize {
        3
    }

    fn input_label(&self, pin: usize) -> &str {
        match pin {
            0 => "Condition",
            1 => "InputA",
            _ => "InputB",
        }
    }

    fn is_supported_kind(&self, kind: ValueKind, pin: usize) -> KindSupport {
        if pin == 0 {
            KindSupport::special_when(kind == ValueKind::Bool)
        } else {
            KindSupport::SUPPORTED
        }
    }

    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
        let kind = cx.working_kind();
        dispatch(kind, Pick { cx })
    }
}

pub fn register_select_builtins(registry: &mut OperationRegistry) {
    registry.register(Select);
}

#[cfg(test)]
mod tests {
    use attrstore_core::AttributeTable;
    use attrstore_error::AttrError;
    use attrstore_types::Name;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline::{OperationInput, OperationRequest, run_operation};

    #[test]
    fn picks_per_row_with_broadcast_fallback() {
        let t = AttributeTable::new_root();
        let cond = t.create_attribute("hit", false, false, false).unwrap();
        let label = t.create_attribute("label", String::new(), false, false).unwrap();
        let fallback = t.create_attribute("fallback", Name::none(), false, false).unwrap();
        let keys = t.add_entries(3);
        cond.set_value(keys[0], true);
        cond.set_value(keys[2], true);
        for (k, s) in keys.iter().zip(["a", "b", "c"]) {
            label.set_value(*k, s.to_owned());
        }
        let fk = t.add_entry(attrstore_types::EntryKey::INVALID);
        fallback.set_value(fk, Name::new("none"));

        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "hit", keys.clone()),
            OperationInput::entries(&t, "label", keys),
            OperationInput::entries(&t, "fallback", vec![fk]),
        ]);
        let out = run_operation(&Select, &req, &PipelineConfig::default());
        assert_eq!(out.attribute(0).unwrap().kind(), ValueKind::String);
        assert_eq!(out.values::<String>(0), vec!["a", "none", "c"]);
    }

    #[test]
    fn condition_must_be_bool() {
        let t = AttributeTable::new_root();
        t.create_attribute("n", 0_i32, true, false).unwrap();
        let k = t.add_entries(1);
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "n", k.clone()),
            OperationInput::entries(&t, "n", k.clone()),
            OperationInput::entries(&t, "n", k),
        ]);
        let out = run_operation(&Select, &req, &PipelineConfig::default());
        assert!(matches!(
            out.rejection,
            Some(AttrError::UnsupportedKind { pin: 0, ref label, .. }) if label == "Condition"
        ));
    }
}
