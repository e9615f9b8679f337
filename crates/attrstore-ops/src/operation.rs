//! Element-wise operation trait.
//!
//! Operations are open (user-implementable). An operation declares its pins
//! and which value kinds each pin accepts; the
//! [pipeline](crate::pipeline::run_operation) validates inputs against that
//! declaration, resolves the working kind, and hands the operation an
//! [`OperationContext`] whose `apply_*` helpers drive the rows.
//!
//! # Send + Sync
//!
//! Operations are stored in the [`OperationRegistry`](crate::OperationRegistry)
//! as `Arc<dyn AttributeOperation>` and may be run from several threads.

use attrstore_error::Result;
use attrstore_types::ValueKind;

use crate::pipeline::OperationContext;

/// Answer of [`AttributeOperation::is_supported_kind`] for one pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KindSupport {
    pub supported: bool,
    /// The pin is read at a fixed kind of its own (a condition, a ratio)
    /// and does not take part in working-kind resolution.
    pub has_special_requirement: bool,
}

impl KindSupport {
    pub const UNSUPPORTED: Self = Self {
        supported: false,
        has_special_requirement: false,
    };

    pub const SUPPORTED: Self = Self {
        supported: true,
        has_special_requirement: false,
    };

    pub const SPECIAL: Self = Self {
        supported: true,
        has_special_requirement: true,
    };

    #[must_use]
    pub const fn when(supported: bool) -> Self {
        if supported {
            Self::SUPPORTED
        } else {
            Self::UNSUPPORTED
        }
    }

    #[must_use]
    pub const fn special_when(supported: bool) -> Self {
        if supported {
            Self::SPECIAL
        } else {
            Self::UNSUPPORTED
        }
    }
}

const INPUT_LABELS: [&str; 3] = ["InputA", "InputB", "InputC"];

/// An element-wise operation over attribute inputs.
pub trait AttributeOperation: Send + Sync {
    /// Registry name, matched case-insensitively.
    fn name(&self) -> &str;

    fn num_inputs(&self) -> usize;

    fn input_label(&self, pin: usize) -> &str {
        INPUT_LABELS.get(pin).copied().unwrap_or("Input")
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn output_label(&self, _pin: usize) -> &str {
        "Out"
    }

    /// Whether `kind` is accepted on input `pin`.
    fn is_supported_kind(&self, kind: ValueKind, pin: usize) -> KindSupport;

    /// Kind of output `pin` given the resolved working kind. Defaults to the
    /// working kind.
    fn output_kind(&self, _pin: usize, most_complex: ValueKind) -> ValueKind {
        most_complex
    }

    /// Whether the operation collapses all rows into a single output row.
    fn reduces(&self) -> bool {
        false
    }

    /// Compute the output rows.
    ///
    /// Only called after validation succeeded. Errors are logged by the
    /// pipeline and leave the output with whatever was written so far.
    fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough;

    impl AttributeOperation for Passthrough {
        fn name(&self) -> &str {
            "passthrough"
        }

        fn num_inputs(&self) -> usize {
            4
        }

        fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
            KindSupport::when(kind.is_numeric())
        }

        fn execute(&self, _cx: &mut OperationContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn default_labels() {
        assert_eq!(Passthrough.input_label(0), "InputA");
        assert_eq!(Passthrough.input_label(2), "InputC");
        assert_eq!(Passthrough.input_label(3), "Input");
        assert_eq!(Passthrough.output_label(0), "Out");
        assert_eq!(Passthrough.num_outputs(), 1);
        assert!(!Passthrough.reduces());
    }

    #[test]
    fn output_kind_defaults_to_working_kind() {
        assert_eq!(Passthrough.output_kind(0, ValueKind::Vector3), ValueKind::Vector3);
    }

    #[test]
    fn support_constructors() {
        assert_eq!(KindSupport::when(false), KindSupport::UNSUPPORTED);
        assert_eq!(KindSupport::special_when(true), KindSupport::SPECIAL);
        assert!(!Passthrough.is_supported_kind(ValueKind::String, 0).supported);
        assert!(Passthrough.is_supported_kind(ValueKind::Int32, 1).supported);
    }
}
