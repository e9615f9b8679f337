use thiserror::Error;

/// Primary error type for attrstore operations.
///
/// Store and pipeline entry points do not surface these to callers directly:
/// they log, emit a diagnostic and degrade. The variants exist so internal
/// helpers and the codec can propagate failures with `?` and so diagnostics
/// carry a structured cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttrError {
    // === Structural Errors ===
    /// No attribute with this name in the table.
    #[error("no such attribute: {name}")]
    AttributeNotFound { name: String },

    /// An attribute with this name already exists.
    #[error("attribute {name} already exists")]
    AttributeExists { name: String },

    /// Value kind mismatch between two same-named attributes, or between an
    /// attribute and a value.
    #[error("type mismatch on {name}: expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Parent relation is not usable for the requested operation.
    #[error("invalid parent: {detail}")]
    InvalidParent { detail: String },

    // === Validation Errors ===
    /// Operation received the wrong number of inputs.
    #[error("operation {operation} expects {expected} inputs, got {actual}")]
    InputCount {
        operation: String,
        expected: usize,
        actual: usize,
    },

    /// Input kind is not accepted by the operation on this pin.
    #[error("input {pin} ({label}) has unsupported kind {kind}")]
    UnsupportedKind {
        pin: usize,
        label: String,
        kind: String,
    },

    /// Two input kinds cannot be broadcast to a common kind.
    #[error("cannot broadcast {from} to {to}")]
    NotBroadcastable { from: String, to: String },

    /// Input row count is neither N, 1 nor 0.
    #[error("input {pin} has {actual} rows, expected {expected}, 1 or 0")]
    CardinalityMismatch {
        pin: usize,
        expected: usize,
        actual: usize,
    },

    /// Every output pin of the operation is disconnected.
    #[error("no output pin connected for operation {operation}")]
    NoOutputConnected { operation: String },

    // === Codec Errors ===
    /// Stored type tag names no known value kind.
    #[error("unknown type tag: {tag}")]
    UnknownTypeTag { tag: u16 },

    /// Serialized table is truncated or malformed.
    #[error("corrupt table image: {detail}")]
    Corrupt { detail: String },

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error taxonomy buckets.
///
/// Structural errors degrade a single attribute, validation errors abort one
/// operation invocation, invariant violations are silent no-ops and codec
/// errors fail a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Structural,
    Validation,
    Invariant,
    Codec,
}

impl AttrError {
    /// Map this error to its taxonomy bucket.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AttributeNotFound { .. }
            | Self::AttributeExists { .. }
            | Self::TypeMismatch { .. }
            | Self::InvalidParent { .. } => ErrorCategory::Structural,
            Self::InputCount { .. }
            | Self::UnsupportedKind { .. }
            | Self::NotBroadcastable { .. }
            | Self::CardinalityMismatch { .. }
            | Self::NoOutputConnected { .. } => ErrorCategory::Validation,
            Self::UnknownTypeTag { .. } | Self::Corrupt { .. } => ErrorCategory::Codec,
            Self::Internal(_) => ErrorCategory::Invariant,
        }
    }

    /// Whether the failure only aborts a single operation invocation.
    pub const fn aborts_operation(&self) -> bool {
        matches!(self.category(), ErrorCategory::Validation)
    }

    /// Create a not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::AttributeNotFound { name: name.into() }
    }

    /// Create a type-mismatch error.
    pub fn type_mismatch(
        name: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a corrupt-image error.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `AttrError`.
pub type Result<T> = std::result::Result<T, AttrError>;
