//! Diagnostic side channel for structural and validation problems.
//!
//! Store and pipeline APIs never fail loudly: they log through `tracing`,
//! emit a [`DiagnosticEvent`] to the table's [`DiagnosticObserver`], and
//! degrade to a no-op. Tests and hosts that want to inspect what happened
//! install a [`DiagnosticLog`].
//!
//! Observers MUST NOT call back into the table that emitted the event; the
//! emitting table may still hold one of its locks.

use std::sync::atomic::{AtomicU64, Ordering};

use attrstore_error::ErrorCategory;
use attrstore_types::{EntryKey, TableId, ValueKind};
use parking_lot::Mutex;
use serde::Serialize;

/// One non-fatal problem reported by a table or an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DiagnosticEvent {
    /// `create_attribute` found an attribute with that name already present.
    AttributeExists { table: TableId, name: String },

    /// A structural mutator or merge referenced an unknown attribute.
    AttributeMissing { table: TableId, name: String },

    /// Two same-named attributes disagree on kind.
    KindMismatch {
        table: TableId,
        name: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// `parent_key` was asked for a local row it does not hold.
    ParentKeyOutOfRange { table: TableId, key: EntryKey },

    /// `initialize` was called on a table that is already set up.
    AlreadyInitialized { table: TableId },

    /// An attribute copy or parent link crossed inheritance roots.
    RootMismatch { table: TableId, name: String },

    /// An erased write carried a value that does not broadcast to the
    /// attribute's kind.
    ValueRejected {
        name: String,
        from: ValueKind,
        to: ValueKind,
    },

    /// An operation aborted during validation and produced no rows.
    OperationRejected { operation: String, reason: String },
}

impl DiagnosticEvent {
    /// Taxonomy bucket of the event.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::OperationRejected { .. } => ErrorCategory::Validation,
            Self::ParentKeyOutOfRange { .. } => ErrorCategory::Invariant,
            _ => ErrorCategory::Structural,
        }
    }

    /// Attribute or operation the event is about, if it names one.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::AttributeExists { name, .. }
            | Self::AttributeMissing { name, .. }
            | Self::KindMismatch { name, .. }
            | Self::RootMismatch { name, .. }
            | Self::ValueRejected { name, .. } => Some(name),
            Self::OperationRejected { operation, .. } => Some(operation),
            Self::ParentKeyOutOfRange { .. } | Self::AlreadyInitialized { .. } => None,
        }
    }
}

/// Receiver of diagnostic events.
///
/// Called while the emitting table may be mid-mutation; implementations must
/// be cheap and must not block on the store.
pub trait DiagnosticObserver: Send + Sync {
    fn on_event(&self, event: &DiagnosticEvent);
}

/// Observer that drops every event. Default for new root tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl DiagnosticObserver for NoOpObserver {
    #[inline(always)]
    fn on_event(&self, _event: &DiagnosticEvent) {}
}

/// Per-category event counters.
#[derive(Debug, Default)]
pub struct DiagnosticCounts {
    pub structural: AtomicU64,
    pub validation: AtomicU64,
    pub invariant: AtomicU64,
    pub codec: AtomicU64,
}

/// Point-in-time copy of [`DiagnosticCounts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticCountsSnapshot {
    pub structural: u64,
    pub validation: u64,
    pub invariant: u64,
    pub codec: u64,
}

impl DiagnosticCounts {
    pub fn record(&self, category: ErrorCategory) {
        let counter = match category {
            ErrorCategory::Structural => &self.structural,
            ErrorCategory::Validation => &self.validation,
            ErrorCategory::Invariant => &self.invariant,
            ErrorCategory::Codec => &self.codec,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> DiagnosticCountsSnapshot {
        DiagnosticCountsSnapshot {
            structural: self.structural.load(Ordering::Relaxed),
            validation: self.validation.load(Ordering::Relaxed),
            invariant: self.invariant.load(Ordering::Relaxed),
            codec: self.codec.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.structural.store(0, Ordering::Relaxed);
        self.validation.store(0, Ordering::Relaxed);
        self.invariant.store(0, Ordering::Relaxed);
        self.codec.store(0, Ordering::Relaxed);
    }
}

/// Collecting observer: keeps the most recent events and per-category
/// counts.
///
/// The event buffer is bounded; once full, the oldest event is dropped.
/// Counters are never truncated.
pub struct DiagnosticLog {
    events: Mutex<Bounded>,
    counts: DiagnosticCounts,
}

struct Bounded {
    buf: std::collections::VecDeque<DiagnosticEvent>,
    capacity: usize,
}

impl DiagnosticLog {
    pub const DEFAULT_CAPACITY: usize = 1024;

    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(Bounded {
                buf: std::collections::VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
                capacity,
            }),
            counts: DiagnosticCounts::default(),
        }
    }

    /// Events in emission order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().buf.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn counts(&self) -> DiagnosticCountsSnapshot {
        self.counts.snapshot()
    }

    /// Whether any retained event satisfies `pred`.
    pub fn any(&self, pred: impl Fn(&DiagnosticEvent) -> bool) -> bool {
        self.events.lock().buf.iter().any(pred)
    }

    pub fn clear(&self) {
        self.events.lock().buf.clear();
        self.counts.reset();
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticLog")
            .field("len", &self.len())
            .field("counts", &self.counts())
            .finish()
    }
}

impl DiagnosticObserver for DiagnosticLog {
    fn on_event(&self, event: &DiagnosticEvent) {
        self.counts.record(event.category());
        let mut events = self.events.lock();
        if events.capacity == 0 {
            return;
        }
        if events.buf.len() == events.capacity {
            events.buf.pop_front();
        }
        events.buf.push_back(event.clone());
    }
}
