//! Progress handler trait and events

use std::fmt;
use std::time::Duration;

/// Why a single attempt did not produce an accepted result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Output could not be decoded
    Parse,
    /// Output decoded but a field was missing or empty
    Validation,
    /// The backend call itself failed
    Backend,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Parse => write!(f, "parse"),
            FailureKind::Validation => write!(f, "validation"),
            FailureKind::Backend => write!(f, "backend"),
        }
    }
}

/// Events emitted while a batch is classified
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Batch started
    BatchStarted { total: usize, concurrency: usize },

    /// One attempt for a record failed
    AttemptFailed {
        record_id: String,
        attempt: u32,
        max_attempts: u32,
        kind: FailureKind,
        detail: String,
        /// Delay before the next attempt, `None` after the last one
        retry_in: Option<Duration>,
    },

    /// Record classified
    RecordExtracted {
        record_id: String,
        attempts: u32,
        final_category: String,
    },

    /// Every attempt for a record failed; it gets the empty result
    RecordExhausted { record_id: String, attempts: u32 },

    /// Record was stopped by shutdown or the batch deadline
    RecordCancelled { record_id: String, attempts: u32 },

    /// Batch finished
    BatchCompleted {
        total: usize,
        extracted: usize,
        exhausted: usize,
        cancelled: usize,
        elapsed: Duration,
    },
}

/// Trait for handling progress events during a batch
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
