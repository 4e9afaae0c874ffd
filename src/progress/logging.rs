//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::BatchStarted { total, concurrency } => {
                info!(records = total, concurrency, "Starting batch");
            }
            ProgressEvent::AttemptFailed {
                record_id,
                attempt,
                max_attempts,
                kind,
                detail,
                retry_in,
            } => match retry_in {
                Some(delay) => warn!(
                    record_id = %record_id,
                    attempt,
                    max_attempts,
                    kind = %kind,
                    detail = %detail,
                    retry_in_ms = delay.as_millis() as u64,
                    "Attempt {} failed for report {}. Retrying...",
                    attempt,
                    record_id
                ),
                None => warn!(
                    record_id = %record_id,
                    attempt,
                    max_attempts,
                    kind = %kind,
                    detail = %detail,
                    "Attempt {} failed for report {}",
                    attempt,
                    record_id
                ),
            },
            ProgressEvent::RecordExtracted {
                record_id,
                attempts,
                final_category,
            } => {
                debug!(
                    record_id = %record_id,
                    attempts,
                    final_category = %final_category,
                    "Report classified"
                );
            }
            ProgressEvent::RecordExhausted {
                record_id,
                attempts,
            } => {
                warn!(
                    record_id = %record_id,
                    attempts,
                    "Failed to obtain valid CAD-RADS results for report {} after {} attempts",
                    record_id,
                    attempts
                );
            }
            ProgressEvent::RecordCancelled {
                record_id,
                attempts,
            } => {
                info!(record_id = %record_id, attempts, "Report cancelled");
            }
            ProgressEvent::BatchCompleted {
                total,
                extracted,
                exhausted,
                cancelled,
                elapsed,
            } => {
                info!(
                    records = total,
                    extracted,
                    exhausted,
                    cancelled,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Batch complete"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::FailureKind;
    use std::time::Duration;

    #[test]
    fn test_logging_all_events() {
        let handler = LoggingHandler;

        let events = vec![
            ProgressEvent::BatchStarted {
                total: 3,
                concurrency: 2,
            },
            ProgressEvent::AttemptFailed {
                record_id: "1".to_string(),
                attempt: 1,
                max_attempts: 5,
                kind: FailureKind::Parse,
                detail: "Invalid JSON".to_string(),
                retry_in: Some(Duration::from_secs(30)),
            },
            ProgressEvent::AttemptFailed {
                record_id: "1".to_string(),
                attempt: 5,
                max_attempts: 5,
                kind: FailureKind::Backend,
                detail: "timeout".to_string(),
                retry_in: None,
            },
            ProgressEvent::RecordExtracted {
                record_id: "2".to_string(),
                attempts: 1,
                final_category: "3/P2/HRP".to_string(),
            },
            ProgressEvent::RecordExhausted {
                record_id: "1".to_string(),
                attempts: 5,
            },
            ProgressEvent::RecordCancelled {
                record_id: "3".to_string(),
                attempts: 0,
            },
            ProgressEvent::BatchCompleted {
                total: 3,
                extracted: 1,
                exhausted: 1,
                cancelled: 1,
                elapsed: Duration::from_secs(65),
            },
        ];

        for event in &events {
            handler.on_progress(event);
        }
    }
}
