//! Batch classification
//!
//! Records are classified independently, up to `concurrency` at a time, and
//! returned in input order. A shutdown signal or the batch deadline cancels
//! whatever has not finished; those rows get the empty result.

use super::retry::{Classification, Classifier, ExtractionStatus};
use super::types::{InputRecord, OutputRecord};
use crate::progress::ProgressEvent;
use futures_util::stream::{self, StreamExt};
use std::future::pending;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

/// Row counts and wall time for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub extracted: usize,
    pub exhausted: usize,
    pub cancelled: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    fn from_records(records: &[OutputRecord], elapsed: Duration) -> Self {
        let count = |status| records.iter().filter(|r| r.status == status).count();
        Self {
            total: records.len(),
            extracted: count(ExtractionStatus::Extracted),
            exhausted: count(ExtractionStatus::Exhausted),
            cancelled: count(ExtractionStatus::Cancelled),
            elapsed,
        }
    }

    /// Rows left with the empty result
    pub fn failed(&self) -> usize {
        self.exhausted + self.cancelled
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One row per input record, in input order
    pub records: Vec<OutputRecord>,
    pub summary: BatchSummary,
}

pub struct BatchRunner {
    classifier: Classifier,
    concurrency: usize,
    batch_timeout: Option<Duration>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl BatchRunner {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier,
            concurrency: 1,
            batch_timeout: None,
            shutdown: None,
        }
    }

    /// Records classified at once (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.batch_timeout = timeout;
        self
    }

    /// Stop the batch once the channel holds `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub async fn run(&self, records: Vec<InputRecord>) -> BatchReport {
        let start = Instant::now();
        let progress = self.classifier.progress();

        progress.on_progress(&ProgressEvent::BatchStarted {
            total: records.len(),
            concurrency: self.concurrency,
        });

        let deadline = self
            .batch_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);

        let rows: Vec<OutputRecord> = stream::iter(records)
            .map(|record| self.process(record, deadline))
            .buffered(self.concurrency)
            .collect()
            .await;

        let summary = BatchSummary::from_records(&rows, start.elapsed());

        progress.on_progress(&ProgressEvent::BatchCompleted {
            total: summary.total,
            extracted: summary.extracted,
            exhausted: summary.exhausted,
            cancelled: summary.cancelled,
            elapsed: summary.elapsed,
        });

        BatchReport {
            records: rows,
            summary,
        }
    }

    async fn process(
        &self,
        record: InputRecord,
        deadline: Option<tokio::time::Instant>,
    ) -> OutputRecord {
        let record_id = record.id.to_string();
        let attempts = AtomicU32::new(0);

        let classification = tokio::select! {
            biased;
            _ = stop_requested(self.shutdown.clone(), deadline) => {
                let attempts = attempts.load(Ordering::SeqCst);
                debug!(record_id = %record_id, attempts, "Stopping record");
                self.classifier.progress().on_progress(&ProgressEvent::RecordCancelled {
                    record_id: record_id.clone(),
                    attempts,
                });
                Classification::cancelled(attempts)
            }
            classification = self.classifier.classify_tracked(&record_id, &record.text, &attempts) => {
                classification
            }
        };

        OutputRecord::new(record, classification)
    }
}

/// Resolves once shutdown is signalled or the deadline passes; never otherwise
async fn stop_requested(
    shutdown: Option<watch::Receiver<bool>>,
    deadline: Option<tokio::time::Instant>,
) {
    let signalled = async {
        let Some(mut rx) = shutdown else {
            return pending::<()>().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without signalling.
                return pending::<()>().await;
            }
        }
    };

    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => pending::<()>().await,
        }
    };

    tokio::select! {
        _ = signalled => {}
        _ = expired => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::retry::RetryPolicy;
    use crate::llm::{MockLLMClient, MockResponse};
    use std::sync::Arc;

    const VALID: [&str; 7] = ["2", "P1", "No", "No", "No", "No", "No"];

    fn runner(mock: Arc<MockLLMClient>) -> BatchRunner {
        BatchRunner::new(
            Classifier::new(mock).with_policy(RetryPolicy::new(2, Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = runner(Arc::new(MockLLMClient::new())).run(Vec::new()).await;
        assert!(report.records.is_empty());
        assert_eq!(report.summary.total, 0);
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let mock = Arc::new(MockLLMClient::new().with_responder(|prompt| {
            if prompt.contains("unreadable") {
                MockResponse::text("no idea")
            } else {
                MockResponse::classification(VALID)
            }
        }));

        let report = runner(mock)
            .run(vec![
                InputRecord::new(1i64, "mild plaque"),
                InputRecord::new(2i64, "unreadable"),
                InputRecord::new(3i64, "mild plaque"),
            ])
            .await;

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.extracted, 2);
        assert_eq!(report.summary.exhausted, 1);
        assert_eq!(report.summary.cancelled, 0);
        assert_eq!(report.summary.failed(), 1);
        assert_eq!(report.records[0].final_category, "2/P1");
        assert_eq!(report.records[1].final_category, "");
    }

    #[tokio::test]
    async fn test_pre_signalled_shutdown_cancels_everything() {
        let mock = Arc::new(MockLLMClient::new().with_responder(|_| MockResponse::classification(VALID)));
        let (tx, rx) = watch::channel(true);

        let report = runner(mock.clone())
            .with_shutdown(rx)
            .run(vec![InputRecord::new(1i64, "a"), InputRecord::new(2i64, "b")])
            .await;

        assert_eq!(report.summary.cancelled, 2);
        assert_eq!(mock.call_count(), 0);
        assert!(report.records.iter().all(|r| r.result.is_empty()));
        drop(tx);
    }

    #[tokio::test]
    async fn test_dropped_sender_does_not_cancel() {
        let mock = Arc::new(MockLLMClient::new().with_responder(|_| MockResponse::classification(VALID)));
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let report = runner(mock)
            .with_shutdown(rx)
            .run(vec![InputRecord::new(1i64, "a")])
            .await;

        assert_eq!(report.summary.extracted, 1);
    }
}
