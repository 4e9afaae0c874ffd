//! Terminal progress bar for `cadrads classify`

use crate::progress::{LoggingHandler, ProgressEvent, ProgressHandler};
use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} reports {msg}";

/// Draws a bar on stderr and forwards every event to [`LoggingHandler`]
pub struct ProgressBarHandler {
    bar: ProgressBar,
    logger: LoggingHandler,
}

impl ProgressBarHandler {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
            bar.set_style(style);
        }
        Self {
            bar,
            logger: LoggingHandler,
        }
    }
}

impl ProgressHandler for ProgressBarHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        self.bar.suspend(|| self.logger.on_progress(event));

        match event {
            ProgressEvent::AttemptFailed {
                record_id, attempt, ..
            } => {
                self.bar
                    .set_message(format!("(report {} attempt {} failed)", record_id, attempt));
            }
            ProgressEvent::RecordExtracted { .. }
            | ProgressEvent::RecordExhausted { .. }
            | ProgressEvent::RecordCancelled { .. } => {
                self.bar.set_message("");
                self.bar.inc(1);
            }
            ProgressEvent::BatchCompleted { .. } => self.bar.finish_and_clear(),
            ProgressEvent::BatchStarted { .. } => {}
        }
    }
}
