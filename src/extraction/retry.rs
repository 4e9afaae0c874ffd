//! Per-record retry loop
//!
//! Each attempt sends the same prompt, then parses and validates the answer.
//! The first accepted answer ends the loop; after `max_attempts` failures the
//! record gets [`ClassificationResult::empty`]. The loop never returns an error.

use super::aggregate::combine;
use super::prompt::PromptBuilder;
use super::response::{parse_response, validate, ParseError, ValidationError};
use super::schema::ClassificationResult;
use crate::llm::{BackendError, LLMClient, LLMRequest};
use crate::progress::{FailureKind, NoOpHandler, ProgressEvent, ProgressHandler};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;

/// How the delay grows between failed attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Same delay after every failure
    #[default]
    Fixed,
    /// `backoff * 2^(n-1)` after the n-th failure, capped at `max_delay`
    Exponential { max_delay: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Delay after the `attempt`-th failure (1-based).
    ///
    /// A server-provided `retry_after` (seconds) lengthens the delay but never
    /// shortens it.
    pub fn delay_after(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.backoff,
            BackoffStrategy::Exponential { max_delay } => {
                let base_ms = self.backoff.as_millis();
                if base_ms == 0 {
                    Duration::ZERO
                } else {
                    let max_ms = max_delay.as_millis().max(base_ms);
                    let shift = attempt.saturating_sub(1).min(20);
                    let backoff_ms = base_ms.saturating_mul(1u128 << shift).min(max_ms);
                    Duration::from_millis(u64::try_from(backoff_ms).unwrap_or(u64::MAX))
                }
            }
        };

        match retry_after {
            Some(secs) => delay.max(Duration::from_secs(secs)),
            None => delay,
        }
    }
}

/// Result of a single attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(ClassificationResult),
    ParseFailure(ParseError),
    ValidationFailure(ValidationError),
    BackendFailure(BackendError),
}

impl AttemptOutcome {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::ParseFailure(_) => Some(FailureKind::Parse),
            AttemptOutcome::ValidationFailure(_) => Some(FailureKind::Validation),
            AttemptOutcome::BackendFailure(_) => Some(FailureKind::Backend),
        }
    }

    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptOutcome::BackendFailure(e) => e.is_retryable(),
            _ => true,
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            AttemptOutcome::BackendFailure(e) => e.retry_after(),
            _ => None,
        }
    }

    fn detail(&self) -> String {
        match self {
            AttemptOutcome::Success(_) => String::new(),
            AttemptOutcome::ParseFailure(e) => e.to_string(),
            AttemptOutcome::ValidationFailure(e) => e.to_string(),
            AttemptOutcome::BackendFailure(e) => e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    /// An answer passed validation
    Extracted,
    /// Every attempt failed
    Exhausted,
    /// Stopped by shutdown or the batch deadline
    Cancelled,
}

impl std::fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionStatus::Extracted => write!(f, "extracted"),
            ExtractionStatus::Exhausted => write!(f, "exhausted"),
            ExtractionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one record's retry loop
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub result: ClassificationResult,
    /// Backend invocations made
    pub attempts: u32,
    pub status: ExtractionStatus,
}

impl Classification {
    pub fn cancelled(attempts: u32) -> Self {
        Self {
            result: ClassificationResult::empty(),
            attempts,
            status: ExtractionStatus::Cancelled,
        }
    }

    pub fn final_category(&self) -> String {
        combine(&self.result)
    }
}

/// Classifies single reports against one backend
pub struct Classifier {
    client: Arc<dyn LLMClient>,
    prompt: PromptBuilder,
    policy: RetryPolicy,
    max_output_tokens: u32,
    progress: Arc<dyn ProgressHandler>,
}

impl Classifier {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            client,
            prompt: PromptBuilder::new(),
            policy: RetryPolicy::default(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_prompt(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) fn progress(&self) -> &Arc<dyn ProgressHandler> {
        &self.progress
    }

    /// One backend call followed by parsing and validation
    pub async fn attempt(&self, prompt: &str) -> AttemptOutcome {
        let request = LLMRequest::prompt(prompt)
            .with_temperature(0.0)
            .with_max_tokens(self.max_output_tokens);

        let response = match self.client.chat(request).await {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::BackendFailure(e),
        };

        debug!(
            chars = response.content.len(),
            response_time_ms = response.response_time.as_millis() as u64,
            "Backend answered"
        );

        match parse_response(&response.content) {
            Err(e) => AttemptOutcome::ParseFailure(e),
            Ok(fields) => match validate(&fields) {
                Ok(result) => AttemptOutcome::Success(result),
                Err(e) => AttemptOutcome::ValidationFailure(e),
            },
        }
    }

    /// Run the retry loop for one report
    pub async fn classify(&self, record_id: &str, report_text: &str) -> Classification {
        let attempts = AtomicU32::new(0);
        self.classify_tracked(record_id, report_text, &attempts).await
    }

    /// Same as [`Classifier::classify`], publishing the attempt count to
    /// `attempts` so a caller that drops this future still knows it
    pub(crate) async fn classify_tracked(
        &self,
        record_id: &str,
        report_text: &str,
        attempts: &AtomicU32,
    ) -> Classification {
        let prompt = self.prompt.build(report_text);
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            attempts.store(attempt, Ordering::SeqCst);

            let failure = match self.attempt(&prompt).await {
                AttemptOutcome::Success(result) => {
                    let classification = Classification {
                        result,
                        attempts: attempt,
                        status: ExtractionStatus::Extracted,
                    };
                    self.progress.on_progress(&ProgressEvent::RecordExtracted {
                        record_id: record_id.to_string(),
                        attempts: attempt,
                        final_category: classification.final_category(),
                    });
                    return classification;
                }
                failure => failure,
            };

            let retryable = failure.is_retryable();
            let retry_in = (retryable && attempt < max_attempts)
                .then(|| self.policy.delay_after(attempt, failure.retry_after()));

            self.progress.on_progress(&ProgressEvent::AttemptFailed {
                record_id: record_id.to_string(),
                attempt,
                max_attempts,
                kind: failure.failure_kind().unwrap_or(FailureKind::Backend),
                detail: failure.detail(),
                retry_in,
            });

            match retry_in {
                Some(delay) if !delay.is_zero() => tokio::time::sleep(delay).await,
                Some(_) => {}
                None => {
                    if !retryable {
                        debug!(record_id, "Backend error is permanent, not retrying");
                    }
                    break;
                }
            }
        }

        let attempts = attempts.load(Ordering::SeqCst);
        self.progress.on_progress(&ProgressEvent::RecordExhausted {
            record_id: record_id.to_string(),
            attempts,
        });

        Classification {
            result: ClassificationResult::empty(),
            attempts,
            status: ExtractionStatus::Exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::schema::Field;
    use crate::llm::{MockLLMClient, MockResponse};
    use std::sync::Mutex;

    const VALID: [&str; 7] = ["3", "P2", "No", "HRP", "No", "No", "No"];

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressHandler for RecordingHandler {
        fn on_progress(&self, event: &ProgressEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn classifier(mock: Arc<MockLLMClient>, max_attempts: u32) -> Classifier {
        Classifier::new(mock).with_policy(RetryPolicy::new(max_attempts, Duration::ZERO))
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::new(5, Duration::from_secs(30));
        assert_eq!(policy.delay_after(1, None), Duration::from_secs(30));
        assert_eq!(policy.delay_after(4, None), Duration::from_secs(30));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(2)).with_strategy(
            BackoffStrategy::Exponential {
                max_delay: Duration::from_secs(10),
            },
        );
        assert_eq!(policy.delay_after(1, None), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2, None), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3, None), Duration::from_secs(8));
        assert_eq!(policy.delay_after(4, None), Duration::from_secs(10));
        assert_eq!(policy.delay_after(60, None), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_after_extends_delay() {
        let policy = RetryPolicy::new(5, Duration::from_secs(3));
        assert_eq!(policy.delay_after(1, Some(20)), Duration::from_secs(20));
        assert_eq!(policy.delay_after(1, Some(1)), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::classification(VALID));

        let classification = classifier(mock.clone(), 5).classify("1", "report").await;

        assert_eq!(classification.status, ExtractionStatus::Extracted);
        assert_eq!(classification.attempts, 1);
        assert_eq!(classification.result.get(Field::Stenosis), "3");
        assert_eq!(classification.final_category(), "3/P2/HRP");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_failures() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_responses([
            MockResponse::text("Sure, here is the answer: 4A"),
            MockResponse::text(r#"{"Category for stenosis severity": "4A"}"#),
            MockResponse::error(BackendError::TimeoutError { seconds: 120 }),
            MockResponse::text(format!(
                "```json\n{}\n```",
                MockResponse::classification(VALID).content
            )),
        ]);
        let handler = Arc::new(RecordingHandler::default());

        let classification = classifier(mock.clone(), 5)
            .with_progress(handler.clone())
            .classify("42", "report")
            .await;

        assert_eq!(classification.status, ExtractionStatus::Extracted);
        assert_eq!(classification.attempts, 4);

        let events = handler.events.lock().unwrap();
        let kinds: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::AttemptFailed { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                FailureKind::Parse,
                FailureKind::Validation,
                FailureKind::Backend
            ]
        );
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::RecordExtracted { attempts: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_exhaustion_returns_empty_result() {
        let mock = Arc::new(
            MockLLMClient::new().with_responder(|_| MockResponse::text("not json")),
        );
        let handler = Arc::new(RecordingHandler::default());

        let classification = classifier(mock.clone(), 3)
            .with_progress(handler.clone())
            .classify("9", "report")
            .await;

        assert_eq!(classification.status, ExtractionStatus::Exhausted);
        assert_eq!(classification.attempts, 3);
        assert!(classification.result.is_empty());
        assert_eq!(classification.final_category(), "");
        assert_eq!(mock.call_count(), 3);

        let events = handler.events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::RecordExhausted { attempts: 3, .. })
        ));
        assert!(matches!(
            events[2],
            ProgressEvent::AttemptFailed { retry_in: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_authentication_error_stops_early() {
        let mock = Arc::new(MockLLMClient::new().with_responder(|_| {
            MockResponse::error(BackendError::AuthenticationError {
                message: "bad key".to_string(),
            })
        }));

        let classification = classifier(mock.clone(), 5).classify("1", "report").await;

        assert_eq!(classification.status, ExtractionStatus::Exhausted);
        assert_eq!(classification.attempts, 1);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_never_calls_backend() {
        let mock = Arc::new(MockLLMClient::new());
        let classification = classifier(mock.clone(), 0).classify("1", "report").await;

        assert_eq!(classification.status, ExtractionStatus::Exhausted);
        assert_eq!(classification.attempts, 0);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_request_uses_zero_temperature_and_prompt() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::classification(VALID));

        classifier(mock.clone(), 1)
            .classify("1", "LAD 70% stenosis")
            .await;

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(0.0));
        assert_eq!(requests[0].max_tokens, Some(DEFAULT_MAX_OUTPUT_TOKENS));
        assert_eq!(requests[0].messages.len(), 1);

        let prompt = requests[0].last_user_content().unwrap();
        assert!(prompt.contains("LAD 70% stenosis"));
        assert!(prompt.contains("<Output format>"));
    }

    #[tokio::test]
    async fn test_configured_output_tokens_reach_every_attempt() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_responses([
            MockResponse::text("not json"),
            MockResponse::classification(VALID),
        ]);

        Classifier::new(mock.clone())
            .with_policy(RetryPolicy::new(3, Duration::ZERO))
            .with_max_output_tokens(128)
            .classify("1", "report")
            .await;

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert_eq!(request.temperature, Some(0.0));
            assert_eq!(request.max_tokens, Some(128));
        }
        assert_eq!(requests[0].messages[0].content, requests[1].messages[0].content);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_responses([
            MockResponse::text("garbage"),
            MockResponse::text("garbage"),
            MockResponse::classification(VALID),
        ]);
        let classifier =
            Classifier::new(mock.clone()).with_policy(RetryPolicy::new(5, Duration::from_secs(30)));

        let start = tokio::time::Instant::now();
        let classification = classifier.classify("1", "report").await;

        assert_eq!(classification.attempts, 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_after_last_attempt() {
        let mock = Arc::new(MockLLMClient::new().with_responder(|_| MockResponse::text("x")));
        let classifier =
            Classifier::new(mock.clone()).with_policy(RetryPolicy::new(2, Duration::from_secs(30)));

        let start = tokio::time::Instant::now();
        classifier.classify("1", "report").await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));
    }
}
