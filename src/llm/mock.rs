use super::client::LLMClient;
use super::error::BackendError;
use super::types::{LLMRequest, LLMResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&str) -> MockResponse + Send + Sync>;

/// Scripted backend for tests.
///
/// Queued responses are served first, in order. Once the queue is empty the
/// optional responder (keyed on the prompt text) answers; without one the
/// call fails with `BackendError::Other`.
pub struct MockLLMClient {
    responses: Mutex<VecDeque<MockResponse>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<LLMRequest>>,
    calls: AtomicUsize,
    latency: Duration,
    name: String,
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub content: String,
    pub error: Option<BackendError>,
}

impl MockResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error: None,
        }
    }

    pub fn error(error: BackendError) -> Self {
        Self {
            content: String::new(),
            error: Some(error),
        }
    }

    /// A well-formed answer with every schema field set
    pub fn classification(values: [&str; 7]) -> Self {
        let fields = crate::extraction::Field::ALL
            .iter()
            .zip(values)
            .map(|(field, value)| (field.key().to_string(), serde_json::json!(value)))
            .collect::<serde_json::Map<_, _>>();
        Self::text(serde_json::Value::Object(fields).to_string())
    }
}

impl MockLLMClient {
    pub fn new() -> Self {
        Self::with_name("MockLLM")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
            name: name.into(),
        }
    }

    /// Answers calls the queue cannot serve by inspecting the prompt
    pub fn with_responder(
        mut self,
        responder: impl Fn(&str) -> MockResponse + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Simulated inference time applied to every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn add_response(&self, response: MockResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn add_responses(&self, responses: impl IntoIterator<Item = MockResponse>) {
        let mut queue = self.responses.lock().unwrap();
        for response in responses {
            queue.push_back(response);
        }
    }

    pub fn remaining_responses(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    /// Number of `chat` invocations so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, in call order
    pub fn requests(&self) -> Vec<LLMRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Last user message of each request, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.last_user_content().unwrap_or_default().to_string())
            .collect()
    }
}

impl Default for MockLLMClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request.last_user_content().unwrap_or_default().to_string();
        self.requests.lock().unwrap().push(request);

        let queued = self.responses.lock().unwrap().pop_front();
        let response = match (queued, &self.responder) {
            (Some(response), _) => response,
            (None, Some(responder)) => responder(&prompt),
            (None, None) => {
                return Err(BackendError::Other {
                    message: "MockLLMClient: No more responses in queue".to_string(),
                })
            }
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = response.error {
            return Err(error);
        }

        Ok(LLMResponse::text(response.content, self.latency))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model_info(&self) -> Option<String> {
        Some("mock".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_queue_order() {
        let client = MockLLMClient::new();
        client.add_responses([MockResponse::text("first"), MockResponse::text("second")]);

        let first = client.chat(LLMRequest::prompt("a")).await.unwrap();
        let second = client.chat(LLMRequest::prompt("b")).await.unwrap();

        assert_eq!(first.content, "first");
        assert_eq!(second.content, "second");
        assert_eq!(client.remaining_responses(), 0);
        assert_eq!(client.call_count(), 2);
        assert_eq!(client.prompts(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_error_response() {
        let client = MockLLMClient::new();
        client.add_response(MockResponse::error(BackendError::TimeoutError { seconds: 3 }));

        let result = client.chat(LLMRequest::prompt("x")).await;
        assert_eq!(result.unwrap_err(), BackendError::TimeoutError { seconds: 3 });
    }

    #[tokio::test]
    async fn test_mock_empty_queue_errors() {
        let client = MockLLMClient::new();
        let result = client.chat(LLMRequest::prompt("x")).await;
        assert!(matches!(result, Err(BackendError::Other { .. })));
    }

    #[tokio::test]
    async fn test_mock_responder_fallback() {
        let client = MockLLMClient::new().with_responder(|prompt| {
            if prompt.contains("fail") {
                MockResponse::error(BackendError::NetworkError {
                    message: "down".to_string(),
                })
            } else {
                MockResponse::text("ok")
            }
        });

        assert_eq!(
            client.chat(LLMRequest::prompt("hello")).await.unwrap().content,
            "ok"
        );
        assert!(client.chat(LLMRequest::prompt("fail me")).await.is_err());
    }

    #[test]
    fn test_classification_response_has_all_fields() {
        let response = MockResponse::classification(["3", "P2", "No", "HRP", "No", "No", "No"]);
        let value: serde_json::Value = serde_json::from_str(&response.content).unwrap();
        assert_eq!(value["Category for stenosis severity"], "3");
        assert_eq!(value["Modifier HRP"], "HRP");
        assert_eq!(value.as_object().unwrap().len(), 7);
    }
}
