//! Hosted-model backend built on the `genai` crate
//!
//! One client covers every remote provider genai knows about (OpenAI,
//! Anthropic, Gemini, Ollama, xAI, Groq, ...). Credentials are read by genai
//! from each provider's standard environment variable.

use super::client::LLMClient;
use super::error::BackendError;
use super::types::{ChatMessage, LLMRequest, LLMResponse, MessageRole};
use async_trait::async_trait;
use genai::adapter::AdapterKind;
use genai::chat::{ChatMessage as GenAIChatMessage, ChatOptions, ChatRequest as GenAIChatRequest};
use genai::resolver::{AuthData, Endpoint, ServiceTargetResolver};
use genai::webc;
use genai::{Client, ModelIden, ServiceTarget};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, error};

/// Environment variable overriding the provider's default endpoint
pub const API_BASE_URL_ENV: &str = "CADRADS_API_BASE_URL";

/// Remote LLM client for a single provider and model
pub struct GenAIClient {
    client: Client,
    model: String,
    provider: AdapterKind,
    timeout: Duration,
}

impl GenAIClient {
    /// Creates a new hosted client
    ///
    /// # Arguments
    ///
    /// * `provider` - LLM provider to use
    /// * `model` - Model name (without provider prefix)
    /// * `timeout` - Per-request timeout
    pub async fn new(
        provider: AdapterKind,
        model: String,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let custom_endpoint = std::env::var(API_BASE_URL_ENV).ok();

        let client = if let Some(endpoint_url) = custom_endpoint {
            debug!(
                "Using custom endpoint for {}: {}",
                provider.as_str(),
                endpoint_url
            );

            let model_clone = model.clone();

            let resolver = ServiceTargetResolver::from_resolver_fn(
                move |_service_target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error>
                {
                    let endpoint = Endpoint::from_owned(endpoint_url.clone());

                    let auth = match provider.default_key_env_name() {
                        Some(api_key_var) => AuthData::from_env(api_key_var),
                        None => AuthData::from_single(""),
                    };

                    Ok(ServiceTarget {
                        endpoint,
                        auth,
                        model: ModelIden::new(provider, &model_clone),
                    })
                },
            );

            Client::builder()
                .with_service_target_resolver(resolver)
                .build()
        } else {
            Client::default()
        };

        debug!(
            "Creating GenAI client: provider={}, model={}, timeout={}s",
            provider.as_str(),
            model,
            timeout.as_secs()
        );

        Ok(Self {
            client,
            model,
            provider,
            timeout,
        })
    }

    fn convert_message(msg: &ChatMessage) -> GenAIChatMessage {
        match msg.role {
            MessageRole::System => GenAIChatMessage::system(&msg.content),
            MessageRole::User => GenAIChatMessage::user(&msg.content),
            MessageRole::Assistant => GenAIChatMessage::assistant(&msg.content),
        }
    }

    /// HTTP status of a failed provider call, when genai kept it
    fn status_code(error: &genai::Error) -> Option<u16> {
        match error {
            genai::Error::WebModelCall {
                webc_error: webc::Error::ResponseFailedStatus { status, .. },
                ..
            }
            | genai::Error::WebAdapterCall {
                webc_error: webc::Error::ResponseFailedStatus { status, .. },
                ..
            } => Some(status.as_u16()),
            _ => None,
        }
    }

    /// Maps a provider failure onto the backend taxonomy.
    ///
    /// The structured status wins. Without one, only a whole status token in
    /// the message (`status 401`, `429 Too Many Requests`) is trusted, so ids
    /// or digits inside a response body never decide the kind.
    fn map_error(provider: &str, status: Option<u16>, message: String) -> BackendError {
        let status = status.or_else(|| status_in_message(&message));

        match status {
            Some(429) => BackendError::RateLimitError { retry_after: None },
            Some(401) | Some(403) => BackendError::AuthenticationError {
                message: format!("{} rejected credentials: {}", provider, message),
            },
            Some(code) => BackendError::ApiError {
                message: format!("{} request failed: {}", provider, message),
                status_code: Some(code),
            },
            None => {
                let lower = message.to_lowercase();
                if lower.contains("error sending request")
                    || lower.contains("connection")
                    || lower.contains("dns")
                {
                    BackendError::NetworkError { message }
                } else {
                    BackendError::ApiError {
                        message: format!("{} request failed: {}", provider, message),
                        status_code: None,
                    }
                }
            }
        }
    }
}

fn status_in_message(message: &str) -> Option<u16> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bstatus(?:\s+code)?[\s:=]+(\d{3})\b|\b(\d{3})\s+(?:unauthorized|forbidden|too many requests|service unavailable|internal server error|bad gateway|gateway timeout)\b",
        )
        .expect("static regex")
    });
    let captures = re.captures(message)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

#[async_trait]
impl LLMClient for GenAIClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        let start = std::time::Instant::now();

        let messages: Vec<GenAIChatMessage> =
            request.messages.iter().map(Self::convert_message).collect();
        let genai_request = GenAIChatRequest::new(messages);

        let mut options = ChatOptions::default();
        if let Some(temp) = request.temperature {
            options = options.with_temperature(temp as f64);
        }
        if let Some(max_tokens) = request.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }

        let response = match tokio::time::timeout(
            self.timeout,
            self.client
                .exec_chat(&self.model, genai_request, Some(&options)),
        )
        .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                error!("{} API error: {}", self.provider.as_str(), e);
                return Err(Self::map_error(
                    self.provider.as_str(),
                    Self::status_code(&e),
                    e.to_string(),
                ));
            }
            Err(_) => {
                error!(
                    "{} request timed out after {}s",
                    self.provider.as_str(),
                    self.timeout.as_secs()
                );
                return Err(BackendError::TimeoutError {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let content = response.first_text().unwrap_or_default().to_string();

        Ok(LLMResponse::text(content, start.elapsed()))
    }

    fn name(&self) -> &str {
        self.provider.as_str()
    }

    fn model_info(&self) -> Option<String> {
        Some(self.model.clone())
    }
}

impl std::fmt::Debug for GenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenAIClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_genai_client_creation() {
        let client = GenAIClient::new(
            AdapterKind::Ollama,
            "llama3.1:8b".to_string(),
            Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert_eq!(client.name(), "Ollama");
        assert_eq!(client.model_info(), Some("llama3.1:8b".to_string()));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            GenAIClient::map_error("OpenAI", Some(429), "Too Many Requests".to_string()),
            BackendError::RateLimitError { .. }
        ));
        assert!(matches!(
            GenAIClient::map_error("OpenAI", Some(401), "Unauthorized".to_string()),
            BackendError::AuthenticationError { .. }
        ));
        assert!(matches!(
            GenAIClient::map_error("OpenAI", None, "error sending request for url".to_string()),
            BackendError::NetworkError { .. }
        ));
        assert!(matches!(
            GenAIClient::map_error("OpenAI", Some(500), "boom".to_string()),
            BackendError::ApiError { status_code: Some(500), .. }
        ));
    }

    #[test]
    fn test_status_tokens_in_message() {
        assert!(matches!(
            GenAIClient::map_error("OpenAI", None, "Request failed with status 401".to_string()),
            BackendError::AuthenticationError { .. }
        ));
        assert!(matches!(
            GenAIClient::map_error("OpenAI", None, "429 Too Many Requests".to_string()),
            BackendError::RateLimitError { .. }
        ));
    }

    #[test]
    fn test_digits_in_body_do_not_decide_kind() {
        let body = r#"status 503 Service Unavailable: {"request_id":"req_40117","detail":"retry 429ms"}"#;

        let from_text = GenAIClient::map_error("OpenAI", None, body.to_string());
        assert!(matches!(
            from_text,
            BackendError::ApiError { status_code: Some(503), .. }
        ));
        assert!(from_text.is_retryable());

        let from_status = GenAIClient::map_error("OpenAI", Some(503), body.to_string());
        assert!(from_status.is_retryable());

        let unlabelled = GenAIClient::map_error(
            "OpenAI",
            None,
            r#"upstream said {"request_id":"req_40117"}"#.to_string(),
        );
        assert!(matches!(unlabelled, BackendError::ApiError { status_code: None, .. }));
        assert!(unlabelled.is_retryable());
    }

    #[test]
    fn test_debug_impl() {
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_debug::<GenAIClient>();
    }
}
