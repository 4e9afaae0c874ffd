//! LLM client abstraction layer
//!
//! This module provides a trait-based abstraction over the oracle that reads
//! radiology reports, allowing the hosted (genai), embedded (Candle) and mock
//! backends to be used interchangeably by the extraction pipeline.

mod client;
pub mod embedded;
mod error;
mod genai;
mod mock;
mod selector;
mod types;

pub use client::LLMClient;
pub use embedded::{EmbeddedClient, EmbeddedOptions};
pub use error::BackendError;
pub use genai::{GenAIClient, API_BASE_URL_ENV};
pub use mock::{MockLLMClient, MockResponse};
pub use selector::{provider_has_credentials, select_llm_client, SelectedClient};
pub use types::{ChatMessage, LLMRequest, LLMResponse, MessageRole};
