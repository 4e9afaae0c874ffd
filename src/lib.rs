//! cadrads - CAD-RADS 2.0 classification of coronary CT reports with an LLM
//!
//! The clinical reasoning is left to a language model. This crate builds the
//! reliable part around it: a fixed prompt per report, strict parsing and
//! validation of the model's JSON, a bounded retry loop, and a deterministic
//! composite label such as `4A/P3/HRP`.
//!
//! # Example
//!
//! ```no_run
//! use cadrads::extraction::{BatchRunner, Classifier, InputRecord, RetryPolicy};
//! use cadrads::llm::{GenAIClient, LLMClient};
//! use genai::adapter::AdapterKind;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = GenAIClient::new(AdapterKind::OpenAI, "gpt-4o".into(), Duration::from_secs(120)).await?;
//! let classifier = Classifier::new(Arc::new(client))
//!     .with_policy(RetryPolicy::new(5, Duration::from_secs(30)));
//!
//! let report = BatchRunner::new(classifier)
//!     .run(vec![InputRecord::new(1i64, "pLAD 70% stenosis, CAC 250")])
//!     .await;
//! println!("{}", report.records[0].final_category);
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`extraction`]: schema, prompt, parsing, retry loop, aggregation, batches
//! - [`llm`]: the backend trait with hosted, local and mock implementations
//! - [`table`]: input and output tables
//! - [`config`]: environment-driven configuration
//! - [`progress`]: diagnostics emitted while a batch runs

pub mod cli;
pub mod config;
pub mod extraction;
pub mod llm;
pub mod progress;
pub mod table;
pub mod util;

pub use config::{BackendKind, CadradsConfig, ConfigError};
pub use extraction::{
    combine, BatchReport, BatchRunner, Classification, ClassificationResult, Classifier,
    ExtractionStatus, Field, InputRecord, OutputRecord, PromptBuilder, RecordId, RetryPolicy,
};
pub use llm::{BackendError, LLMClient};
pub use table::TableError;
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
