//! Structured CAD-RADS extraction
//!
//! The pipeline for one report is prompt → backend → parse → validate, retried
//! by [`Classifier`] and folded into a composite label by [`combine`].
//! [`BatchRunner`] applies it to a whole table.

pub mod aggregate;
pub mod batch;
pub mod prompt;
pub mod response;
pub mod retry;
pub mod schema;
pub mod types;

pub use aggregate::combine;
pub use batch::{BatchReport, BatchRunner, BatchSummary};
pub use prompt::PromptBuilder;
pub use response::{parse_response, strip_fences, validate, ParseError, RawFields, ValidationError};
pub use retry::{
    AttemptOutcome, BackoffStrategy, Classification, Classifier, ExtractionStatus, RetryPolicy,
};
pub use schema::{ClassificationResult, Field};
pub use types::{output_columns, InputRecord, OutputRecord, RecordId, FINAL_CATEGORY_COLUMN};
