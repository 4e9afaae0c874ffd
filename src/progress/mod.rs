//! Progress reporting for batch classification

mod handler;
mod logging;

pub use handler::{FailureKind, NoOpHandler, ProgressEvent, ProgressHandler};
pub use logging::LoggingHandler;
