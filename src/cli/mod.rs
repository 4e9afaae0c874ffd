pub mod commands;
pub mod handlers;
pub mod output;
pub mod progress;

pub use commands::{BackendArgs, ClassifyArgs, CliArgs, Commands, HealthArgs, PromptArgs};
pub use output::{HealthStatus, OutputFormat, OutputFormatter};
pub use progress::ProgressBarHandler;
