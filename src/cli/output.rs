//! Summary and health output for the CLI
//!
//! Results tables are written by [`crate::table`]; this module only renders
//! what is printed to stdout after a command finishes.

use crate::extraction::BatchSummary;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// Human-readable text
    Human,
}

/// Outcome of `cadrads health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub backend: String,
    pub available: bool,
    pub name: Option<String>,
    pub model: Option<String>,
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn available(backend: String, name: String, model: Option<String>) -> Self {
        Self {
            backend,
            available: true,
            name: Some(name),
            model,
            error: None,
        }
    }

    pub fn unavailable(backend: String, error: String) -> Self {
        Self {
            backend,
            available: false,
            name: None,
            model: None,
            error: Some(error),
        }
    }
}

#[derive(Serialize)]
struct SummaryJson<'a> {
    output: String,
    backend: &'a str,
    total: usize,
    extracted: usize,
    exhausted: usize,
    cancelled: usize,
    elapsed_secs: f64,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_summary(
        &self,
        summary: &BatchSummary,
        output: &Path,
        backend: &str,
    ) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let json = SummaryJson {
                    output: output.display().to_string(),
                    backend,
                    total: summary.total,
                    extracted: summary.extracted,
                    exhausted: summary.exhausted,
                    cancelled: summary.cancelled,
                    elapsed_secs: summary.elapsed.as_secs_f64(),
                };
                serde_json::to_string_pretty(&json).context("Failed to serialize summary to JSON")
            }
            OutputFormat::Human => {
                let mut out = String::new();
                out.push_str(&format!(
                    "Classified {} report(s) with {}\n",
                    summary.total, backend
                ));
                out.push_str(&format!("  Extracted: {}\n", summary.extracted));
                if summary.exhausted > 0 {
                    out.push_str(&format!(
                        "  Failed after all attempts: {}\n",
                        summary.exhausted
                    ));
                }
                if summary.cancelled > 0 {
                    out.push_str(&format!("  Cancelled: {}\n", summary.cancelled));
                }
                out.push_str(&format!("Results saved to {}\n", output.display()));
                out.push_str(&format!("Elapsed time: {}", format_elapsed(summary.elapsed)));
                Ok(out)
            }
        }
    }

    pub fn format_health(&self, status: &HealthStatus) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(status)
                .context("Failed to serialize health status to JSON"),
            OutputFormat::Human => {
                let mut out = format!("Backend: {}\n", status.backend);
                if status.available {
                    out.push_str("Status: available\n");
                    if let Some(name) = &status.name {
                        out.push_str(&format!("Client: {}\n", name));
                    }
                    if let Some(model) = &status.model {
                        out.push_str(&format!("Model: {}\n", model));
                    }
                } else {
                    out.push_str("Status: unavailable\n");
                    if let Some(error) = &status.error {
                        out.push_str(&format!("Error: {}\n", error));
                    }
                }
                Ok(out.trim_end().to_string())
            }
        }
    }
}

/// `1 hours 2 minutes 5 seconds`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{} hours {} minutes {} seconds", hours, minutes, seconds)
}
