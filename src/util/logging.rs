//! Structured logging setup for cadrads
//!
//! Logs go to stderr so that stdout stays free for command output (the
//! rendered prompt, JSON summaries). `RUST_LOG` directives are honoured on top
//! of the configured level.
//!
//! ```no_run
//! use cadrads::util::{init_logging, LoggingConfig};
//! use tracing::Level;
//!
//! init_logging(LoggingConfig::with_level(Level::DEBUG));
//! tracing::info!(record_id = "17", "Classifying report");
//! ```

use crate::config::CadradsConfig;
use std::env;
use std::io;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Crates whose INFO/DEBUG output drowns out ours unless `RUST_LOG` asks for it
const NOISY_DEPENDENCIES: [&str; 5] = ["h2", "hyper", "reqwest", "hf_hub", "tokenizers"];

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for cadrads' own events
    pub level: Level,

    /// Emit one JSON object per event
    pub use_json: bool,

    /// Include the module target (e.g. `cadrads::extraction::retry`)
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: false,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Machine-readable output for batch runs collected by a log pipeline
    pub fn json(level: Level) -> Self {
        Self {
            level,
            use_json: true,
            include_target: true,
            include_location: true,
        }
    }
}

/// Parses a log level (case-insensitive)
///
/// ```
/// use cadrads::util::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("Debug"), Some(Level::DEBUG));
/// assert_eq!(parse_level("loud"), None);
/// ```
pub fn parse_level(level_str: &str) -> Option<Level> {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn build_filter(level: Level, rust_log_set: bool) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("cadrads={}", level.as_str().to_lowercase()).parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    if !rust_log_set {
        for krate in NOISY_DEPENDENCIES {
            if let Ok(directive) = format!("{}=warn", krate).parse::<Directive>() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

/// Installs the global subscriber; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level, env::var("RUST_LOG").is_ok());

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .init();
        }
    });
}

/// Initializes logging from the configured level (`CADRADS_LOG_LEVEL`) and
/// `CADRADS_LOG_JSON`
pub fn init_from_env() {
    let level = parse_level(&CadradsConfig::default().log_level).unwrap_or(Level::INFO);

    let use_json = env::var("CADRADS_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    let config = if use_json {
        LoggingConfig::json(level)
    } else {
        LoggingConfig::with_level(level)
    };
    init_logging(config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("info"), Some(Level::INFO));
        assert_eq!(parse_level("warn"), Some(Level::WARN));
        assert_eq!(parse_level("error"), Some(Level::ERROR));
    }

    #[test]
    fn test_parse_level_case_and_whitespace() {
        assert_eq!(parse_level(" TRACE "), Some(Level::TRACE));
        assert_eq!(parse_level("Warning"), Some(Level::WARN));
    }

    #[test]
    fn test_parse_level_invalid() {
        assert_eq!(parse_level("invalid"), None);
        assert_eq!(parse_level(""), None);
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
        assert!(!config.include_location);
    }

    #[test]
    fn test_json_config() {
        let config = LoggingConfig::json(Level::WARN);
        assert_eq!(config.level, Level::WARN);
        assert!(config.use_json);
        assert!(config.include_target);
    }

    #[test]
    fn test_filter_builds_with_dependency_directives() {
        let filter = build_filter(Level::DEBUG, false);
        let rendered = filter.to_string().to_lowercase();
        assert!(rendered.contains("cadrads=debug"));
        assert!(rendered.contains("reqwest=warn"));
    }
}
