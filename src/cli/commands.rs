use crate::config::{parse_provider, BackendKind};
use crate::util::parse_level;
use clap::{Args, Parser, Subcommand, ValueEnum};
use genai::adapter::AdapterKind;
use std::path::PathBuf;
use tracing::Level;

/// CAD-RADS 2.0 classification of coronary CT reports with an LLM
#[derive(Parser, Debug)]
#[command(
    name = "cadrads",
    about = "CAD-RADS 2.0 classification of coronary CT reports with an LLM",
    version,
    long_about = "cadrads reads a table of free-text coronary CT reports, asks an LLM \
                  (a hosted provider or a local Llama model) for the CAD-RADS 2.0 stenosis \
                  category, plaque burden and modifiers of each report, validates the \
                  answers, and writes them back with a composite final category."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only errors and the final summary"
    )]
    pub quiet: bool,
}

impl CliArgs {
    /// Level from `--log-level`, `-v`, `-q`, then the configured level
    /// (`CADRADS_LOG_LEVEL`), in that order
    pub fn resolve_log_level(&self, configured: &str) -> Level {
        if let Some(level_str) = &self.log_level {
            return parse_level(level_str).unwrap_or_else(|| {
                eprintln!(
                    "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                    level_str
                );
                Level::INFO
            });
        }
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::ERROR
        } else {
            parse_level(configured).unwrap_or(Level::INFO)
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Classify every report in a table",
        long_about = "Classifies each row of INPUT (columns `id` and `report`) and writes the \
                      results to OUTPUT in input order. Tables are JSON arrays (.json), \
                      JSON lines (.jsonl, .ndjson) or YAML sequences (.yaml, .yml).\n\n\
                      Examples:\n  \
                      cadrads classify reports.json -o results.json\n  \
                      cadrads classify reports.jsonl -o out.jsonl --backend local\n  \
                      cadrads classify reports.yaml -o out.yaml --provider anthropic --concurrency 4"
    )]
    Classify(ClassifyArgs),

    #[command(
        about = "Print the prompt for one report",
        long_about = "Renders the instruction prompt for a report read from FILE, or from \
                      stdin when FILE is omitted, without calling any backend."
    )]
    Prompt(PromptArgs),

    #[command(
        about = "Check that the configured backend can be initialized",
        long_about = "Builds the configured backend (loading the local model if selected) \
                      and reports its name and model.\n\n\
                      Examples:\n  \
                      cadrads health\n  \
                      cadrads health --backend local"
    )]
    Health(HealthArgs),
}

/// Backend selection shared by `classify` and `health`
#[derive(Args, Debug, Clone, Default)]
pub struct BackendArgs {
    #[arg(
        short = 'b',
        long,
        value_parser = parse_backend_kind,
        help = "Backend to use: hosted or local [env: CADRADS_BACKEND]"
    )]
    pub backend: Option<BackendKind>,

    #[arg(
        short = 'p',
        long,
        value_parser = parse_adapter_kind,
        help = "Hosted provider (openai, anthropic, gemini, ollama, ...) [env: CADRADS_PROVIDER]"
    )]
    pub provider: Option<AdapterKind>,

    #[arg(
        short = 'm',
        long,
        value_name = "MODEL",
        help = "Hosted model name, or local catalogue id with --backend local"
    )]
    pub model: Option<String>,

    #[arg(long, value_name = "SECONDS", help = "Per-request timeout in seconds")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    #[arg(value_name = "INPUT", help = "Table of reports to classify")]
    pub input: PathBuf,

    #[arg(
        short = 'o',
        long,
        value_name = "OUTPUT",
        help = "Where to write the results table"
    )]
    pub output: PathBuf,

    #[command(flatten)]
    pub backend: BackendArgs,

    #[arg(long, value_name = "N", help = "Attempts per report [default: 5]")]
    pub max_attempts: Option<u32>,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Delay after a failed attempt [default: 30 hosted, 3 local]"
    )]
    pub backoff: Option<u64>,

    #[arg(long, help = "Double the delay after each failed attempt")]
    pub exponential_backoff: bool,

    #[arg(long, value_name = "N", help = "Reports classified at once [default: 1]")]
    pub concurrency: Option<usize>,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Cancel unfinished reports after this many seconds"
    )]
    pub batch_timeout: Option<u64>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Summary format"
    )]
    pub format: OutputFormatArg,

    #[arg(long, help = "Do not draw a progress bar")]
    pub no_progress: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PromptArgs {
    #[arg(value_name = "FILE", help = "Report text file (defaults to stdin)")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct HealthArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_backend_kind(s: &str) -> Result<BackendKind, String> {
    s.parse::<BackendKind>().map_err(|e| e.to_string())
}

fn parse_adapter_kind(s: &str) -> Result<AdapterKind, String> {
    parse_provider(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_classify_args() {
        let args = CliArgs::parse_from(["cadrads", "classify", "in.json", "-o", "out.json"]);
        match args.command {
            Commands::Classify(classify) => {
                assert_eq!(classify.input, PathBuf::from("in.json"));
                assert_eq!(classify.output, PathBuf::from("out.json"));
                assert_eq!(classify.format, OutputFormatArg::Human);
                assert!(classify.backend.backend.is_none());
                assert!(classify.max_attempts.is_none());
                assert!(!classify.exponential_backoff);
                assert!(!classify.no_progress);
            }
            _ => panic!("Expected Classify command"),
        }
    }

    #[test]
    fn test_classify_requires_output() {
        assert!(CliArgs::try_parse_from(["cadrads", "classify", "in.json"]).is_err());
    }

    #[test]
    fn test_classify_with_options() {
        let args = CliArgs::parse_from([
            "cadrads",
            "classify",
            "reports.jsonl",
            "--output",
            "results.jsonl",
            "--backend",
            "local",
            "--model",
            "llama-3.2-3b-q4",
            "--max-attempts",
            "3",
            "--backoff",
            "5",
            "--exponential-backoff",
            "--concurrency",
            "4",
            "--timeout",
            "60",
            "--batch-timeout",
            "3600",
            "--format",
            "json",
        ]);

        match args.command {
            Commands::Classify(classify) => {
                assert_eq!(classify.backend.backend, Some(BackendKind::Local));
                assert_eq!(classify.backend.model, Some("llama-3.2-3b-q4".to_string()));
                assert_eq!(classify.backend.timeout, Some(60));
                assert_eq!(classify.max_attempts, Some(3));
                assert_eq!(classify.backoff, Some(5));
                assert!(classify.exponential_backoff);
                assert_eq!(classify.concurrency, Some(4));
                assert_eq!(classify.batch_timeout, Some(3600));
                assert_eq!(classify.format, OutputFormatArg::Json);
            }
            _ => panic!("Expected Classify command"),
        }
    }

    #[test]
    fn test_provider_flag() {
        let args = CliArgs::parse_from([
            "cadrads", "classify", "a.json", "-o", "b.json", "--provider", "anthropic",
        ]);
        match args.command {
            Commands::Classify(classify) => {
                assert_eq!(classify.backend.provider, Some(AdapterKind::Anthropic));
            }
            _ => panic!("Expected Classify command"),
        }
        assert!(CliArgs::try_parse_from([
            "cadrads", "classify", "a.json", "-o", "b.json", "--provider", "nope",
        ])
        .is_err());
    }

    #[test]
    fn test_prompt_command() {
        let args = CliArgs::parse_from(["cadrads", "prompt"]);
        assert!(matches!(args.command, Commands::Prompt(PromptArgs { file: None })));

        let args = CliArgs::parse_from(["cadrads", "prompt", "report.txt"]);
        match args.command {
            Commands::Prompt(prompt) => assert_eq!(prompt.file, Some(PathBuf::from("report.txt"))),
            _ => panic!("Expected Prompt command"),
        }
    }

    #[test]
    fn test_health_command() {
        let args = CliArgs::parse_from(["cadrads", "health", "--backend", "hosted"]);
        match args.command {
            Commands::Health(health) => {
                assert_eq!(health.backend.backend, Some(BackendKind::Hosted));
                assert_eq!(health.format, OutputFormatArg::Human);
            }
            _ => panic!("Expected Health command"),
        }
    }

    #[test]
    fn test_invalid_backend_rejected() {
        assert!(CliArgs::try_parse_from(["cadrads", "health", "--backend", "cloud"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["cadrads", "-v", "health"]);
        assert!(args.verbose);
        assert!(!args.quiet);

        let args = CliArgs::parse_from(["cadrads", "health", "-q"]);
        assert!(args.quiet);

        let args = CliArgs::parse_from(["cadrads", "--log-level", "debug", "health"]);
        assert_eq!(args.log_level, Some("debug".to_string()));

        assert!(CliArgs::try_parse_from(["cadrads", "-v", "-q", "health"]).is_err());
    }

    #[test]
    fn test_resolve_log_level() {
        let plain = CliArgs::parse_from(["cadrads", "health"]);
        assert_eq!(plain.resolve_log_level("warn"), Level::WARN);
        assert_eq!(plain.resolve_log_level("bogus"), Level::INFO);

        let verbose = CliArgs::parse_from(["cadrads", "-v", "health"]);
        assert_eq!(verbose.resolve_log_level("warn"), Level::DEBUG);

        let quiet = CliArgs::parse_from(["cadrads", "-q", "health"]);
        assert_eq!(quiet.resolve_log_level("debug"), Level::ERROR);

        let explicit = CliArgs::parse_from(["cadrads", "--log-level", "trace", "-v", "health"]);
        assert_eq!(explicit.resolve_log_level("warn"), Level::TRACE);
    }
}
