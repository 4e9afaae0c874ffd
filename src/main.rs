use cadrads::cli::commands::{CliArgs, Commands};
use cadrads::cli::handlers::{handle_classify, handle_health, handle_prompt};
use cadrads::util::{init_logging, LoggingConfig};
use cadrads::{CadradsConfig, VERSION};

use clap::Parser;
use std::env;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("cadrads v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Classify(classify_args) => handle_classify(classify_args, args.quiet).await,
        Commands::Prompt(prompt_args) => handle_prompt(prompt_args).await,
        Commands::Health(health_args) => handle_health(health_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = args.resolve_log_level(&CadradsConfig::default().log_level);

    let use_json = env::var("CADRADS_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(if use_json {
        LoggingConfig::json(level)
    } else {
        LoggingConfig::with_level(level)
    });
}
