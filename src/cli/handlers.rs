//! Command handlers
//!
//! Each handler returns the process exit code. Failures that stop a command
//! (bad configuration, unreadable input, unwritable output, backend that
//! cannot be built) are printed to stderr and yield 1. Reports that could not
//! be classified do not.

use crate::cli::commands::{BackendArgs, ClassifyArgs, HealthArgs, OutputFormatArg, PromptArgs};
use crate::cli::output::{HealthStatus, OutputFormatter};
use crate::cli::progress::ProgressBarHandler;
use crate::config::{BackendKind, BackoffMode, CadradsConfig};
use crate::extraction::{BatchRunner, Classifier, PromptBuilder};
use crate::llm::select_llm_client;
use crate::progress::{LoggingHandler, ProgressHandler};
use crate::table::{self, TableFormat};
use anyhow::{Context, Result};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

pub async fn handle_classify(args: &ClassifyArgs, quiet: bool) -> i32 {
    exit_code(run_classify(args, quiet).await)
}

pub async fn handle_prompt(args: &PromptArgs) -> i32 {
    exit_code(run_prompt(args))
}

pub async fn handle_health(args: &HealthArgs) -> i32 {
    match run_health(args).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => exit_code(Err(e)),
    }
}

fn exit_code(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

/// Environment configuration with command-line overrides applied
pub fn build_config(args: &BackendArgs) -> CadradsConfig {
    let mut config = CadradsConfig::default();

    if let Some(backend) = args.backend {
        config.set_backend(backend);
    }
    if let Some(provider) = args.provider {
        config.set_provider(provider);
    }
    if let Some(model) = &args.model {
        match config.backend {
            BackendKind::Hosted => config.model = model.clone(),
            BackendKind::Local => config.local_model = Some(model.clone()),
        }
    }
    if let Some(timeout) = args.timeout {
        config.request_timeout_secs = timeout;
    }

    config
}

fn apply_classify_args(config: &mut CadradsConfig, args: &ClassifyArgs) {
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(backoff) = args.backoff {
        config.backoff_secs = backoff;
    }
    if args.exponential_backoff {
        config.backoff_mode = BackoffMode::Exponential;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(batch_timeout) = args.batch_timeout {
        config.batch_timeout_secs = Some(batch_timeout);
    }
}

async fn run_classify(args: &ClassifyArgs, quiet: bool) -> Result<()> {
    let mut config = build_config(&args.backend);
    apply_classify_args(&mut config, args);
    config.validate().context("Invalid configuration")?;
    debug!("{}", config);

    // Reject an unusable output path before spending hours on the batch.
    TableFormat::from_path(&args.output)?;
    let records = table::read_input(&args.input)?;

    let selected = select_llm_client(&config).await?;

    let progress: Arc<dyn ProgressHandler> =
        if quiet || args.no_progress || args.format == OutputFormatArg::Json {
            Arc::new(LoggingHandler)
        } else {
            Arc::new(ProgressBarHandler::new(records.len()))
        };

    let classifier = Classifier::new(selected.client.clone())
        .with_policy(config.retry_policy())
        .with_max_output_tokens(config.max_output_tokens)
        .with_progress(progress);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling unfinished reports");
            let _ = shutdown_tx.send(true);
        }
    });

    let runner = BatchRunner::new(classifier)
        .with_concurrency(config.concurrency)
        .with_batch_timeout(config.batch_timeout())
        .with_shutdown(shutdown_rx);

    let report = runner.run(records).await;
    signal_task.abort();

    table::write_output(&args.output, &report.records)
        .context("Results could not be saved")?;

    let summary = OutputFormatter::new(args.format.into()).format_summary(
        &report.summary,
        &args.output,
        &selected.description,
    )?;
    println!("{}", summary);

    Ok(())
}

fn run_prompt(args: &PromptArgs) -> Result<()> {
    let report = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read report from stdin")?;
            buf
        }
    };

    println!("{}", PromptBuilder::new().build(&report));
    Ok(())
}

async fn run_health(args: &HealthArgs) -> Result<bool> {
    let config = build_config(&args.backend);
    config.validate().context("Invalid configuration")?;

    let status = match select_llm_client(&config).await {
        Ok(selected) => HealthStatus::available(
            config.backend.to_string(),
            selected.client.name().to_string(),
            selected.client.model_info(),
        ),
        Err(e) => HealthStatus::unavailable(config.backend.to_string(), format!("{:#}", e)),
    };

    println!(
        "{}",
        OutputFormatter::new(args.format.into()).format_health(&status)?
    );
    Ok(status.available)
}
