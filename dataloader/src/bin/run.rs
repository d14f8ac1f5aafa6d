//! Run a JSON load plan and print the outcome.
//!
//! Prints `{"results": [...], "store": {...}}` to stdout. Exits non-zero when
//! the load fails.

use anyhow::{Context, bail};
use clap::Parser;
use dataloader::{LoadFailure, LoggingOptions, Model, ModelError, Plan, Recovery, handler_fn};
use serde_json::{Value, json};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dataloader-run")]
#[command(about = "Run a staged load plan against an in-memory store")]
struct Args {
    /// Plan file (JSON)
    #[arg(short, long, value_name = "PATH")]
    plan: PathBuf,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, value_name = "FILTER")]
    log_filter: Option<String>,

    /// Recover every failed task with this JSON value
    #[arg(long, value_name = "JSON")]
    recover_with: Option<String>,
}

/// Plan logging settings, with command line flags taking precedence.
fn logging_options(args: &Args, plan: &Plan) -> LoggingOptions {
    let mut options = plan.logging.clone();
    if let Some(filter) = &args.log_filter {
        options.default_filter = filter.clone();
    }
    if let Some(dir) = &args.log_dir {
        options.log_dir = Some(dir.clone());
    }
    options
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let plan = Plan::from_path(&args.plan)?;
    let _guard = dataloader::init_logging(&logging_options(&args, &plan))?;

    let loader = plan.loader();

    if let Some(raw) = &args.recover_with {
        let fallback: Value = serde_json::from_str(raw)
            .with_context(|| format!("--recover-with is not valid JSON: {}", raw))?;
        loader.set_error_handler(handler_fn(move |failure, _task| {
            tracing::warn!(task = %failure.name, error = %failure.error, "Recovering failed task");
            Ok(Recovery::value(fallback.clone()))
        }));
    }

    plan.register_into(&loader)?;
    tracing::info!(
        plan = %args.plan.display(),
        tasks = loader.task_count(),
        "Plan registered"
    );

    let mut model = Model::new();
    model.set_data_loader(loader);

    match model.load().await {
        Ok(results) => {
            let output = json!({
                "results": results,
                "store": model.store().snapshot(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(ModelError::Load(failure)) => {
            if let LoadFailure::TaskFailed { results } = &failure {
                let output = json!({
                    "results": results,
                    "store": model.store().snapshot(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            bail!("load failed: {}", failure)
        }
        Err(e) => Err(e.into()),
    }
}
