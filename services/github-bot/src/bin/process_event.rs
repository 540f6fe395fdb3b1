//! Queued Webhook Consumer
//!
//! Processes one forwarded queue batch (`{"Records": [{"body": ...}]}`) with
//! the label bot or the CI bot and prints one response per record.
//!
//! With `--sweep` the label bot instead scans open unlabeled issues for
//! label requests and applies them.
//!
//! ## Usage
//! ```bash
//! # From a file
//! process-event --bot label-bot --input event.json
//!
//! # From stdin, JSON logs
//! cat event.json | process-event --bot ci-bot --log-json
//!
//! # Label the unlabeled backlog
//! process-event --bot label-bot --sweep
//! ```
//!
//! Exits non-zero when any record fails.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use mxnet_bot::logging::init_tracing;
use mxnet_bot::sweep::SweepReport;
use mxnet_bot::{load_secrets, parse_queued_message, BotKind, BotRuntime, InvocationResponse, RuntimeArgs};

/// MXNet bot queue consumer
#[derive(Parser, Debug)]
#[command(name = "process-event")]
#[command(about = "Process a queued GitHub webhook with an MXNet bot")]
#[command(version)]
struct Args {
    /// Which bot handles the event
    #[arg(long, value_enum, env = "MXNET_BOT")]
    bot: BotKind,

    /// File holding the queue batch (stdin if omitted)
    #[arg(long, short, conflicts_with = "sweep")]
    input: Option<PathBuf>,

    /// Label open unlabeled issues from their comments instead of
    /// reading a queue batch (label bot only)
    #[arg(long)]
    sweep: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(flatten)]
    runtime: RuntimeArgs,
}

#[derive(Debug, Serialize)]
struct BatchSummary {
    bot: String,
    total: usize,
    failed: usize,
    responses: Vec<InvocationResponse>,
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

#[derive(Debug, Serialize)]
struct SweepSummary {
    bot: String,
    #[serde(flatten)]
    report: SweepReport,
    failed: usize,
}

async fn run_sweep(args: &Args) -> Result<()> {
    if args.bot != BotKind::LabelBot {
        anyhow::bail!("--sweep is only available for the label bot");
    }

    let secrets = load_secrets(&args.runtime)
        .await
        .context("Failed to load bot secrets")?;
    let runtime = BotRuntime::build(args.bot, &args.runtime, &secrets)?;

    let report = match runtime.sweep().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Sweep failed");
            let response = InvocationResponse::from(&e);
            println!("{}", serde_json::to_string_pretty(&response)?);
            std::process::exit(1);
        }
    };

    let failed = report.failed();
    info!(scanned = report.scanned, labeled = report.issues.len(), failed, "Sweep complete");
    let summary = SweepSummary {
        bot: args.bot.to_string(),
        report,
        failed,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing("info", args.log_json);

    if args.sweep {
        return run_sweep(&args).await;
    }

    let text = read_input(args.input.as_ref())?;
    let envelopes = match parse_queued_message(&text) {
        Ok(envelopes) => envelopes,
        Err(e) => {
            error!(error = %e, "Unreadable queue message");
            let response = InvocationResponse::from(&e);
            println!("{}", serde_json::to_string_pretty(&response)?);
            std::process::exit(1);
        }
    };
    info!(bot = %args.bot, records = envelopes.len(), "Processing queue batch");

    let secrets = load_secrets(&args.runtime)
        .await
        .context("Failed to load bot secrets")?;
    let runtime = BotRuntime::build(args.bot, &args.runtime, &secrets)?;

    let responses = runtime.handle_batch(&envelopes).await;
    let failed = responses.iter().filter(|r| !r.is_success()).count();
    let summary = BatchSummary {
        bot: args.bot.to_string(),
        total: responses.len(),
        failed,
        responses,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
