//! Replay a scripted session and print the pruning report.
//!
//! # Examples
//!
//! ```sh
//! # Report as JSON on stdout
//! ctxprune session.json
//!
//! # Byte metric, tighter budget, final model view on stdout
//! ctxprune session.json --bytes --critical-budget 20000 --view model
//!
//! # Config file plus debug logging
//! RUST_LOG=ctxprune=debug ctxprune session.json --config prune.json
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ctxprune::events::LoggingHandler;
use ctxprune::session::ContextManager;
use ctxprune_replay::{Overrides, ReplayConfig, Replayer, SessionScript};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// What to print after the replay.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum View {
    /// The JSON report.
    Report,
    /// History as the model would see it.
    Model,
    /// History as the user would see it.
    User,
}

/// Replay a scripted agent session through the context manager.
#[derive(Parser)]
#[command(name = "ctxprune", version)]
struct Cli {
    /// Session script (JSON).
    script: PathBuf,

    /// Config file (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Measure content in bytes instead of estimated tokens.
    #[arg(long)]
    bytes: bool,

    /// Characters per token for the token estimate.
    #[arg(long, conflicts_with = "bytes")]
    chars_per_token: Option<f64>,

    /// Outputs smaller than this are never prunable.
    #[arg(long)]
    min_entry_size: Option<u64>,

    /// Active output cost above which a squash is suggested.
    #[arg(long)]
    critical_budget: Option<u64>,

    /// Turns without a prune before a discard is suggested.
    #[arg(long)]
    grace_turns: Option<u32>,

    /// Disable nudges.
    #[arg(long)]
    no_nudges: bool,

    /// Simulated latency per tool call, in milliseconds.
    #[arg(long)]
    latency_ms: Option<u64>,

    /// What to print.
    #[arg(long, value_enum, default_value_t = View::Report)]
    view: View,

    /// Write the output here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ReplayConfig::load_or_default(cli.config.as_deref())?.apply(&Overrides {
        bytes: cli.bytes,
        chars_per_token: cli.chars_per_token,
        min_entry_size: cli.min_entry_size,
        critical_budget: cli.critical_budget,
        grace_turns: cli.grace_turns,
        no_nudges: cli.no_nudges,
        tool_latency_ms: cli.latency_ms,
    });
    let script = SessionScript::load(&cli.script)?;

    let ctx = ContextManager::new(config.context.clone()).with_event_handler(LoggingHandler);
    let mut replayer =
        Replayer::new(ctx).with_latency(Duration::from_millis(config.tool_latency_ms));
    let report = replayer.run(&script).await?;

    let text = match cli.view {
        View::Report => serde_json::to_string_pretty(&report)?,
        View::Model => replayer.context().model_view().render(),
        View::User => replayer.context().user_view().render(),
    };
    match &cli.output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{text}"),
    }
    Ok(())
}
