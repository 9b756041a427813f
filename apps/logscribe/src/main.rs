//! Logscribe entry point.

mod app;
mod bootstrap;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Captures device/platform log streams during manual test sessions.
#[derive(Debug, Parser)]
#[command(name = "logscribe", version, about)]
pub struct Cli {
    /// Tester name used in log paths. Defaults to the hostname.
    #[arg(long)]
    pub tester: Option<String>,

    /// Feature under test, used in log paths.
    #[arg(long, default_value = "session")]
    pub feature: String,

    /// Start capturing these platforms immediately (repeatable).
    #[arg(long = "platform")]
    pub platforms: Vec<String>,

    /// Override the configured log root directory.
    #[arg(long)]
    pub log_root: Option<PathBuf>,

    /// Configuration file path.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip the startup update check.
    #[arg(long)]
    pub skip_update_check: bool,

    /// Stop after this many seconds (0 = run until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    pub run_for: u64,
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting logscribe");

    let config = config::Config::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli, config))?;

    tracing::info!("logscribe shut down cleanly");
    Ok(())
}
