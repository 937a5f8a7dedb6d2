use std::sync::Arc;

use clap::Parser;
use conch_core::config::ConchConfig;
use tracing::{info, warn};

mod cli;
mod runtime;

use cli::Cli;
use runtime::ShellRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // load config: --config > CONCH_CONFIG env > ~/.conch/conch.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("CONCH_CONFIG").ok());
    let loaded = ConchConfig::load(config_path.as_deref());
    let filter = loaded
        .as_ref()
        .map(|c| c.log.filter.clone())
        .unwrap_or_else(|_| conch_core::config::DEFAULT_LOG_FILTER.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = loaded.unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        ConchConfig::default()
    });

    let shell = Arc::new(ShellRuntime::new(config)?);
    info!(jobs = cli.job.len(), foreground = cli.fg, "conch started");

    let worker = Arc::clone(&shell);
    let (lines, fg) = (cli.job.clone(), cli.fg);
    // Job waits block; keep them off the async workers.
    tokio::task::spawn_blocking(move || worker.run_jobs(&lines, fg)).await?;

    shell.shutdown().await;

    if cli.report {
        println!("{}", serde_json::to_string_pretty(&shell.report())?);
    }
    Ok(())
}
