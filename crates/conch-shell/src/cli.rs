//! Command-line flags.

use clap::Parser;

/// conch: run jobs and scripts under shell job control.
#[derive(Parser, Debug)]
#[command(name = "conch")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CONCH_BUILD_REV"), ")"))]
#[command(about = "Shell runtime core: jobs, timers and hooks")]
#[command(long_about = r#"
Runs commands as shell jobs with output capture and lifecycle hooks.

Configuration is loaded from (in priority order):
1. --config <path>          Explicit config file
2. $CONCH_CONFIG            Path from the environment
3. ~/.conch/conch.toml      User config
CONCH_* variables override single keys, e.g. CONCH_JOBS__HANGUP_ON_EXIT=false.

Example:
  conch --job "sleep 2" --job "echo done" --report
  conch --job "vim notes.txt" --fg
"#)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Command line to run as a job (can be specified multiple times)
    #[arg(short, long, value_name = "CMD")]
    pub job: Vec<String>,

    /// Put the last job in the foreground instead of waiting in the background
    #[arg(long)]
    pub fg: bool,

    /// Print the final job and timer tables as JSON
    #[arg(long)]
    pub report: bool,
}
