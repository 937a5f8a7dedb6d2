use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_FILTER: &str = "conch=info";
pub const DEFAULT_CAPTURE_LIMIT: usize = 1024 * 1024; // 1 MB kept per job output stream
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Top-level config (conch.toml + CONCH_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConchConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub timers: TimersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// EnvFilter directive used when RUST_LOG is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Job control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Send SIGHUP to every running job when the shell exits (default: true).
    /// Override with env var: CONCH_JOBS__HANGUP_ON_EXIT=false
    #[serde(default = "bool_true")]
    pub hangup_on_exit: bool,
    /// Maximum bytes retained in each stdout/stderr capture buffer.
    /// The oldest bytes are dropped once a job writes past the limit.
    #[serde(default = "default_capture_limit")]
    pub capture_limit: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            hangup_on_exit: true,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimersConfig {
    /// How long shutdown waits for running timers to acknowledge cancellation.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}
fn default_capture_limit() -> usize {
    DEFAULT_CAPTURE_LIMIT
}
fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

impl ConchConfig {
    /// Load config from a TOML file with CONCH_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.conch/conch.toml
    ///
    /// A missing file is not an error; every section falls back to its defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        // Double underscore separates sections so keys may contain `_`.
        let config: ConchConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CONCH_").split("__"))
            .extract()
            .map_err(|e| crate::error::ConchError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.conch/conch.toml", home)
}
