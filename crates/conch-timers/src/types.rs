use serde::{Deserialize, Serialize};

use crate::error::TimerError;

/// How often a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Fire every `duration` until stopped.
    Interval,
    /// Fire once after `duration`, then stop.
    Timeout,
}

impl TimerKind {
    /// Numeric code scripts use (`0` interval, `1` timeout).
    pub fn code(self) -> i64 {
        match self {
            TimerKind::Interval => 0,
            TimerKind::Timeout => 1,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, TimerError> {
        match code {
            0 => Ok(TimerKind::Interval),
            1 => Ok(TimerKind::Timeout),
            other => Err(TimerError::InvalidKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimerKind::Interval => "interval",
            TimerKind::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TimerKind {
    type Err = TimerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interval" => Ok(TimerKind::Interval),
            "timeout" => Ok(TimerKind::Timeout),
            other => Err(TimerError::InvalidKind(other.to_string())),
        }
    }
}

/// Point-in-time view of a timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerInfo {
    pub id: u64,
    pub kind: TimerKind,
    pub duration_ms: u64,
    pub running: bool,
}
