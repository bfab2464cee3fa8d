//! Retry and catch rules.

use crate::error::kinds;
use serde::Deserialize;
use std::time::Duration;
use stepmach_path::Path;

fn default_interval_seconds() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_rate() -> f64 {
    2.0
}

/// A declarative retry rule. Attempt state lives on the per-execution
/// [`AttemptCounters`](crate::execution::AttemptCounters), not here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Retrier {
    pub error_equals: Vec<String>,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: f64,
}

impl Retrier {
    /// Backoff before the retry with the given zero-based index:
    /// `IntervalSeconds x BackoffRate^n`.
    pub fn backoff(&self, retry_index: u32) -> Duration {
        let secs = f64::from(self.interval_seconds) * self.backoff_rate.powi(retry_index as i32);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// A declarative catch rule: matched errors become a synthetic output
/// and transition to `next`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Catcher {
    pub error_equals: Vec<String>,
    pub next: String,
    #[serde(default)]
    pub result_path: Option<Path>,
}

/// Validates a list of retriers.
pub(crate) fn retry_valid(retriers: &[Retrier]) -> Result<(), String> {
    error_equals_valid(retriers.len(), retriers.iter().map(|r| r.error_equals.as_slice()))
}

/// Validates a list of catchers.
pub(crate) fn catch_valid(catchers: &[Catcher]) -> Result<(), String> {
    error_equals_valid(catchers.len(), catchers.iter().map(|c| c.error_equals.as_slice()))
}

/// Shared `ErrorEquals` constraints: lists are non-empty, unknown
/// `States.*` kinds are rejected, and `States.ALL` may only appear as
/// the sole entry of the final rule.
fn error_equals_valid<'a>(
    len: usize,
    lists: impl Iterator<Item = &'a [String]>,
) -> Result<(), String> {
    for (index, list) in lists.enumerate() {
        if list.is_empty() {
            return Err("ErrorEquals must not be empty".to_string());
        }
        for kind in list {
            if kind.starts_with("States.") && !kinds::KNOWN_STATES.contains(&kind.as_str()) {
                return Err(format!("unknown error kind {kind:?}"));
            }
        }
        if list.iter().any(|kind| kind == kinds::ALL) {
            if list.len() != 1 {
                return Err(format!(
                    "{} must be the only kind in its ErrorEquals",
                    kinds::ALL
                ));
            }
            if index + 1 != len {
                return Err(format!("{} must be on the last rule", kinds::ALL));
            }
        }
    }
    Ok(())
}
