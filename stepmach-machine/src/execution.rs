//! Per-execution bookkeeping: event log, final status, and retry
//! attempt counters.

use crate::error::StateError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Final status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// One state visit in the event log.
///
/// A retried state keeps a single event aggregate: re-entries after a
/// retry backoff update the open event instead of appending a new one.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionEvent {
    /// Name of the visited state.
    pub state: String,
    /// When the state was entered.
    pub entered: DateTime<Utc>,
    /// When the state was exited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exited: Option<DateTime<Utc>>,
    /// Document the state was entered with.
    pub input: Value,
    /// Document the state produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error the state raised, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StateError>,
}

/// A completed run of a state machine.
#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    /// The initial document.
    pub input: Value,
    /// Final output document for successful runs.
    pub output: Option<Value>,
    /// Final output rendered as canonical JSON text.
    pub output_json: Option<String>,
    /// Ordered event log in engine observation order.
    pub events: Vec<ExecutionEvent>,
    /// Final status.
    pub status: ExecutionStatus,
    /// The error that terminated a failed or cancelled run.
    pub error: Option<StateError>,
}

impl Execution {
    /// Consumes the execution, yielding the output or the failure.
    pub fn into_result(self) -> Result<Value, StateError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.output.unwrap_or(Value::Null)),
        }
    }
}

/// Per-execution retry attempt counters, keyed by state name and
/// retrier index. Counters never live on the shared state graph, so a
/// definition can be executed concurrently.
#[derive(Debug, Default)]
pub struct AttemptCounters {
    counts: HashMap<(String, usize), u32>,
}

impl AttemptCounters {
    /// Retries already spent for a state's retrier.
    pub fn attempts(&self, state: &str, retrier: usize) -> u32 {
        self.counts
            .get(&(state.to_string(), retrier))
            .copied()
            .unwrap_or(0)
    }

    /// Records one more retry and returns the new count.
    pub fn record(&mut self, state: &str, retrier: usize) -> u32 {
        let count = self.counts.entry((state.to_string(), retrier)).or_insert(0);
        *count += 1;
        *count
    }
}
