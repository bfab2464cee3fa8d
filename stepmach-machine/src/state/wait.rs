//! Wait state: suspends the execution for a configured delay.

use crate::error::{kinds, StateError};
use crate::execution::AttemptCounters;
use crate::state::io::{run_shaped, sleep_cancellable, Shaping};
use crate::state::next_or_end;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use stepmach_handler::Context;
use stepmach_path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct WaitState {
    #[serde(skip)]
    pub name: String,
    pub comment: Option<String>,
    /// Relative delay in whole seconds.
    pub seconds: Option<u64>,
    /// Path resolving to a relative delay in seconds.
    pub seconds_path: Option<Path>,
    /// Absolute ISO-8601 wake-up time.
    pub timestamp: Option<DateTime<Utc>>,
    /// Path resolving to an absolute ISO-8601 wake-up time.
    pub timestamp_path: Option<Path>,
    pub input_path: Option<Path>,
    pub output_path: Option<Path>,
    pub next: Option<String>,
    pub end: Option<bool>,
}

impl WaitState {
    pub(crate) fn validate(&self) -> Result<(), String> {
        crate::state::end_valid(&self.next, self.end)?;
        let configured = [
            self.seconds.is_some(),
            self.seconds_path.is_some(),
            self.timestamp.is_some(),
            self.timestamp_path.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if configured != 1 {
            return Err(
                "exactly one of Seconds, SecondsPath, Timestamp, TimestampPath required"
                    .to_string(),
            );
        }
        Ok(())
    }

    pub(crate) async fn execute(
        &self,
        ctx: &Context,
        attempts: &mut AttemptCounters,
        input: Value,
    ) -> Result<(Value, Option<String>), StateError> {
        let next = next_or_end(&self.next, self.end);
        let shaping = Shaping {
            input_path: self.input_path.as_ref(),
            output_path: self.output_path.as_ref(),
            result_path: None,
            parameters: None,
        };
        run_shaped(
            &self.name,
            shaping,
            &[],
            &[],
            ctx,
            attempts,
            input,
            move |doc| async move {
                let delay = self.delay(&doc)?;
                if !delay.is_zero() {
                    tracing::debug!(state = %self.name, delay_secs = delay.as_secs_f64(), "waiting");
                    sleep_cancellable(ctx, delay).await?;
                }
                Ok((doc, next))
            },
        )
        .await
    }

    /// Resolves the configured delay against the narrowed input.
    /// Timestamps already in the past yield a zero delay.
    fn delay(&self, doc: &Value) -> Result<Duration, StateError> {
        if let Some(secs) = self.seconds {
            return Ok(Duration::from_secs(secs));
        }
        if let Some(path) = &self.seconds_path {
            let value = path
                .get(doc)
                .map_err(|e| StateError::new(kinds::INPUT_PATH_FAILURE, e.to_string()))?;
            let secs = value.as_f64().ok_or_else(|| {
                StateError::new(
                    kinds::INPUT_PATH_FAILURE,
                    format!("SecondsPath {path} did not resolve to a number"),
                )
            })?;
            return Ok(Duration::from_secs_f64(secs.max(0.0)));
        }
        if let Some(timestamp) = &self.timestamp {
            return Ok(until(timestamp));
        }
        if let Some(path) = &self.timestamp_path {
            let value = path
                .get(doc)
                .map_err(|e| StateError::new(kinds::INPUT_PATH_FAILURE, e.to_string()))?;
            let timestamp = value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .ok_or_else(|| {
                    StateError::new(
                        kinds::INPUT_PATH_FAILURE,
                        format!("TimestampPath {path} did not resolve to a timestamp"),
                    )
                })?;
            return Ok(until(&timestamp.with_timezone(&Utc)));
        }
        Err(StateError::new(
            kinds::TASK_FAILED,
            "wait state has no delay configured",
        ))
    }
}

fn until(timestamp: &DateTime<Utc>) -> Duration {
    (*timestamp - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}
