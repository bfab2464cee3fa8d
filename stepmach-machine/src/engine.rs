//! Execution engine: drives a validated machine from `StartAt` to a
//! terminal state.
//!
//! The engine runs one state at a time. A state returning its own name
//! signals a retry re-entry; the loop then re-runs it against the same
//! event aggregate instead of opening a new one. The machine's
//! `TimeoutSeconds` bounds the whole run, and a transition counter
//! guards runaway definitions. Workflows may legitimately cycle, so
//! there is no cycle detection beyond that counter.

use crate::definition::StateMachine;
use crate::error::{kinds, StateError};
use crate::execution::{AttemptCounters, Execution, ExecutionEvent, ExecutionStatus};
use chrono::Utc;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use stepmach_handler::Context;

fn default_max_transitions() -> u64 {
    1_000_000
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on state transitions per execution.
    pub max_transitions: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_transitions: default_max_transitions(),
        }
    }
}

impl ExecutionConfig {
    pub fn with_max_transitions(mut self, max_transitions: u64) -> Self {
        self.max_transitions = max_transitions;
        self
    }
}

impl StateMachine {
    /// Executes the machine with a fresh background context.
    pub async fn execute(&self, input: Value) -> Execution {
        self.execute_with(Context::background(), input).await
    }

    /// Executes the machine from `StartAt` under the given context.
    /// Cancelling the context stops the run after the in-flight state.
    pub async fn execute_with(&self, ctx: Context, input: Value) -> Execution {
        self.execute_from(ctx, &self.start_at, input).await
    }

    /// Parses `raw` as the input document (defaulting to `{}` when
    /// absent or empty) and executes the machine.
    pub async fn execute_json(&self, raw: Option<&str>) -> Result<Execution, serde_json::Error> {
        let input = match raw {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)?,
            _ => Value::Object(serde_json::Map::new()),
        };
        Ok(self.execute(input).await)
    }

    /// Executes the machine from an explicit start state.
    pub async fn execute_from(&self, ctx: Context, start: &str, input: Value) -> Execution {
        let input = match input {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };
        let ctx = match self.timeout_seconds {
            Some(secs) => ctx.with_deadline(Duration::from_secs(secs)),
            None => ctx,
        };

        tracing::info!(start_at = start, "execution started");

        let mut events = Vec::new();
        let mut counters = AttemptCounters::default();
        let run = self.run_from(&ctx, start, input.clone(), &mut events, &mut counters);
        let result = match self.timeout_seconds {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), run).await {
                Ok(result) => result,
                Err(_) => Err(StateError::timeout("state machine timed out")),
            },
            None => run.await,
        };

        match result {
            Ok(output) => {
                let output_json = serde_json::to_string(&output).ok();
                tracing::info!("execution succeeded");
                Execution {
                    input,
                    output: Some(output),
                    output_json,
                    events,
                    status: ExecutionStatus::Succeeded,
                    error: None,
                }
            }
            Err(err) => {
                let status = if err.kind == kinds::CANCELLED {
                    ExecutionStatus::Cancelled
                } else {
                    ExecutionStatus::Failed
                };
                tracing::warn!(kind = %err.kind, cause = %err.cause, "execution failed");
                Execution {
                    input,
                    output: None,
                    output_json: None,
                    events,
                    status,
                    error: Some(err),
                }
            }
        }
    }

    /// Runs a nested execution for a Parallel branch: same definitions,
    /// fresh counters, no outer event log.
    pub(crate) async fn run_nested(
        &self,
        ctx: &Context,
        input: Value,
    ) -> Result<Value, StateError> {
        let mut events = Vec::new();
        let mut counters = AttemptCounters::default();
        self.run_from(ctx, &self.start_at, input, &mut events, &mut counters)
            .await
    }

    /// The state loop. Boxed because Parallel branches recurse back
    /// into it through their nested machines.
    fn run_from<'a>(
        &'a self,
        ctx: &'a Context,
        start: &'a str,
        input: Value,
        events: &'a mut Vec<ExecutionEvent>,
        counters: &'a mut AttemptCounters,
    ) -> BoxFuture<'a, Result<Value, StateError>> {
        Box::pin(async move {
            let mut current = start.to_string();
            let mut doc = input;
            let mut transitions: u64 = 0;
            let mut retrying = false;

            loop {
                if ctx.is_cancelled() {
                    return Err(StateError::cancelled());
                }
                transitions += 1;
                if transitions > self.config.max_transitions {
                    return Err(StateError::new(
                        kinds::TRANSITION_LIMIT,
                        format!("exceeded {} transitions", self.config.max_transitions),
                    ));
                }

                let state = self.states.get(&current).ok_or_else(|| {
                    StateError::new(kinds::TASK_FAILED, format!("undefined state {current:?}"))
                })?;

                if !retrying {
                    events.push(ExecutionEvent {
                        state: current.clone(),
                        entered: Utc::now(),
                        exited: None,
                        input: doc.clone(),
                        output: None,
                        error: None,
                    });
                    tracing::debug!(state = %current, "state entered");
                }

                match state.execute(ctx, counters, doc).await {
                    Ok((output, next)) => {
                        if let Some(event) = events.last_mut() {
                            event.exited = Some(Utc::now());
                            event.output = Some(output.clone());
                        }
                        tracing::debug!(
                            state = %current,
                            next = next.as_deref().unwrap_or("<end>"),
                            "state exited"
                        );
                        doc = output;
                        match next {
                            Some(next) if next == current => retrying = true,
                            Some(next) => {
                                retrying = false;
                                current = next;
                            }
                            None => return Ok(doc),
                        }
                    }
                    Err(err) => {
                        if let Some(event) = events.last_mut() {
                            event.exited = Some(Utc::now());
                            event.error = Some(err.clone());
                        }
                        tracing::debug!(state = %current, kind = %err.kind, "state failed");
                        return Err(err);
                    }
                }
            }
        })
    }
}
