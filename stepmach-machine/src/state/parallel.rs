//! Parallel state: runs nested branch machines concurrently over the
//! same input document.

use crate::definition::StateMachine;
use crate::error::{kinds, StateError};
use crate::execution::AttemptCounters;
use crate::state::io::{run_shaped, Shaping};
use crate::state::next_or_end;
use crate::state::retry::{catch_valid, retry_valid, Catcher, Retrier};
use serde::Deserialize;
use serde_json::Value;
use stepmach_handler::Context;
use stepmach_path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ParallelState {
    #[serde(skip)]
    pub name: String,
    pub comment: Option<String>,
    /// Nested machines, each a complete definition.
    #[serde(default)]
    pub branches: Vec<StateMachine>,
    pub input_path: Option<Path>,
    pub output_path: Option<Path>,
    pub result_path: Option<Path>,
    pub parameters: Option<Value>,
    #[serde(default)]
    pub retry: Vec<Retrier>,
    #[serde(default)]
    pub catch: Vec<Catcher>,
    pub next: Option<String>,
    pub end: Option<bool>,
}

impl ParallelState {
    pub(crate) fn validate(&self) -> Result<(), String> {
        crate::state::end_valid(&self.next, self.end)?;
        if self.branches.is_empty() {
            return Err("Branches must not be empty".to_string());
        }
        retry_valid(&self.retry)?;
        catch_valid(&self.catch)?;
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
            result_path: self.result_path.as_ref(),
            parameters: self.parameters.as_ref(),
        };
        run_shaped(
            &self.name,
            shaping,
            &self.retry,
            &self.catch,
            ctx,
            attempts,
            input,
            move |doc| async move {
                let output = self.run_branches(ctx, doc).await?;
                Ok((output, next))
            },
        )
        .await
    }

    /// Runs every branch to completion and collects outputs in branch
    /// definition order. A failing branch signals the others through a
    /// shared child token; the join still waits for all of them.
    async fn run_branches(&self, ctx: &Context, doc: Value) -> Result<Value, StateError> {
        let branch_ctx = ctx.child();
        let runs = self.branches.iter().enumerate().map(|(index, branch)| {
            let branch_ctx = branch_ctx.clone();
            let doc = doc.clone();
            let name = &self.name;
            async move {
                tracing::debug!(state = %name, branch = index, "branch started");
                let result = branch.run_nested(&branch_ctx, doc).await;
                if let Err(err) = &result {
                    tracing::debug!(state = %name, branch = index, kind = %err.kind, "branch failed");
                    if err.kind != kinds::CANCELLED {
                        branch_ctx.cancel();
                    }
                }
                result
            }
        });

        let results = futures::future::join_all(runs).await;

        let mut outputs = Vec::with_capacity(results.len());
        let mut failure: Option<StateError> = None;
        for result in results {
            match result {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    // Keep the first real failure; cancellation errors
                    // from sibling shutdown never mask it.
                    let replace = match &failure {
                        None => true,
                        Some(kept) => {
                            kept.kind == kinds::CANCELLED && err.kind != kinds::CANCELLED
                        }
                    };
                    if replace {
                        failure = Some(err);
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(Value::Array(outputs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::state::tests::{parse_state, run_state};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_validate_requires_branches() {
        let state = parse_state("Par", json!({"Type": "Parallel", "End": true}));
        assert!(state.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outputs_in_definition_order() {
        // Branch A waits before finishing; branch B is immediate. The
        // output array still follows definition order.
        let state = parse_state(
            "Par",
            json!({
                "Type": "Parallel",
                "End": true,
                "ResultPath": "$.results",
                "Branches": [
                    {
                        "StartAt": "SlowWait",
                        "States": {
                            "SlowWait": {"Type": "Wait", "Seconds": 1, "Next": "SlowDone"},
                            "SlowDone": {"Type": "Pass", "Result": "a", "End": true},
                        },
                    },
                    {
                        "StartAt": "FastDone",
                        "States": {
                            "FastDone": {"Type": "Pass", "Result": "b", "End": true},
                        },
                    },
                ],
            }),
        );
        let started = tokio::time::Instant::now();
        let (output, next) = run_state(&state, json!({})).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(output, json!({"results": ["a", "b"]}));
        assert!(next.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_branch_failure_propagates_kind() {
        let state = parse_state(
            "Par",
            json!({
                "Type": "Parallel",
                "End": true,
                "Branches": [
                    {
                        "StartAt": "Slow",
                        "States": {"Slow": {"Type": "Wait", "Seconds": 3600, "End": true}},
                    },
                    {
                        "StartAt": "Boom",
                        "States": {
                            "Boom": {"Type": "Fail", "Error": "BranchError", "Cause": "nope"},
                        },
                    },
                ],
            }),
        );
        let started = tokio::time::Instant::now();
        let err = run_state(&state, json!({})).await.unwrap_err();
        assert_eq!(err.kind, "BranchError");
        // The slow branch was cancelled instead of running its hour out.
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_branches_see_same_input() {
        let state = parse_state(
            "Par",
            json!({
                "Type": "Parallel",
                "End": true,
                "Branches": [
                    {
                        "StartAt": "PickA",
                        "States": {"PickA": {"Type": "Pass", "OutputPath": "$.a", "End": true}},
                    },
                    {
                        "StartAt": "PickB",
                        "States": {"PickB": {"Type": "Pass", "OutputPath": "$.b", "End": true}},
                    },
                ],
            }),
        );
        let (output, _) = run_state(&state, json!({"a": 1, "b": 2})).await.unwrap();
        assert_eq!(output, json!([1, 2]));
    }
}
