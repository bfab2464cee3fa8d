//! The shaped-execution pipeline shared by states.
//!
//! Every shaped state runs the same fixed composition around its own
//! `process`: InputPath narrows the document, Parameters interpolate
//! over the narrowed input, the process result is written back through
//! ResultPath (merge semantics, default `$`), OutputPath narrows the
//! outcome. Errors from the inner pipeline are offered to the state's
//! retriers first, then to its catchers, and finally stamped with the
//! state name.

use crate::error::{kinds, StateError};
use crate::execution::AttemptCounters;
use crate::state::retry::{Catcher, Retrier};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use stepmach_handler::{Context, HandlerError};
use stepmach_path::{interpolate, Path};

/// Path and parameter fields of a shaped state.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Shaping<'a> {
    pub input_path: Option<&'a Path>,
    pub output_path: Option<&'a Path>,
    pub result_path: Option<&'a Path>,
    pub parameters: Option<&'a Value>,
}

/// Runs one shaped state visit.
///
/// `process` receives the narrowed, interpolated document and returns
/// its result plus the transition target (`None` = terminal). On a
/// matched retry the state's own name comes back as the target and the
/// original input passes through unchanged, signalling the engine to
/// re-enter.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_shaped<F, Fut>(
    name: &str,
    shaping: Shaping<'_>,
    retry: &[Retrier],
    catch: &[Catcher],
    ctx: &Context,
    attempts: &mut AttemptCounters,
    input: Value,
    process: F,
) -> Result<(Value, Option<String>), StateError>
where
    F: FnOnce(Value) -> Fut,
    Fut: Future<Output = Result<(Value, Option<String>), StateError>>,
{
    let err = match attempt(shaping, input.clone(), process).await {
        Ok(outcome) => return Ok(outcome),
        Err(err) => err,
    };

    // Retry: the first retrier whose ErrorEquals matches decides.
    if let Some((index, retrier)) = retry
        .iter()
        .enumerate()
        .find(|(_, r)| err.matches(&r.error_equals))
    {
        let spent = attempts.attempts(name, index);
        if spent < retrier.max_attempts {
            attempts.record(name, index);
            let delay = retrier.backoff(spent);
            tracing::debug!(
                state = name,
                kind = %err.kind,
                retry = spent + 1,
                delay_secs = delay.as_secs_f64(),
                "retrying after backoff"
            );
            sleep_cancellable(ctx, delay).await?;
            return Ok((input, Some(name.to_string())));
        }
    }

    // Catch: matched errors become a synthetic output document.
    if let Some(catcher) = catch.iter().find(|c| err.matches(&c.error_equals)) {
        tracing::debug!(state = name, kind = %err.kind, next = %catcher.next, "error caught");
        let caught = json!({"Error": err.kind, "Cause": err.cause});
        let output = match &catcher.result_path {
            Some(path) => path.set(&input, caught).map_err(|e| {
                StateError::new(kinds::RESULT_PATH_MATCH_FAILURE, e.to_string()).in_state(name)
            })?,
            None => caught,
        };
        return Ok((output, Some(catcher.next.clone())));
    }

    Err(err.in_state(name))
}

/// One pass through the inner pipeline.
async fn attempt<F, Fut>(
    shaping: Shaping<'_>,
    input: Value,
    process: F,
) -> Result<(Value, Option<String>), StateError>
where
    F: FnOnce(Value) -> Fut,
    Fut: Future<Output = Result<(Value, Option<String>), StateError>>,
{
    let narrowed = match shaping.input_path {
        Some(path) => path
            .get(&input)
            .map_err(|e| StateError::new(kinds::INPUT_PATH_FAILURE, format!("Input Error: {e}")))?,
        None => input,
    };

    let effective = match shaping.parameters {
        Some(params) => interpolate(params, &narrowed)
            .map_err(|e| StateError::new(kinds::PARAMETER_PATH_FAILURE, e.to_string()))?,
        None => narrowed.clone(),
    };

    let (result, next) = process(effective).await?;

    let result_path = shaping.result_path.cloned().unwrap_or_default();
    let shaped = result_path
        .set(&narrowed, result)
        .map_err(|e| StateError::new(kinds::RESULT_PATH_MATCH_FAILURE, e.to_string()))?;

    let output = match shaping.output_path {
        Some(path) => path.get(&shaped).map_err(|e| {
            StateError::new(kinds::OUTPUT_PATH_FAILURE, format!("Output Error: {e}"))
        })?,
        None => shaped,
    };

    Ok((output, next))
}

/// Sleeps for `delay`, aborting early if the context is cancelled.
pub(crate) async fn sleep_cancellable(ctx: &Context, delay: Duration) -> Result<(), StateError> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = ctx.cancelled() => Err(StateError::cancelled()),
    }
}

/// Invokes a blocking handler call off the async runtime.
///
/// `timeout_seconds` bounds this single attempt; expiry surfaces as
/// `States.Timeout`. Panics inside the handler are recovered as
/// `PanicError`. Cancellation lets the in-flight call run to completion
/// on its thread but stops the execution immediately.
pub(crate) async fn invoke_blocking<F>(
    ctx: &Context,
    timeout_seconds: Option<u64>,
    call: F,
) -> Result<Value, StateError>
where
    F: FnOnce() -> Result<Value, HandlerError> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(call);
    let joined = tokio::select! {
        joined = join_with_timeout(handle, timeout_seconds) => joined?,
        _ = ctx.cancelled() => return Err(StateError::cancelled()),
    };
    joined.map_err(StateError::from)
}

async fn join_with_timeout(
    handle: tokio::task::JoinHandle<Result<Value, HandlerError>>,
    timeout_seconds: Option<u64>,
) -> Result<Result<Value, HandlerError>, StateError> {
    let joined = match timeout_seconds {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), handle)
            .await
            .map_err(|_| StateError::timeout("handler attempt timed out"))?,
        None => handle.await,
    };
    match joined {
        Ok(result) => Ok(result),
        Err(err) if err.is_panic() => Err(HandlerError::from_panic(err.into_panic()).into()),
        Err(err) => Err(StateError::new(kinds::TASK_FAILED, err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shaping<'a>(
        input_path: Option<&'a Path>,
        output_path: Option<&'a Path>,
        result_path: Option<&'a Path>,
    ) -> Shaping<'a> {
        Shaping {
            input_path,
            output_path,
            result_path,
            parameters: None,
        }
    }

    #[tokio::test]
    async fn test_default_result_path_merges() {
        let mut attempts = AttemptCounters::default();
        let (output, next) = run_shaped(
            "T",
            shaping(None, None, None),
            &[],
            &[],
            &Context::background(),
            &mut attempts,
            json!({"a": "c"}),
            |_doc| async { Ok((json!({"z": "y"}), Some("Next".to_string()))) },
        )
        .await
        .unwrap();
        assert_eq!(output, json!({"a": "c", "z": "y"}));
        assert_eq!(next.as_deref(), Some("Next"));
    }

    #[tokio::test]
    async fn test_input_path_error_kind() {
        let mut attempts = AttemptCounters::default();
        let input_path: Path = "$.a.b".parse().unwrap();
        let err = run_shaped(
            "T",
            shaping(Some(&input_path), None, None),
            &[],
            &[],
            &Context::background(),
            &mut attempts,
            json!({"a": "b"}),
            |doc| async { Ok((doc, None)) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, kinds::INPUT_PATH_FAILURE);
        assert!(err.cause.contains("Input Error"));
        assert_eq!(err.state.as_deref(), Some("T"));
    }

    #[tokio::test]
    async fn test_catch_produces_error_document() {
        let mut attempts = AttemptCounters::default();
        let catch = vec![Catcher {
            error_equals: vec!["TestError".to_string()],
            next: "Fail".to_string(),
            result_path: None,
        }];
        let (output, next) = run_shaped(
            "T",
            Shaping::default(),
            &[],
            &catch,
            &Context::background(),
            &mut attempts,
            json!({"a": "c"}),
            |_doc| async { Err(StateError::new("TestError", "This is a Test Error")) },
        )
        .await
        .unwrap();
        assert_eq!(
            output,
            json!({"Error": "TestError", "Cause": "This is a Test Error"})
        );
        assert_eq!(next.as_deref(), Some("Fail"));
    }

    #[tokio::test]
    async fn test_catch_result_path_writes_into_input() {
        let mut attempts = AttemptCounters::default();
        let catch = vec![Catcher {
            error_equals: vec![kinds::ALL.to_string()],
            next: "Recover".to_string(),
            result_path: Some("$.error".parse().unwrap()),
        }];
        let (output, _) = run_shaped(
            "T",
            Shaping::default(),
            &[],
            &catch,
            &Context::background(),
            &mut attempts,
            json!({"a": "c"}),
            |_doc| async { Err(StateError::new("TestError", "boom")) },
        )
        .await
        .unwrap();
        assert_eq!(
            output,
            json!({"a": "c", "error": {"Error": "TestError", "Cause": "boom"}})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_returns_self_and_sleeps() {
        let mut attempts = AttemptCounters::default();
        let retry = vec![Retrier {
            error_equals: vec!["TestError".to_string()],
            interval_seconds: 1,
            max_attempts: 2,
            backoff_rate: 2.0,
        }];
        let started = tokio::time::Instant::now();
        let (output, next) = run_shaped(
            "T",
            Shaping::default(),
            &retry,
            &[],
            &Context::background(),
            &mut attempts,
            json!({"a": "c"}),
            |_doc| async { Err(StateError::new("TestError", "boom")) },
        )
        .await
        .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(output, json!({"a": "c"}));
        assert_eq!(next.as_deref(), Some("T"));
        assert_eq!(attempts.attempts("T", 0), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retry_falls_through_to_catch() {
        let mut attempts = AttemptCounters::default();
        let retry = vec![Retrier {
            error_equals: vec!["TestError".to_string()],
            interval_seconds: 0,
            max_attempts: 1,
            backoff_rate: 2.0,
        }];
        let catch = vec![Catcher {
            error_equals: vec!["TestError".to_string()],
            next: "Fail".to_string(),
            result_path: None,
        }];

        // First visit retries.
        let (_, next) = run_shaped(
            "T",
            Shaping::default(),
            &retry,
            &catch,
            &Context::background(),
            &mut attempts,
            json!({}),
            |_doc| async { Err(StateError::new("TestError", "boom")) },
        )
        .await
        .unwrap();
        assert_eq!(next.as_deref(), Some("T"));

        // Second visit is exhausted and caught.
        let (_, next) = run_shaped(
            "T",
            Shaping::default(),
            &retry,
            &catch,
            &Context::background(),
            &mut attempts,
            json!({}),
            |_doc| async { Err(StateError::new("TestError", "boom")) },
        )
        .await
        .unwrap();
        assert_eq!(next.as_deref(), Some("Fail"));
    }

    #[tokio::test]
    async fn test_first_matching_retrier_decides() {
        // An exhausted first match never falls through to a later
        // States.ALL retrier.
        let mut attempts = AttemptCounters::default();
        let retry = vec![
            Retrier {
                error_equals: vec!["TestError".to_string()],
                interval_seconds: 0,
                max_attempts: 0,
                backoff_rate: 2.0,
            },
            Retrier {
                error_equals: vec![kinds::ALL.to_string()],
                interval_seconds: 0,
                max_attempts: 3,
                backoff_rate: 2.0,
            },
        ];
        let err = run_shaped(
            "T",
            Shaping::default(),
            &retry,
            &[],
            &Context::background(),
            &mut attempts,
            json!({}),
            |_doc| async { Err(StateError::new("TestError", "boom")) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, "TestError");
    }

    #[tokio::test]
    async fn test_invoke_blocking_recovers_panics() {
        let err = invoke_blocking(&Context::background(), None, || panic!("kaboom"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, kinds::PANIC);
        assert!(err.cause.contains("kaboom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_blocking_timeout() {
        let err = invoke_blocking(&Context::background(), Some(1), || {
            std::thread::sleep(Duration::from_millis(400));
            Ok(json!("late"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind, kinds::TIMEOUT);
    }
}
