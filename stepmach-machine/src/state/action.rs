//! Action state: invokes a bound action handler with a parameter map.

use crate::error::{kinds, StateError};
use crate::execution::AttemptCounters;
use crate::state::io::{invoke_blocking, run_shaped, Shaping};
use crate::state::retry::{catch_valid, retry_valid, Catcher, Retrier};
use crate::state::{next_or_end, Bound};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use stepmach_handler::{ActionFn, Context};
use stepmach_path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ActionState {
    #[serde(skip)]
    pub name: String,
    pub comment: Option<String>,
    /// Name passed to the handler as its side argument.
    pub action_name: Option<String>,
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
    pub timeout_seconds: Option<u64>,
    pub heartbeat_seconds: Option<u64>,
    #[serde(skip)]
    pub(crate) handler: Option<Bound<ActionFn>>,
}

impl ActionState {
    /// Binds the handler invoked by this state.
    pub(crate) fn bind(&mut self, handler: Arc<ActionFn>) {
        self.handler = Some(Bound(handler));
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        crate::state::end_valid(&self.next, self.end)?;
        if self.action_name.is_none() {
            return Err("ActionName undefined".to_string());
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
                let bound = self.handler.as_ref().ok_or_else(|| {
                    StateError::new(
                        kinds::TASK_FAILED,
                        format!("no handler bound for action state {:?}", self.name),
                    )
                })?;
                let action = self.action_name.clone().ok_or_else(|| {
                    StateError::new(kinds::TASK_FAILED, "action state has no ActionName")
                })?;
                let Value::Object(params) = doc else {
                    return Err(StateError::new(
                        kinds::TASK_FAILED,
                        "action input must be an object",
                    ));
                };
                let handler = Arc::clone(&bound.0);
                let handler_ctx = ctx.clone();
                tracing::debug!(state = %self.name, action = %action, "invoking action handler");
                let output = invoke_blocking(ctx, self.timeout_seconds, move || {
                    handler(&handler_ctx, &action, &params)
                })
                .await?;
                Ok((output, next))
            },
        )
        .await
    }
}
