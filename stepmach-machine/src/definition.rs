//! State machine definitions: parsing entry points, whole-graph
//! validation, and handler binding.
//!
//! A validated definition is read-only during execution and may be
//! executed concurrently; all mutable execution state lives on the
//! per-run structures in [`crate::execution`].

use crate::engine::ExecutionConfig;
use crate::error::DefinitionError;
use crate::parser;
use crate::state::State;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use stepmach_handler::{ActionFn, ActionHandlers, Context, HandlerError, TaskFn, TaskHandlers};

/// A parsed state machine definition.
#[derive(Debug, Clone)]
pub struct StateMachine {
    /// Name of the initial state.
    pub start_at: String,
    pub comment: Option<String>,
    /// Wall-clock budget for a whole execution, in seconds.
    pub timeout_seconds: Option<u64>,
    /// States by name.
    pub states: HashMap<String, State>,
    pub(crate) config: ExecutionConfig,
}

impl StateMachine {
    /// Parses a definition from raw JSON text.
    pub fn from_json(raw: &str) -> Result<Self, DefinitionError> {
        let value: Value = serde_json::from_str(raw)?;
        parser::machine_from_value(value)
    }

    /// Parses a definition from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, DefinitionError> {
        parser::machine_from_value(value)
    }

    /// Replaces the engine tuning configuration.
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the whole graph: per-state constraints, reference
    /// resolution, and `States.ALL` placement, recursing into Parallel
    /// branches.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if !self.states.contains_key(&self.start_at) {
            return Err(DefinitionError::UnknownStartAt {
                start_at: self.start_at.clone(),
            });
        }
        for (name, state) in &self.states {
            state.validate()?;
            for target in state.transition_targets() {
                if !self.states.contains_key(target) {
                    return Err(DefinitionError::UnknownTarget {
                        name: name.clone(),
                        target: target.to_string(),
                    });
                }
            }
            if let State::Parallel(parallel) = state {
                for branch in &parallel.branches {
                    branch.validate()?;
                }
            }
        }
        Ok(())
    }

    /// Binds an already-erased task handler to a named Task state.
    pub fn bind_task_handler(
        &mut self,
        state_name: &str,
        handler: Arc<TaskFn>,
    ) -> Result<(), DefinitionError> {
        let state = self
            .states
            .get_mut(state_name)
            .ok_or_else(|| DefinitionError::UnknownState {
                name: state_name.to_string(),
            })?;
        match state {
            State::Task(_) => {
                state.bind_task(handler);
                Ok(())
            }
            _ => Err(DefinitionError::NotBindable {
                name: state_name.to_string(),
                expected: "Task",
            }),
        }
    }

    /// Binds a typed task handler to a named Task state, generating
    /// the JSON-in/JSON-out thunk for its event type.
    pub fn bind_task_fn<E, R, F>(
        &mut self,
        state_name: &str,
        handler: F,
    ) -> Result<(), DefinitionError>
    where
        E: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(&Context, E) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        self.bind_task_handler(state_name, stepmach_handler::task::erased(handler))
    }

    /// Binds every Task state (including those synthesized from
    /// `TaskFn` sugar) to the registry's in-band dispatcher, recursing
    /// into Parallel branches.
    pub fn bind_task_handlers(&mut self, handlers: &Arc<TaskHandlers>) {
        for state in self.states.values_mut() {
            match state {
                State::Task(_) => {
                    let registry = Arc::clone(handlers);
                    state.bind_task(Arc::new(move |ctx: &Context, input: Value| {
                        registry.dispatch(ctx, input)
                    }));
                }
                State::Parallel(parallel) => {
                    for branch in &mut parallel.branches {
                        branch.bind_task_handlers(handlers);
                    }
                }
                _ => {}
            }
        }
    }

    /// Binds an already-erased action handler to a named Action state.
    pub fn bind_action_handler(
        &mut self,
        state_name: &str,
        handler: Arc<ActionFn>,
    ) -> Result<(), DefinitionError> {
        let state = self
            .states
            .get_mut(state_name)
            .ok_or_else(|| DefinitionError::UnknownState {
                name: state_name.to_string(),
            })?;
        match state {
            State::Action(_) => {
                state.bind_action(handler);
                Ok(())
            }
            _ => Err(DefinitionError::NotBindable {
                name: state_name.to_string(),
                expected: "Action",
            }),
        }
    }

    /// Binds every Action state to the registry handler matching its
    /// `ActionName`, recursing into Parallel branches. Action states
    /// without a registered handler are left unbound and fail at
    /// execution.
    pub fn bind_action_handlers(&mut self, handlers: &ActionHandlers) {
        for state in self.states.values_mut() {
            match state {
                State::Action(action) => {
                    if let Some(handler) = action
                        .action_name
                        .as_deref()
                        .and_then(|name| handlers.get(name))
                    {
                        action.bind(handler);
                    }
                }
                State::Parallel(parallel) => {
                    for branch in &mut parallel.branches {
                        branch.bind_action_handlers(handlers);
                    }
                }
                _ => {}
            }
        }
    }
}

impl<'de> Deserialize<'de> for StateMachine {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parser::machine_from_value(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DefinitionError;
    use serde_json::json;

    fn machine(raw: Value) -> StateMachine {
        StateMachine::from_value(raw).unwrap()
    }

    #[test]
    fn test_validate_minimal_machine() {
        let sm = machine(json!({
            "StartAt": "Done",
            "States": {"Done": {"Type": "Succeed"}},
        }));
        assert!(sm.validate().is_ok());
    }

    #[test]
    fn test_validate_unknown_start_at() {
        let sm = machine(json!({
            "StartAt": "Nope",
            "States": {"Done": {"Type": "Succeed"}},
        }));
        assert!(matches!(
            sm.validate(),
            Err(DefinitionError::UnknownStartAt { .. })
        ));
    }

    #[test]
    fn test_validate_dangling_next() {
        let sm = machine(json!({
            "StartAt": "First",
            "States": {"First": {"Type": "Pass", "Next": "Missing"}},
        }));
        assert!(matches!(
            sm.validate(),
            Err(DefinitionError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_validate_dangling_catcher_next() {
        let sm = machine(json!({
            "StartAt": "First",
            "States": {
                "First": {
                    "Type": "Task",
                    "Resource": "r",
                    "End": true,
                    "Catch": [{"ErrorEquals": ["States.ALL"], "Next": "Missing"}],
                },
            },
        }));
        assert!(matches!(
            sm.validate(),
            Err(DefinitionError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_validate_dangling_choice_default() {
        let sm = machine(json!({
            "StartAt": "Pick",
            "States": {
                "Pick": {
                    "Type": "Choice",
                    "Choices": [{"Variable": "$.n", "NumericEquals": 1, "Next": "One"}],
                    "Default": "Missing",
                },
                "One": {"Type": "Succeed"},
            },
        }));
        assert!(matches!(
            sm.validate(),
            Err(DefinitionError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_validate_recurses_into_branches() {
        let sm = machine(json!({
            "StartAt": "Par",
            "States": {
                "Par": {
                    "Type": "Parallel",
                    "End": true,
                    "Branches": [{
                        "StartAt": "Inner",
                        "States": {"Inner": {"Type": "Pass", "Next": "Missing"}},
                    }],
                },
            },
        }));
        assert!(matches!(
            sm.validate(),
            Err(DefinitionError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_bind_task_handler_rejects_wrong_state() {
        let mut sm = machine(json!({
            "StartAt": "Done",
            "States": {"Done": {"Type": "Succeed"}},
        }));
        let err = sm
            .bind_task_fn("Done", |_: &Context, input: Value| {
                Ok::<_, HandlerError>(input)
            })
            .unwrap_err();
        assert!(matches!(err, DefinitionError::NotBindable { .. }));

        let err = sm
            .bind_task_fn("Missing", |_: &Context, input: Value| {
                Ok::<_, HandlerError>(input)
            })
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownState { .. }));
    }
}
