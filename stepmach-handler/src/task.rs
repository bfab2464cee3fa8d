//! Task handler registry.
//!
//! Handlers are registered under a task name with a typed signature
//! `(ctx, event) -> Result<output, error>`; registration erases the
//! event type behind a JSON-document-in/JSON-document-out thunk. The
//! registry also acts as the in-band dispatcher for machines using the
//! `TaskFn` sugar, where a single worker multiplexes on the `Task`
//! discriminator carried in the message.

use crate::context::Context;
use crate::error::HandlerError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type-erased task handler: JSON document in, JSON document out.
pub type TaskFn = dyn Fn(&Context, Value) -> Result<Value, HandlerError> + Send + Sync;

/// Erases a typed handler behind a [`TaskFn`] thunk.
///
/// Every call decodes the input document into a fresh `E` and
/// re-encodes the result through `serde_json::to_value`, so downstream
/// path operations always see canonical JSON shapes.
pub fn erased<E, R, F>(handler: F) -> Arc<TaskFn>
where
    E: DeserializeOwned + 'static,
    R: Serialize + 'static,
    F: Fn(&Context, E) -> Result<R, HandlerError> + Send + Sync + 'static,
{
    Arc::new(move |ctx: &Context, input: Value| {
        let event: E = serde_json::from_value(input).map_err(HandlerError::Unmarshal)?;
        let result = handler(ctx, event)?;
        serde_json::to_value(result).map_err(HandlerError::Marshal)
    })
}

/// The in-band envelope synthesized by `TaskFn` states.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawMessage {
    /// Name of the task to dispatch to.
    pub task: Option<String>,
    /// Event payload for the handler.
    #[serde(default)]
    pub input: Value,
    /// Raw parameters, carried to the handler via the context.
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Registry mapping task names to handler thunks.
#[derive(Default, Clone)]
pub struct TaskHandlers {
    handlers: HashMap<String, Arc<TaskFn>>,
}

impl TaskHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed handler under `name`.
    ///
    /// The handler shape is enforced by the signature; the remaining
    /// registration-time check is name uniqueness.
    pub fn register<E, R, F>(
        &mut self,
        name: impl Into<String>,
        handler: F,
    ) -> Result<(), HandlerError>
    where
        E: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(&Context, E) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(HandlerError::Duplicate { name });
        }
        self.handlers.insert(name, erased(handler));
        Ok(())
    }

    /// Returns true if a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Returns the registered task names, sorted.
    pub fn tasks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the thunk registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<TaskFn>> {
        self.handlers.get(name).cloned()
    }

    /// Invokes a handler directly by name.
    pub fn call(&self, ctx: &Context, name: &str, input: Value) -> Result<Value, HandlerError> {
        let handler = self.handlers.get(name).ok_or_else(|| HandlerError::Unknown {
            name: name.to_string(),
            known: self.tasks(),
        })?;
        handler(ctx, input)
    }

    /// Dispatches an in-band message of the form produced by `TaskFn`
    /// states: `{"Task": name, "Input": event, "Parameters": {...}}`.
    ///
    /// The raw `Parameters` value is attached to the handler's context
    /// under the `"Params"` key.
    pub fn dispatch(&self, ctx: &Context, message: Value) -> Result<Value, HandlerError> {
        let message: RawMessage =
            serde_json::from_value(message).map_err(HandlerError::Unmarshal)?;
        let task = message.task.ok_or_else(|| HandlerError::MissingTask {
            known: self.tasks(),
        })?;
        let params = message.parameters.unwrap_or(Value::Null);
        let ctx = ctx.clone().with_value("Params", params);
        self.call(&ctx, &task, message.input)
    }
}

impl fmt::Debug for TaskHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandlers")
            .field("tasks", &self.tasks())
            .finish()
    }
}
