//! Action handler registry.
//!
//! Action handlers take the action name and a key/value parameter map
//! instead of a typed event: `(ctx, action_name, params) -> result`.
//! A single handler is typically registered per action name and
//! multiplexes internally.

use crate::context::Context;
use crate::error::HandlerError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type-erased action handler.
pub type ActionFn =
    dyn Fn(&Context, &str, &Map<String, Value>) -> Result<Value, HandlerError> + Send + Sync;

/// Registry mapping action names to handlers.
#[derive(Default, Clone)]
pub struct ActionHandlers {
    handlers: HashMap<String, Arc<ActionFn>>,
}

impl ActionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action handler under `name`.
    pub fn register<R, F>(&mut self, name: impl Into<String>, handler: F) -> Result<(), HandlerError>
    where
        R: Serialize + 'static,
        F: Fn(&Context, &str, &Map<String, Value>) -> Result<R, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(HandlerError::Duplicate { name });
        }
        let thunk = move |ctx: &Context, action: &str, params: &Map<String, Value>| {
            let result = handler(ctx, action, params)?;
            serde_json::to_value(result).map_err(HandlerError::Marshal)
        };
        self.handlers.insert(name, Arc::new(thunk));
        Ok(())
    }

    /// Returns true if a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Returns the registered action names, sorted.
    pub fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the handler registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<ActionFn>> {
        self.handlers.get(name).cloned()
    }

    /// Invokes an action handler by name.
    pub fn call(
        &self,
        ctx: &Context,
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, HandlerError> {
        let handler = self.handlers.get(name).ok_or_else(|| HandlerError::Unknown {
            name: name.to_string(),
            known: self.actions(),
        })?;
        handler(ctx, name, params)
    }
}

impl fmt::Debug for ActionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandlers")
            .field("actions", &self.actions())
            .finish()
    }
}
