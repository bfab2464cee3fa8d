//! Execution context.
//!
//! A [`Context`] carries the capabilities every handler and state can
//! rely on: cooperative cancellation, an optional deadline, and a small
//! key/value map (used to hand the raw `Parameters` object to task
//! handlers under the `"Params"` key).

use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation, deadline, and key/value carry for one execution.
///
/// Contexts are cheap to clone; a clone shares the cancellation token
/// of its source.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    values: HashMap<String, Value>,
}

impl Context {
    /// Creates an empty root context.
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a child context. Cancelling the parent cancels the
    /// child; cancelling the child leaves the parent untouched.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            values: self.values.clone(),
        }
    }

    /// Returns a context whose deadline is at most `timeout` from now.
    /// An earlier existing deadline is kept.
    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Returns a context with `value` stored under `key`.
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Looks up a carried value.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Requests cancellation of this context and its children.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when cancellation is requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Returns the underlying cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_carry() {
        let ctx = Context::background().with_value("Params", json!({"a": 1}));
        assert_eq!(ctx.value("Params"), Some(&json!({"a": 1})));
        assert_eq!(ctx.value("Other"), None);
    }

    #[test]
    fn test_child_cancellation_is_one_way() {
        let parent = Context::background();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let child2 = parent.child();
        parent.cancel();
        assert!(child2.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_keeps_earliest() {
        let ctx = Context::background()
            .with_deadline(Duration::from_secs(5))
            .with_deadline(Duration::from_secs(60));
        let deadline = ctx.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_secs(5));
    }
}
