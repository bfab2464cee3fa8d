//! Fail state: terminal error with a configured kind and cause.

use crate::error::StateError;
use crate::execution::AttemptCounters;
use serde::Deserialize;
use serde_json::Value;
use stepmach_handler::Context;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct FailState {
    #[serde(skip)]
    pub name: String,
    pub comment: Option<String>,
    /// Error kind raised when this state is reached.
    pub error: Option<String>,
    pub cause: Option<String>,
}

impl FailState {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.error.is_none() {
            return Err("Error undefined".to_string());
        }
        Ok(())
    }

    pub(crate) async fn execute(
        &self,
        _ctx: &Context,
        _attempts: &mut AttemptCounters,
        _input: Value,
    ) -> Result<(Value, Option<String>), StateError> {
        let kind = self.error.clone().unwrap_or_default();
        let cause = self.cause.clone().unwrap_or_default();
        Err(StateError::new(kind, cause).in_state(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use crate::state::tests::{parse_state, run_state};
    use serde_json::json;

    #[test]
    fn test_validate_requires_error() {
        let state = parse_state("Boom", json!({"Type": "Fail"}));
        assert!(state.validate().is_err());

        let state = parse_state("Boom", json!({"Type": "Fail", "Error": "BoomError"}));
        assert!(state.validate().is_ok());
    }

    #[tokio::test]
    async fn test_raises_configured_error() {
        let state = parse_state(
            "Boom",
            json!({"Type": "Fail", "Error": "BoomError", "Cause": "it broke"}),
        );
        let err = run_state(&state, json!({})).await.unwrap_err();
        assert_eq!(err.kind, "BoomError");
        assert_eq!(err.cause, "it broke");
        assert_eq!(err.state.as_deref(), Some("Boom"));
    }
}
