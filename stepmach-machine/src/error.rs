//! Error model.
//!
//! Definition-time failures (malformed JSON, unknown types, constraint
//! violations) are [`DefinitionError`]s and surface before any
//! execution. Runtime failures are [`StateError`]s carrying a nominal
//! wire-form *kind* matched by `ErrorEquals` rules; the kind is a
//! first-class string, never a Rust type name.

use serde::Serialize;
use stepmach_handler::HandlerError;
use thiserror::Error;

/// Wire-form error kinds used in `ErrorEquals` matching.
pub mod kinds {
    pub use stepmach_handler::kinds::{PANIC, TASK_ERROR, TASK_FAILED, UNMARSHAL};

    /// Matches every error kind.
    pub const ALL: &str = "States.ALL";
    pub const TIMEOUT: &str = "States.Timeout";
    pub const PERMISSIONS: &str = "States.Permissions";
    pub const NO_CHOICE_MATCHED: &str = "States.NoChoiceMatched";
    pub const PARAMETER_PATH_FAILURE: &str = "States.ParameterPathFailure";
    pub const RESULT_PATH_MATCH_FAILURE: &str = "States.ResultPathMatchFailure";
    pub const BRANCH_FAILED: &str = "States.BranchFailed";
    pub const INPUT_PATH_FAILURE: &str = "InputPathFailure";
    pub const OUTPUT_PATH_FAILURE: &str = "OutputPathFailure";
    pub const CANCELLED: &str = "Cancelled";
    pub const TRANSITION_LIMIT: &str = "TransitionLimitExceeded";

    /// The `States.*` kinds accepted in `ErrorEquals` lists.
    pub(crate) const KNOWN_STATES: &[&str] = &[
        ALL,
        TIMEOUT,
        TASK_FAILED,
        PERMISSIONS,
        NO_CHOICE_MATCHED,
        PARAMETER_PATH_FAILURE,
        RESULT_PATH_MATCH_FAILURE,
        BRANCH_FAILED,
    ];
}

/// Errors raised while parsing or validating a machine definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("invalid state machine JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown state type {state_type:?} for state {name:?}")]
    UnknownStateType { name: String, state_type: String },

    #[error("state {name:?} failed to decode: {reason}")]
    MalformedState { name: String, reason: String },

    #[error("{state_type}State({name}) Error: {reason}")]
    InvalidState {
        state_type: &'static str,
        name: String,
        reason: String,
    },

    #[error("StartAt {start_at:?} is not a defined state")]
    UnknownStartAt { start_at: String },

    #[error("state {name:?} transitions to undefined state {target:?}")]
    UnknownTarget { name: String, target: String },

    #[error("state {name:?} is not a {expected} state")]
    NotBindable { name: String, expected: &'static str },

    #[error("no state named {name:?}")]
    UnknownState { name: String },
}

/// A runtime execution error.
///
/// `kind` is the wire-form string matched by Retry/Catch; `cause` is
/// the human-readable message; `state` records the raising state once
/// the error leaves the state's pipeline.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{kind}: {cause}")]
pub struct StateError {
    pub kind: String,
    pub cause: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl StateError {
    pub fn new(kind: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            cause: cause.into(),
            state: None,
        }
    }

    pub fn timeout(cause: impl Into<String>) -> Self {
        Self::new(kinds::TIMEOUT, cause)
    }

    pub fn cancelled() -> Self {
        Self::new(kinds::CANCELLED, "execution cancelled")
    }

    /// Stamps the originating state name, keeping the kind intact.
    pub fn in_state(mut self, name: &str) -> Self {
        if self.state.is_none() {
            self.state = Some(name.to_string());
        }
        self
    }

    /// Returns true if this error matches an `ErrorEquals` list.
    /// `States.ALL` matches every kind, including `States.Timeout`.
    pub fn matches(&self, error_equals: &[String]) -> bool {
        error_equals
            .iter()
            .any(|kind| kind == kinds::ALL || *kind == self.kind)
    }
}

impl From<HandlerError> for StateError {
    fn from(err: HandlerError) -> Self {
        let kind = err.kind().to_string();
        Self::new(kind, err.to_string())
    }
}
