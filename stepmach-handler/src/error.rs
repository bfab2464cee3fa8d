//! Handler error types.
//!
//! Retry and catch rules match errors by a nominal kind string, so the
//! kind is a first-class value here rather than a type name.

use thiserror::Error;

/// Wire-form error kinds produced by the handler layer.
pub mod kinds {
    /// Default kind for handler failures without a caller-defined kind.
    pub const TASK_FAILED: &str = "States.TaskFailed";
    /// A handler panicked and was recovered.
    pub const PANIC: &str = "PanicError";
    /// Event decoding or result encoding failed.
    pub const UNMARSHAL: &str = "UnmarshalError";
    /// Registry-level failures: unknown or duplicate task names.
    pub const TASK_ERROR: &str = "TaskError";
}

/// Errors from handler registration and invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// No handler registered under the requested name.
    #[error("no handler registered for {name:?} (known: {known:?})")]
    Unknown { name: String, known: Vec<String> },

    /// An in-band message arrived without a `Task` discriminator.
    #[error("message has no Task name (known: {known:?})")]
    MissingTask { known: Vec<String> },

    /// A handler is already registered under this name.
    #[error("handler already registered for {name:?}")]
    Duplicate { name: String },

    /// The interpolated input did not decode into the handler's event
    /// type.
    #[error("event decode failed: {0}")]
    Unmarshal(#[source] serde_json::Error),

    /// The handler's return value did not encode back to JSON.
    #[error("result encode failed: {0}")]
    Marshal(#[source] serde_json::Error),

    /// The handler panicked; the payload was recovered.
    #[error("handler panicked: {message}")]
    Panic { message: String },

    /// A failure returned by the handler itself, optionally carrying a
    /// caller-defined error kind used for `ErrorEquals` matching.
    #[error("{cause}")]
    Failure { kind: Option<String>, cause: String },
}

impl HandlerError {
    /// Builds a failure with an explicit error kind.
    pub fn failure(kind: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Failure {
            kind: Some(kind.into()),
            cause: cause.into(),
        }
    }

    /// Builds a failure with the default `States.TaskFailed` kind.
    pub fn msg(cause: impl Into<String>) -> Self {
        Self::Failure {
            kind: None,
            cause: cause.into(),
        }
    }

    /// The nominal error kind used for `ErrorEquals` matching.
    pub fn kind(&self) -> &str {
        match self {
            HandlerError::Unknown { .. }
            | HandlerError::MissingTask { .. }
            | HandlerError::Duplicate { .. } => kinds::TASK_ERROR,
            HandlerError::Unmarshal(_) | HandlerError::Marshal(_) => kinds::UNMARSHAL,
            HandlerError::Panic { .. } => kinds::PANIC,
            HandlerError::Failure { kind, .. } => kind.as_deref().unwrap_or(kinds::TASK_FAILED),
        }
    }

    /// Converts a panic payload recovered from a handler call.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        HandlerError::Panic { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(HandlerError::msg("boom").kind(), kinds::TASK_FAILED);
        assert_eq!(HandlerError::failure("TestError", "boom").kind(), "TestError");
        assert_eq!(
            HandlerError::Panic {
                message: "p".into()
            }
            .kind(),
            kinds::PANIC
        );
    }

    #[test]
    fn test_from_panic_payloads() {
        let err = HandlerError::from_panic(Box::new("static str"));
        assert!(err.to_string().contains("static str"));

        let err = HandlerError::from_panic(Box::new("owned".to_string()));
        assert!(err.to_string().contains("owned"));
    }
}
