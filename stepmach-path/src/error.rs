//! Path and interpolation error types.

use thiserror::Error;

/// Errors from path compilation, document access, and interpolation.
#[derive(Debug, Clone, Error)]
pub enum PathError {
    #[error("invalid path {path:?}: {reason}")]
    Syntax { path: String, reason: String },

    #[error("path {path:?} not found in document")]
    NotFound { path: String },

    #[error("cannot set {path:?}: {reason}")]
    Set { path: String, reason: String },

    #[error("unbalanced template braces in {template:?}")]
    UnbalancedTemplate { template: String },

    #[error("value for template key {key:?} must be a string")]
    TemplateNotString { key: String },
}
