//! # stepmach-handler
//!
//! Execution context and handler registries for stepmach.
//!
//! This crate provides:
//! - [`Context`]: cancellation, deadline, and key/value carry passed to
//!   every handler invocation
//! - [`TaskHandlers`] / [`ActionHandlers`]: registries binding task and
//!   action names to in-process callables behind JSON-in/JSON-out
//!   thunks
//! - [`HandlerError`]: the handler-layer error taxonomy, including
//!   panic recovery

pub mod action;
pub mod context;
pub mod error;
pub mod task;

pub use action::{ActionFn, ActionHandlers};
pub use context::Context;
pub use error::{kinds, HandlerError};
pub use task::{RawMessage, TaskFn, TaskHandlers};
