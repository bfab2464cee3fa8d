//! # stepmach-machine
//!
//! An interpreter for the Amazon States Language: parse a declarative
//! JSON state machine, bind Task/Action states to in-process handlers,
//! and execute workflows to completion with path shaping, parameter
//! interpolation, retry with backoff, catch-to-state error handling,
//! choice evaluation, parallel branches, and waits.
//!
//! ```no_run
//! use serde_json::{json, Value};
//! use stepmach_machine::{Context, HandlerError, StateMachine};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut machine = StateMachine::from_json(r#"{
//!     "StartAt": "Greet",
//!     "States": {
//!         "Greet": {"Type": "Task", "Resource": "greet", "End": true}
//!     }
//! }"#)?;
//! machine.bind_task_fn("Greet", |_ctx: &Context, event: Value| {
//!     Ok::<_, HandlerError>(json!({"greeting": "hello", "event": event}))
//! })?;
//! machine.validate()?;
//!
//! let execution = machine.execute(json!({"name": "ada"})).await;
//! println!("{}", execution.output_json.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod definition;
pub mod engine;
pub mod error;
pub mod execution;
pub mod parser;
pub mod state;

pub use definition::StateMachine;
pub use engine::ExecutionConfig;
pub use error::{kinds, DefinitionError, StateError};
pub use execution::{AttemptCounters, Execution, ExecutionEvent, ExecutionStatus};
pub use state::{
    ActionState, Catcher, ChoiceRule, ChoiceState, FailState, ParallelState, PassState, Retrier,
    State, SucceedState, TaskState, WaitState,
};

// The handler and path surfaces hosts interact with, re-exported so a
// single dependency suffices.
pub use stepmach_handler::{ActionHandlers, Context, HandlerError, TaskHandlers};
pub use stepmach_path::{interpolate, Path, PathError};
