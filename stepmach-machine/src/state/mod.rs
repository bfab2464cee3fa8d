//! Typed state records.
//!
//! Storage is a discriminated union over the per-variant records; the
//! capability surface is `name` / `validate` / `execute`. States are
//! immutable during execution and carry no per-execution data; retry
//! counters live on the execution's
//! [`AttemptCounters`](crate::execution::AttemptCounters).

pub mod action;
pub mod choice;
pub mod fail;
pub(crate) mod io;
pub mod parallel;
pub mod pass;
pub mod retry;
pub mod succeed;
pub mod task;
pub mod wait;

pub use action::ActionState;
pub use choice::{ChoiceRule, ChoiceState};
pub use fail::FailState;
pub use parallel::ParallelState;
pub use pass::PassState;
pub use retry::{Catcher, Retrier};
pub use succeed::SucceedState;
pub use task::TaskState;
pub use wait::WaitState;

use crate::error::{DefinitionError, StateError};
use crate::execution::AttemptCounters;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use stepmach_handler::Context;

/// A bound handler callable; opaque in debug output.
pub(crate) struct Bound<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> Clone for Bound<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> fmt::Debug for Bound<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<handler>")
    }
}

/// A state in the machine, discriminated by its JSON `Type`.
#[derive(Debug, Clone)]
pub enum State {
    Pass(PassState),
    Task(TaskState),
    Action(ActionState),
    Choice(ChoiceState),
    Wait(WaitState),
    Succeed(SucceedState),
    Fail(FailState),
    Parallel(ParallelState),
}

impl State {
    /// The state's name, assigned from its `States` map key.
    pub fn name(&self) -> &str {
        match self {
            State::Pass(s) => &s.name,
            State::Task(s) => &s.name,
            State::Action(s) => &s.name,
            State::Choice(s) => &s.name,
            State::Wait(s) => &s.name,
            State::Succeed(s) => &s.name,
            State::Fail(s) => &s.name,
            State::Parallel(s) => &s.name,
        }
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        let slot = match self {
            State::Pass(s) => &mut s.name,
            State::Task(s) => &mut s.name,
            State::Action(s) => &mut s.name,
            State::Choice(s) => &mut s.name,
            State::Wait(s) => &mut s.name,
            State::Succeed(s) => &mut s.name,
            State::Fail(s) => &mut s.name,
            State::Parallel(s) => &mut s.name,
        };
        *slot = name.to_string();
    }

    /// The state's type name.
    pub fn state_type(&self) -> &'static str {
        match self {
            State::Pass(_) => "Pass",
            State::Task(_) => "Task",
            State::Action(_) => "Action",
            State::Choice(_) => "Choice",
            State::Wait(_) => "Wait",
            State::Succeed(_) => "Succeed",
            State::Fail(_) => "Fail",
            State::Parallel(_) => "Parallel",
        }
    }

    /// Checks the state's own constraints.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let checked = match self {
            State::Pass(s) => s.validate(),
            State::Task(s) => s.validate(),
            State::Action(s) => s.validate(),
            State::Choice(s) => s.validate(),
            State::Wait(s) => s.validate(),
            State::Succeed(s) => s.validate(),
            State::Fail(s) => s.validate(),
            State::Parallel(s) => s.validate(),
        };
        checked.map_err(|reason| DefinitionError::InvalidState {
            state_type: self.state_type(),
            name: self.name().to_string(),
            reason,
        })
    }

    /// All transition targets this state can name, for whole-graph
    /// reference checks.
    pub(crate) fn transition_targets(&self) -> Vec<&str> {
        let mut targets = Vec::new();
        fn push<'a>(targets: &mut Vec<&'a str>, next: &'a Option<String>) {
            if let Some(next) = next {
                targets.push(next.as_str());
            }
        }
        match self {
            State::Pass(s) => push(&mut targets, &s.next),
            State::Wait(s) => push(&mut targets, &s.next),
            State::Succeed(_) | State::Fail(_) => {}
            State::Task(s) => {
                push(&mut targets, &s.next);
                for catcher in &s.catch {
                    targets.push(catcher.next.as_str());
                }
            }
            State::Action(s) => {
                push(&mut targets, &s.next);
                for catcher in &s.catch {
                    targets.push(catcher.next.as_str());
                }
            }
            State::Parallel(s) => {
                push(&mut targets, &s.next);
                for catcher in &s.catch {
                    targets.push(catcher.next.as_str());
                }
            }
            State::Choice(s) => {
                for rule in &s.choices {
                    push(&mut targets, &rule.next);
                }
                push(&mut targets, &s.default);
            }
        }
        targets
    }

    /// Runs one visit of this state.
    ///
    /// Returns the output document and the transition target: `None`
    /// means terminal; the state's own name signals a retry re-entry.
    pub async fn execute(
        &self,
        ctx: &Context,
        attempts: &mut AttemptCounters,
        input: Value,
    ) -> Result<(Value, Option<String>), StateError> {
        match self {
            State::Pass(s) => s.execute(ctx, attempts, input).await,
            State::Task(s) => s.execute(ctx, attempts, input).await,
            State::Action(s) => s.execute(ctx, attempts, input).await,
            State::Choice(s) => s.execute(ctx, attempts, input).await,
            State::Wait(s) => s.execute(ctx, attempts, input).await,
            State::Succeed(s) => s.execute(ctx, attempts, input).await,
            State::Fail(s) => s.execute(ctx, attempts, input).await,
            State::Parallel(s) => s.execute(ctx, attempts, input).await,
        }
    }

    /// Binds a task handler. Panics if this is not a Task state; used
    /// by [`StateMachine`](crate::definition::StateMachine) binding,
    /// which checks first.
    pub(crate) fn bind_task(&mut self, handler: Arc<stepmach_handler::TaskFn>) {
        match self {
            State::Task(s) => s.bind(handler),
            other => panic!("cannot bind task handler to {} state", other.state_type()),
        }
    }

    /// Binds an action handler. Panics if this is not an Action state.
    pub(crate) fn bind_action(&mut self, handler: Arc<stepmach_handler::ActionFn>) {
        match self {
            State::Action(s) => s.bind(handler),
            other => panic!("cannot bind action handler to {} state", other.state_type()),
        }
    }
}

/// Resolves the transition of a completed state: `Next` if present,
/// `None` for `End`.
pub(crate) fn next_or_end(next: &Option<String>, _end: Option<bool>) -> Option<String> {
    next.clone()
}

/// Enforces that exactly one of `Next` or `End: true` is declared.
pub(crate) fn end_valid(next: &Option<String>, end: Option<bool>) -> Result<(), String> {
    match (next, end) {
        (Some(_), Some(true)) => Err("End and Next both defined".to_string()),
        (None, None | Some(false)) => Err("End and Next both undefined".to_string()),
        _ => Ok(()),
    }
}
