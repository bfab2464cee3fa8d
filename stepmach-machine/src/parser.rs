//! Polymorphic state decoding.
//!
//! States are heterogeneous records discriminated by their `"Type"`
//! field, so decoding is two-pass: extract the tag, then decode the
//! remaining fields into the matching record. Unknown fields inside a
//! state are rejected; unknown top-level definition fields are ignored.

use crate::definition::StateMachine;
use crate::engine::ExecutionConfig;
use crate::error::DefinitionError;
use crate::state::State;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDefinition {
    start_at: String,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(default)]
    states: Map<String, Value>,
}

/// Decodes a full machine definition from a JSON value.
pub(crate) fn machine_from_value(value: Value) -> Result<StateMachine, DefinitionError> {
    let raw: RawDefinition = serde_json::from_value(value)?;
    let mut states = HashMap::with_capacity(raw.states.len());
    for (name, value) in raw.states {
        let state = state_from_value(&name, value)?;
        states.insert(name, state);
    }
    Ok(StateMachine {
        start_at: raw.start_at,
        comment: raw.comment,
        timeout_seconds: raw.timeout_seconds,
        states,
        config: ExecutionConfig::default(),
    })
}

/// Decodes a single state record, discriminating on `"Type"`.
pub(crate) fn state_from_value(name: &str, value: Value) -> Result<State, DefinitionError> {
    let Value::Object(mut fields) = value else {
        return Err(DefinitionError::MalformedState {
            name: name.to_string(),
            reason: "state must be a JSON object".to_string(),
        });
    };
    let state_type = match fields.remove("Type") {
        Some(Value::String(state_type)) => state_type,
        _ => {
            return Err(DefinitionError::MalformedState {
                name: name.to_string(),
                reason: "missing Type".to_string(),
            })
        }
    };

    let mut state = match state_type.as_str() {
        "Pass" => State::Pass(decode(name, fields)?),
        "Task" => State::Task(decode(name, fields)?),
        "Action" => State::Action(decode(name, fields)?),
        "Choice" => State::Choice(decode(name, fields)?),
        "Wait" => State::Wait(decode(name, fields)?),
        "Succeed" => State::Succeed(decode(name, fields)?),
        "Fail" => State::Fail(decode(name, fields)?),
        "Parallel" => State::Parallel(decode(name, fields)?),
        "TaskFn" => {
            // Sugar for a Task whose name travels in-band, letting a
            // single worker handler multiplex on the Task field.
            let mut task: crate::state::TaskState = decode(name, fields)?;
            task.parameters = Some(expand_task_fn(name, task.parameters.take()));
            State::Task(task)
        }
        other => {
            return Err(DefinitionError::UnknownStateType {
                name: name.to_string(),
                state_type: other.to_string(),
            })
        }
    };
    state.set_name(name);
    Ok(state)
}

fn decode<T: DeserializeOwned>(name: &str, fields: Map<String, Value>) -> Result<T, DefinitionError> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| DefinitionError::MalformedState {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn expand_task_fn(name: &str, parameters: Option<Value>) -> Value {
    let mut wrapped = Map::new();
    wrapped.insert("Task".to_string(), Value::String(name.to_string()));
    wrapped.insert("Input.$".to_string(), Value::String("$".to_string()));
    if let Some(params @ Value::Object(_)) = parameters {
        wrapped.insert("Parameters".to_string(), params);
    }
    Value::Object(wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_discriminates_all_types() {
        for (raw, expected) in [
            (json!({"Type": "Pass", "End": true}), "Pass"),
            (json!({"Type": "Task", "Resource": "r", "End": true}), "Task"),
            (json!({"Type": "Action", "ActionName": "a", "End": true}), "Action"),
            (json!({"Type": "Choice", "Choices": []}), "Choice"),
            (json!({"Type": "Wait", "Seconds": 1, "End": true}), "Wait"),
            (json!({"Type": "Succeed"}), "Succeed"),
            (json!({"Type": "Fail", "Error": "E"}), "Fail"),
            (json!({"Type": "Parallel", "Branches": [], "End": true}), "Parallel"),
        ] {
            let state = state_from_value("S", raw).unwrap();
            assert_eq!(state.state_type(), expected);
            assert_eq!(state.name(), "S");
        }
    }

    #[test]
    fn test_unknown_type() {
        let err = state_from_value("S", json!({"Type": "Mystery"})).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownStateType { .. }));
    }

    #[test]
    fn test_missing_type() {
        let err = state_from_value("S", json!({"Next": "X"})).unwrap_err();
        assert!(matches!(err, DefinitionError::MalformedState { .. }));
    }

    #[test]
    fn test_unknown_state_field_rejected() {
        let err = state_from_value("S", json!({"Type": "Pass", "Nope": 1})).unwrap_err();
        match err {
            DefinitionError::MalformedState { name, reason } => {
                assert_eq!(name, "S");
                assert!(reason.contains("Nope"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_task_fn_expansion_without_parameters() {
        let state =
            state_from_value("Worker", json!({"Type": "TaskFn", "Resource": "r", "End": true}))
                .unwrap();
        let State::Task(task) = state else {
            panic!("TaskFn must decode to Task");
        };
        assert_eq!(
            task.parameters,
            Some(json!({"Task": "Worker", "Input.$": "$"}))
        );
    }

    #[test]
    fn test_task_fn_expansion_wraps_parameters() {
        let state = state_from_value(
            "Worker",
            json!({
                "Type": "TaskFn",
                "Resource": "r",
                "End": true,
                "Parameters": {"retries": 2},
            }),
        )
        .unwrap();
        let State::Task(task) = state else {
            panic!("TaskFn must decode to Task");
        };
        assert_eq!(
            task.parameters,
            Some(json!({
                "Task": "Worker",
                "Input.$": "$",
                "Parameters": {"retries": 2},
            }))
        );
    }

    #[test]
    fn test_unknown_top_level_fields_ignored() {
        let machine = machine_from_value(json!({
            "StartAt": "Done",
            "Version": "1.0",
            "FutureField": {"x": 1},
            "States": {"Done": {"Type": "Succeed"}},
        }))
        .unwrap();
        assert_eq!(machine.start_at, "Done");
        assert_eq!(machine.states.len(), 1);
    }

    #[test]
    fn test_missing_start_at_is_a_parse_error() {
        let err =
            machine_from_value(json!({"States": {"Done": {"Type": "Succeed"}}})).unwrap_err();
        assert!(matches!(err, DefinitionError::Json(_)));
    }
}
