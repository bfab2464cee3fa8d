//! Choice state rule evaluation.
//!
//! Rules are boolean expressions over the input document:
//!
//! - `Variable` + a comparator (`StringEquals`, `NumericEquals`,
//!   `NumericLessThan`, `NumericGreaterThan`, `BooleanEquals`,
//!   `TimestampEquals`) compares the value at a path with a literal
//! - the `...Path` comparator variants read the expected value from a
//!   second path in the input
//! - `And`, `Or`, `Not` combine nested rules
//!
//! Rules are evaluated top to bottom; the first match selects its
//! `Next`. A rule whose `Variable` does not resolve simply does not
//! match.

use crate::error::{kinds, StateError};
use crate::execution::AttemptCounters;
use crate::state::io::{run_shaped, Shaping};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use stepmach_handler::Context;
use stepmach_path::Path;

/// A single choice rule, either a leaf comparison or a combinator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ChoiceRule {
    pub variable: Option<Path>,

    pub string_equals: Option<String>,
    pub string_equals_path: Option<Path>,
    pub numeric_equals: Option<f64>,
    pub numeric_equals_path: Option<Path>,
    pub numeric_less_than: Option<f64>,
    pub numeric_less_than_path: Option<Path>,
    pub numeric_greater_than: Option<f64>,
    pub numeric_greater_than_path: Option<Path>,
    pub boolean_equals: Option<bool>,
    pub boolean_equals_path: Option<Path>,
    pub timestamp_equals: Option<DateTime<Utc>>,
    pub timestamp_equals_path: Option<Path>,

    pub and: Option<Vec<ChoiceRule>>,
    pub or: Option<Vec<ChoiceRule>>,
    pub not: Option<Box<ChoiceRule>>,

    /// Transition target; required on top-level rules, forbidden on
    /// nested ones.
    pub next: Option<String>,
}

impl ChoiceRule {
    /// Evaluates the rule against the input document.
    pub fn evaluate(&self, input: &Value) -> bool {
        if let Some(rules) = &self.and {
            return rules.iter().all(|rule| rule.evaluate(input));
        }
        if let Some(rules) = &self.or {
            return rules.iter().any(|rule| rule.evaluate(input));
        }
        if let Some(rule) = &self.not {
            return !rule.evaluate(input);
        }

        let Some(variable) = &self.variable else {
            return false;
        };
        let Ok(value) = variable.get(input) else {
            return false;
        };

        if let Some(expected) = &self.string_equals {
            return value.as_str() == Some(expected.as_str());
        }
        if let Some(path) = &self.string_equals_path {
            return match path.get(input) {
                Ok(Value::String(expected)) => value.as_str() == Some(expected.as_str()),
                _ => false,
            };
        }
        if let Some(expected) = self.numeric_equals {
            return numbers_equal(&value, expected);
        }
        if let Some(path) = &self.numeric_equals_path {
            return resolve_number(path, input)
                .map(|expected| numbers_equal(&value, expected))
                .unwrap_or(false);
        }
        if let Some(expected) = self.numeric_less_than {
            return value.as_f64().map(|v| v < expected).unwrap_or(false);
        }
        if let Some(path) = &self.numeric_less_than_path {
            return resolve_number(path, input)
                .zip(value.as_f64())
                .map(|(expected, v)| v < expected)
                .unwrap_or(false);
        }
        if let Some(expected) = self.numeric_greater_than {
            return value.as_f64().map(|v| v > expected).unwrap_or(false);
        }
        if let Some(path) = &self.numeric_greater_than_path {
            return resolve_number(path, input)
                .zip(value.as_f64())
                .map(|(expected, v)| v > expected)
                .unwrap_or(false);
        }
        if let Some(expected) = self.boolean_equals {
            return value.as_bool() == Some(expected);
        }
        if let Some(path) = &self.boolean_equals_path {
            return match path.get(input) {
                Ok(Value::Bool(expected)) => value.as_bool() == Some(expected),
                _ => false,
            };
        }
        if let Some(expected) = &self.timestamp_equals {
            return as_timestamp(&value) == Some(*expected);
        }
        if let Some(path) = &self.timestamp_equals_path {
            return match path.get(input).ok().as_ref().and_then(as_timestamp) {
                Some(expected) => as_timestamp(&value) == Some(expected),
                None => false,
            };
        }

        false
    }

    pub(crate) fn validate(&self, top_level: bool) -> Result<(), String> {
        if top_level && self.next.is_none() {
            return Err("choice rule missing Next".to_string());
        }
        if !top_level && self.next.is_some() {
            return Err("nested choice rule must not define Next".to_string());
        }

        let combinators = [
            self.and.is_some(),
            self.or.is_some(),
            self.not.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if combinators > 1 {
            return Err("choice rule combines And/Or/Not".to_string());
        }

        if combinators == 1 {
            if self.variable.is_some() || self.comparator_count() > 0 {
                return Err("combinator rule must not define Variable or comparators".to_string());
            }
            for rule in self.and.iter().flatten().chain(self.or.iter().flatten()) {
                rule.validate(false)?;
            }
            if let Some(rule) = &self.not {
                rule.validate(false)?;
            }
            return Ok(());
        }

        if self.variable.is_none() {
            return Err("choice rule missing Variable".to_string());
        }
        match self.comparator_count() {
            0 => Err("choice rule missing comparator".to_string()),
            1 => Ok(()),
            _ => Err("choice rule defines multiple comparators".to_string()),
        }
    }

    fn comparator_count(&self) -> usize {
        [
            self.string_equals.is_some(),
            self.string_equals_path.is_some(),
            self.numeric_equals.is_some(),
            self.numeric_equals_path.is_some(),
            self.numeric_less_than.is_some(),
            self.numeric_less_than_path.is_some(),
            self.numeric_greater_than.is_some(),
            self.numeric_greater_than_path.is_some(),
            self.boolean_equals.is_some(),
            self.boolean_equals_path.is_some(),
            self.timestamp_equals.is_some(),
            self.timestamp_equals_path.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

fn numbers_equal(value: &Value, expected: f64) -> bool {
    value
        .as_f64()
        .map(|v| (v - expected).abs() < f64::EPSILON)
        .unwrap_or(false)
}

fn resolve_number(path: &Path, input: &Value) -> Option<f64> {
    path.get(input).ok().and_then(|v| v.as_f64())
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ChoiceState {
    #[serde(skip)]
    pub name: String,
    pub comment: Option<String>,
    pub input_path: Option<Path>,
    pub output_path: Option<Path>,
    #[serde(default)]
    pub choices: Vec<ChoiceRule>,
    pub default: Option<String>,
}

impl ChoiceState {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.choices.is_empty() {
            return Err("Choices must not be empty".to_string());
        }
        for rule in &self.choices {
            rule.validate(true)?;
        }
        Ok(())
    }

    pub(crate) async fn execute(
        &self,
        ctx: &Context,
        attempts: &mut AttemptCounters,
        input: Value,
    ) -> Result<(Value, Option<String>), StateError> {
        let shaping = Shaping {
            input_path: self.input_path.as_ref(),
            output_path: self.output_path.as_ref(),
            result_path: None,
            parameters: None,
        };
        run_shaped(
            &self.name,
            shaping,
            &[],
            &[],
            ctx,
            attempts,
            input,
            move |doc| async move {
                for rule in &self.choices {
                    if rule.evaluate(&doc) {
                        tracing::debug!(state = %self.name, next = ?rule.next, "choice matched");
                        return Ok((doc, rule.next.clone()));
                    }
                }
                match &self.default {
                    Some(default) => Ok((doc, Some(default.clone()))),
                    None => Err(StateError::new(
                        kinds::NO_CHOICE_MATCHED,
                        "no choice rule matched and no Default is set",
                    )),
                }
            },
        )
        .await
    }
}
