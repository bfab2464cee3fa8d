//! Pass state: shapes its input and optionally injects a fixed result.

use crate::error::{kinds, StateError};
use crate::execution::AttemptCounters;
use crate::state::io::{run_shaped, Shaping};
use crate::state::next_or_end;
use serde::Deserialize;
use serde_json::Value;
use stepmach_handler::Context;
use stepmach_path::{interpolate, Path};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct PassState {
    #[serde(skip)]
    pub name: String,
    pub comment: Option<String>,
    /// Fixed result document; `.$` keys inside it are interpolated
    /// against the narrowed input.
    pub result: Option<Value>,
    pub input_path: Option<Path>,
    pub output_path: Option<Path>,
    pub result_path: Option<Path>,
    pub parameters: Option<Value>,
    pub next: Option<String>,
    pub end: Option<bool>,
}

impl PassState {
    pub(crate) fn validate(&self) -> Result<(), String> {
        crate::state::end_valid(&self.next, self.end)
    }

    pub(crate) async fn execute(
        &self,
        ctx: &Context,
        attempts: &mut AttemptCounters,
        input: Value,
    ) -> Result<(Value, Option<String>), StateError> {
        let next = next_or_end(&self.next, self.end);
        let shaping = Shaping {
            input_path: self.input_path.as_ref(),
            output_path: self.output_path.as_ref(),
            result_path: self.result_path.as_ref(),
            parameters: self.parameters.as_ref(),
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
                let output = match &self.result {
                    Some(result) => interpolate(result, &doc)
                        .map_err(|e| StateError::new(kinds::PARAMETER_PATH_FAILURE, e.to_string()))?,
                    None => doc,
                };
                Ok((output, next))
            },
        )
        .await
    }
}
