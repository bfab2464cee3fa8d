//! Succeed state: terminal passthrough.

use crate::error::StateError;
use crate::execution::AttemptCounters;
use crate::state::io::{run_shaped, Shaping};
use serde::Deserialize;
use serde_json::Value;
use stepmach_handler::Context;
use stepmach_path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct SucceedState {
    #[serde(skip)]
    pub name: String,
    pub comment: Option<String>,
    pub input_path: Option<Path>,
    pub output_path: Option<Path>,
}

impl SucceedState {
    pub(crate) fn validate(&self) -> Result<(), String> {
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
            move |doc| async move { Ok((doc, None)) },
        )
        .await
    }
}
