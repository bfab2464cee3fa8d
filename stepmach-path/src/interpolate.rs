//! Parameter interpolation.
//!
//! `Parameters` objects are JSON templates applied to a state's input
//! before the state's own logic runs. Two forms are supported:
//!
//! - keys ending in `.$` hold a JSONPath string; the resolved value
//!   replaces the string and the key loses the suffix
//! - inside a `.$` string, `{{<path>}}` templates resolve
//!   innermost-first, so templates may nest:
//!   `{{$.map.{{$.key}}}}` first resolves `$.key`, then the outer path
//!
//! A template spanning the whole string keeps the resolved value's
//! type; mixed text concatenates renderings.

use crate::error::PathError;
use crate::path::Path;
use serde_json::{Map, Value};

/// Resolves all `.$` keys and templates in `params` against `input`.
///
/// Objects and arrays are walked recursively; all other leaves pass
/// through unchanged.
pub fn interpolate(params: &Value, input: &Value) -> Result<Value, PathError> {
    match params {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                if let Some(stripped) = key.strip_suffix(".$") {
                    let Value::String(template) = value else {
                        return Err(PathError::TemplateNotString { key: key.clone() });
                    };
                    out.insert(stripped.to_string(), resolve(template, input)?);
                } else {
                    out.insert(key.clone(), interpolate(value, input)?);
                }
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let resolved = items
                .iter()
                .map(|item| interpolate(item, input))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolves a single `.$` template string against `input`.
pub fn resolve(template: &str, input: &Value) -> Result<Value, PathError> {
    if !template.contains("{{") && !template.contains("}}") {
        let path: Path = template.parse()?;
        return path.get(input);
    }

    let mut text = template.to_string();
    while let Some((open, close)) = innermost(&text)? {
        let path: Path = text[open + 2..close - 2].trim().parse()?;
        let value = path.get(input)?;
        if open == 0 && close == text.len() {
            // The template spans the whole string: keep the typed value.
            return Ok(value);
        }
        text.replace_range(open..close, &render(&value));
    }
    Ok(Value::String(text))
}

/// Finds the innermost `{{...}}` span, as byte offsets spanning the
/// delimiters. The innermost template is the one closed by the first
/// `}}`; its opener is the last `{{` before that.
fn innermost(text: &str) -> Result<Option<(usize, usize)>, PathError> {
    let Some(close) = text.find("}}") else {
        if text.contains("{{") {
            return Err(PathError::UnbalancedTemplate {
                template: text.to_string(),
            });
        }
        return Ok(None);
    };
    let Some(open) = text[..close].rfind("{{") else {
        return Err(PathError::UnbalancedTemplate {
            template: text.to_string(),
        });
    };
    Ok(Some((open, close + 2)))
}

/// Renders a resolved value for concatenation into template text.
/// Numbers use their natural textual form; containers render as
/// compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
