//! Compiled JSONPath queries.
//!
//! A path is an initial `$` followed by zero or more segments. Segments
//! are dot access (`.name`, identifiers may contain `_`, `-`, and `:`)
//! or bracket indexing (`[3]`). The bare `$` is the identity path.
//!
//! Examples:
//! - `$` - the whole document
//! - `$.a.b` - nested object access
//! - `$.items[0].id` - array indexing

use crate::error::PathError;
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A single compiled path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object key access (`.name`).
    Key(String),
    /// Array index access (`[3]`).
    Index(usize),
}

/// A compiled JSONPath query rooted at `$`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<Segment>,
    raw: String,
}

impl Path {
    /// Returns the identity path `$`.
    pub fn identity() -> Self {
        Self {
            segments: Vec::new(),
            raw: "$".to_string(),
        }
    }

    /// Returns true if this is the identity path.
    pub fn is_identity(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the compiled segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the sub-document at this path.
    ///
    /// Object keys must exist and array indices must be in range,
    /// otherwise the lookup fails with [`PathError::NotFound`]. The
    /// identity path returns the document unchanged.
    pub fn get(&self, doc: &Value) -> Result<Value, PathError> {
        let mut current = doc;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => {
                    map.get(key).ok_or_else(|| self.not_found())?
                }
                (Segment::Index(index), Value::Array(items)) => {
                    items.get(*index).ok_or_else(|| self.not_found())?
                }
                _ => return Err(self.not_found()),
            };
        }
        Ok(current.clone())
    }

    /// Returns a new document with `value` written at this path.
    ///
    /// Writing at the identity path shallow-merges when both sides are
    /// objects (new keys win) and replaces otherwise. Descending
    /// creates empty objects for missing intermediate keys; a
    /// non-object at an intermediate position fails. At the final
    /// segment the same merge-or-overwrite rule applies. Arrays are
    /// never auto-created: index segments require an existing in-range
    /// array.
    pub fn set(&self, doc: &Value, value: Value) -> Result<Value, PathError> {
        if self.segments.is_empty() {
            return Ok(merge(doc, value));
        }
        let mut root = doc.clone();
        self.set_into(&mut root, 0, value)?;
        Ok(root)
    }

    fn set_into(&self, current: &mut Value, depth: usize, value: Value) -> Result<(), PathError> {
        let last = depth + 1 == self.segments.len();
        match &self.segments[depth] {
            Segment::Key(key) => {
                let map = match current {
                    Value::Object(map) => map,
                    other => {
                        return Err(self.set_error(format!(
                            "cannot descend into {} at key {:?}",
                            type_name(other),
                            key
                        )))
                    }
                };
                if last {
                    let existing = map.get(key).unwrap_or(&Value::Null);
                    let merged = merge(existing, value);
                    map.insert(key.clone(), merged);
                    return Ok(());
                }
                let slot = map.entry(key.clone()).or_insert_with(|| Value::Object(Map::new()));
                self.set_into(slot, depth + 1, value)
            }
            Segment::Index(index) => {
                let items = match current {
                    Value::Array(items) => items,
                    other => {
                        return Err(self.set_error(format!(
                            "cannot index into {} at [{}]",
                            type_name(other),
                            index
                        )))
                    }
                };
                let slot = items
                    .get_mut(*index)
                    .ok_or_else(|| self.set_error(format!("index {} out of range", index)))?;
                if last {
                    *slot = merge(slot, value);
                    return Ok(());
                }
                self.set_into(slot, depth + 1, value)
            }
        }
    }

    fn not_found(&self) -> PathError {
        PathError::NotFound {
            path: self.raw.clone(),
        }
    }

    fn set_error(&self, reason: String) -> PathError {
        PathError::Set {
            path: self.raw.clone(),
            reason,
        }
    }
}

/// Shallow-merges `value` over `base` when both are objects; returns
/// `value` otherwise.
fn merge(base: &Value, value: Value) -> Value {
    match (base, value) {
        (Value::Object(base), Value::Object(new)) => {
            let mut out = base.clone();
            for (key, item) in new {
                out.insert(key, item);
            }
            Value::Object(out)
        }
        (_, value) => value,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, PathError> {
        let trimmed = s.trim();
        let segments = Parser::new(trimmed).parse()?;
        Ok(Self {
            segments,
            raw: trimmed.to_string(),
        })
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Cursor parser for the path grammar.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<Vec<Segment>, PathError> {
        if self.peek() != Some('$') {
            return Err(self.error("path must start with '$'"));
        }
        self.pos += 1;

        let mut segments = Vec::new();
        while let Some(c) = self.peek() {
            match c {
                '.' => {
                    self.pos += 1;
                    segments.push(Segment::Key(self.parse_ident()?));
                }
                '[' => {
                    self.pos += 1;
                    segments.push(Segment::Index(self.parse_index()?));
                    if self.peek() != Some(']') {
                        return Err(self.error("expected ']'"));
                    }
                    self.pos += 1;
                }
                _ => return Err(self.error(&format!("unexpected character {:?}", c))),
            }
        }
        Ok(segments)
    }

    fn parse_ident(&mut self) -> Result<String, PathError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.pos += 1,
            _ => return Err(self.error("expected identifier")),
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':') {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_index(&mut self) -> Result<usize, PathError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let digits = &self.input[start..self.pos];
        digits
            .parse()
            .map_err(|_| self.error("expected array index"))
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn error(&self, reason: &str) -> PathError {
        PathError::Syntax {
            path: self.input.to_string(),
            reason: format!("{} at position {}", reason, self.pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> Path {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_identity() {
        let p = path("$");
        assert!(p.is_identity());
        assert_eq!(p.to_string(), "$");
    }

    #[test]
    fn test_parse_segments() {
        let p = path("$.a.b[2].c");
        assert_eq!(
            p.segments(),
            &[
                Segment::Key("a".to_string()),
                Segment::Key("b".to_string()),
                Segment::Index(2),
                Segment::Key("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_extended_identifiers() {
        let p = path("$.under_score.dash-dash.colon:colon");
        assert_eq!(p.segments().len(), 3);
    }

    #[test]
    fn test_parse_invalid() {
        assert!("a.b".parse::<Path>().is_err());
        assert!("$.".parse::<Path>().is_err());
        assert!("$.a[".parse::<Path>().is_err());
        assert!("$.a[x]".parse::<Path>().is_err());
        assert!("$.a[1".parse::<Path>().is_err());
        assert!("$.1a".parse::<Path>().is_err());
        assert!("$ .a".parse::<Path>().is_err());
    }

    #[test]
    fn test_get_identity() {
        let doc = json!({"a": 1});
        assert_eq!(path("$").get(&doc).unwrap(), doc);
    }

    #[test]
    fn test_get_nested() {
        let doc = json!({"a": {"b": {"c": 42}}});
        assert_eq!(path("$.a.b.c").get(&doc).unwrap(), json!(42));
        assert_eq!(path("$.a.b").get(&doc).unwrap(), json!({"c": 42}));
    }

    #[test]
    fn test_get_index() {
        let doc = json!({"fruits": ["apple", "banana"]});
        assert_eq!(path("$.fruits[1]").get(&doc).unwrap(), json!("banana"));
    }

    #[test]
    fn test_get_missing() {
        let doc = json!({"a": "b"});
        assert!(matches!(
            path("$.a.b").get(&doc),
            Err(PathError::NotFound { .. })
        ));
        assert!(matches!(
            path("$.x").get(&doc),
            Err(PathError::NotFound { .. })
        ));
        assert!(matches!(
            path("$.a[0]").get(&doc),
            Err(PathError::NotFound { .. })
        ));
    }

    #[test]
    fn test_set_identity_merges_objects() {
        let doc = json!({"a": 1, "b": 2});
        let out = path("$").set(&doc, json!({"b": 3, "c": 4})).unwrap();
        assert_eq!(out, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_set_identity_overwrites_scalars() {
        let doc = json!({"a": 1});
        assert_eq!(path("$").set(&doc, json!("x")).unwrap(), json!("x"));
    }

    #[test]
    fn test_set_overwrites_leaf() {
        let doc = json!({"a": "c"});
        let out = path("$.a").set(&doc, json!("b")).unwrap();
        assert_eq!(out, json!({"a": "b"}));
    }

    #[test]
    fn test_set_merges_objects_at_leaf() {
        let doc = json!({"rainbow": {"red": "#ff0000", "blue": ""}});
        let out = path("$.rainbow")
            .set(&doc, json!({"blue": "#0000ff"}))
            .unwrap();
        assert_eq!(
            out,
            json!({"rainbow": {"red": "#ff0000", "blue": "#0000ff"}})
        );
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let doc = json!({});
        let out = path("$.a.b.c").set(&doc, json!(1)).unwrap();
        assert_eq!(out, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_set_through_non_object_fails() {
        let doc = json!({"a": "scalar"});
        assert!(matches!(
            path("$.a.b").set(&doc, json!(1)),
            Err(PathError::Set { .. })
        ));
    }

    #[test]
    fn test_set_into_array_element() {
        let doc = json!({"items": [{"id": 1}, {"id": 2}]});
        let out = path("$.items[1].id").set(&doc, json!(3)).unwrap();
        assert_eq!(out, json!({"items": [{"id": 1}, {"id": 3}]}));
    }

    #[test]
    fn test_set_never_creates_arrays() {
        let doc = json!({});
        assert!(matches!(
            path("$.a[0]").set(&doc, json!(1)),
            Err(PathError::Set { .. })
        ));
    }

    #[test]
    fn test_get_set_roundtrip_preserves_document() {
        let doc = json!({"a": {"b": {"c": 1}, "d": 2}, "e": [1, 2]});
        for raw in ["$", "$.a", "$.a.b"] {
            let p = path(raw);
            let sub = p.get(&doc).unwrap();
            assert_eq!(p.set(&doc, sub).unwrap(), doc, "roundtrip through {raw}");
        }
    }

    #[test]
    fn test_serde_roundtrip() {
        let p: Path = serde_json::from_value(json!("$.a[0].b")).unwrap();
        assert_eq!(p, path("$.a[0].b"));
        assert_eq!(serde_json::to_value(&p).unwrap(), json!("$.a[0].b"));
    }
}
