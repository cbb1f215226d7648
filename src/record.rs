//! Structured-record helpers.
//!
//! Persisted objects are plain `serde_json::Value` trees. Before any decode is
//! attempted, [`check_json`] verifies that the required keys exist and hold
//! values of the expected kind, so decoders can index without guessing.

use crate::error::{KnnError, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Object,
    Array,
    Number,
    String,
}

impl JsonKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            JsonKind::Object => value.is_object(),
            JsonKind::Array => value.is_array(),
            JsonKind::Number => value.is_number(),
            JsonKind::String => value.is_string(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            JsonKind::Object => "object",
            JsonKind::Array => "array",
            JsonKind::Number => "number",
            JsonKind::String => "string",
        }
    }
}

/// Validates that `value` is an object holding every `(key, kind)` pair.
pub fn check_json(value: &Value, required: &[(&str, JsonKind)]) -> Result<()> {
    let object = value
        .as_object()
        .ok_or_else(|| KnnError::Schema("expected an object".to_string()))?;

    for (key, kind) in required {
        match object.get(*key) {
            None => return Err(KnnError::Schema(format!("missing key '{}'", key))),
            Some(v) if !kind.matches(v) => {
                return Err(KnnError::Schema(format!(
                    "key '{}' should be of type {}",
                    key,
                    kind.name()
                )));
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Reads a non-negative integer field that `check_json` already typed as a number.
pub(crate) fn as_index(value: &Value, key: &str) -> Result<usize> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| KnnError::Schema(format!("key '{}' should be a non-negative integer", key)))
}

/// Reads an array of numbers into a vector of `f64`.
pub(crate) fn as_f64_vec(value: &Value, what: &str) -> Result<Vec<f64>> {
    let items = value
        .as_array()
        .ok_or_else(|| KnnError::Schema(format!("{} should be an array", what)))?;

    items
        .iter()
        .map(|item| {
            item.as_f64()
                .ok_or_else(|| KnnError::Schema(format!("{} should only hold numbers", what)))
        })
        .collect()
}
