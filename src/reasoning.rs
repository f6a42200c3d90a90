//! Reasoning collaborator boundary.
//!
//! Filter and generator nodes delegate judgement calls to an external
//! reasoning collaborator. Its output is non-deterministic in shape as
//! well as content, so everything that comes back is validated or coerced
//! before the engine consumes it.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

/// Boundary to the external reasoning collaborator.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Ask for structured output given a prompt and an input batch.
    async fn reason(&self, prompt: &str, input: &Value) -> Result<Value>;
}

/// Coerce a value into an array.
///
/// Accepts a real array, or an object whose keys are exactly the decimal
/// strings `"0".."n-1"` (a shape some collaborators return instead of an
/// array). Anything else is a hard error, not silently wrapped.
pub fn coerce_array(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => {
            let mut out = vec![Value::Null; map.len()];
            for (key, item) in map {
                // Only canonical decimal keys count; "00" or "+1" would parse
                // to the same index as "0"/"1" and silently overwrite it.
                let index: usize = key
                    .parse()
                    .ok()
                    .filter(|i: &usize| i.to_string() == *key)
                    .ok_or_else(|| {
                        Error::Reasoning(format!(
                            "Expected array-shaped output, found object key '{}'",
                            key
                        ))
                    })?;
                if index >= out.len() {
                    return Err(Error::Reasoning(format!(
                        "Object keys are not contiguous: index {} out of {} entries",
                        index,
                        map.len()
                    )));
                }
                out[index] = item.clone();
            }
            Ok(out)
        }
        other => Err(Error::Reasoning(format!(
            "Expected an array, found {}",
            type_name(other)
        ))),
    }
}

/// Validate a boolean mask of an exact length. A length mismatch or a
/// non-boolean entry is a hard error, never coerced.
pub fn boolean_mask(value: &Value, expected_len: usize) -> Result<Vec<bool>> {
    let items = coerce_array(value)?;
    if items.len() != expected_len {
        return Err(Error::Reasoning(format!(
            "Mask length {} does not match batch length {}",
            items.len(),
            expected_len
        )));
    }
    items
        .iter()
        .map(|v| {
            v.as_bool().ok_or_else(|| {
                Error::Reasoning(format!("Mask entry is not a boolean: {}", v))
            })
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
