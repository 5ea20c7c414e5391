//! Structured answer extraction from generated text.
//!
//! The generative model is not obliged to emit JSON. Extraction looks for the
//! span between the first `{` and the last `}` and parses it as a JSON object;
//! anything else degrades to the raw text.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{RagError, Result};

/// The answer returned to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    /// A JSON object found in the generated text.
    Structured(Map<String, Value>),
    /// The generated text, unchanged.
    Raw(String),
}

impl Answer {
    /// The structured fields, if any.
    pub fn as_structured(&self) -> Option<&Map<String, Value>> {
        match self {
            Answer::Structured(map) => Some(map),
            Answer::Raw(_) => None,
        }
    }

    /// The raw text, if no structure was found.
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Answer::Structured(_) => None,
            Answer::Raw(text) => Some(text),
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Structured(map) => write!(f, "{}", Value::Object(map.clone())),
            Answer::Raw(text) => f.write_str(text),
        }
    }
}

/// Extract the JSON object spanning the first `{` to the last `}`.
///
/// Returns `Ok(None)` when there are no braces or they are out of order.
///
/// # Errors
///
/// Returns [`RagError::MalformedAnswer`] when the braced span is not a valid
/// JSON object.
pub fn extract_json(raw: &str) -> Result<Option<Map<String, Value>>> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Ok(None);
    };
    if end <= start {
        return Ok(None);
    }

    let fragment = &raw[start..=end];
    match serde_json::from_str::<Value>(fragment) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(other) => Err(RagError::MalformedAnswer(format!("expected a JSON object, found {other}"))),
        Err(e) => Err(RagError::MalformedAnswer(format!("invalid JSON fragment: {e}"))),
    }
}

/// Turn generated text into an [`Answer`], falling back to the raw text.
///
/// Never fails: a malformed fragment is logged and the raw text returned.
pub fn parse_answer(raw: &str) -> Answer {
    match extract_json(raw) {
        Ok(Some(map)) => Answer::Structured(map),
        Ok(None) => {
            debug!("no JSON fragment in generated text");
            Answer::Raw(raw.to_string())
        }
        Err(e) => {
            warn!(error = %e, "falling back to raw answer text");
            Answer::Raw(raw.to_string())
        }
    }
}
