//! Response Validator: turns untrusted model text into a checked value.
//!
//! Two stages: [`parse`] locates and decodes the first JSON object in the
//! text, then a [`ModelSchema`] implementation checks and coerces it into the
//! target type. Both stages report failures as [`ValidationFailure`], which
//! always carries the raw model output for diagnostics.

use serde_json::Value;
use thiserror::Error;

pub mod schemas;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationFailure {
    #[error("model output contains no parseable JSON object")]
    ParseFailure { raw: String },

    #[error("model output failed schema check: {reason}")]
    SchemaInvalid { raw: String, reason: String },
}

impl ValidationFailure {
    pub fn raw(&self) -> &str {
        match self {
            ValidationFailure::ParseFailure { raw } => raw,
            ValidationFailure::SchemaInvalid { raw, .. } => raw,
        }
    }
}

/// A structure the model is asked to produce.
pub trait ModelSchema: Sized {
    /// Checks shape and applies best-effort coercion. The error is a
    /// human-readable reason.
    fn from_value(value: Value) -> Result<Self, String>;
}

/// Parses raw model text and validates it against `T`.
pub fn parse_as<T: ModelSchema>(raw: &str) -> Result<T, ValidationFailure> {
    let value = parse(raw)?;
    T::from_value(value).map_err(|reason| ValidationFailure::SchemaInvalid {
        raw: raw.to_string(),
        reason,
    })
}

/// Extracts the JSON object embedded in model output.
///
/// Tolerates code fences, leading prose and trailing prose. When the span from
/// the first `{` to the last `}` is not valid JSON (for example two separate
/// objects, or prose containing a stray `}`), the first complete JSON value
/// starting at the first `{` is used instead.
pub fn parse(raw: &str) -> Result<Value, ValidationFailure> {
    let text = strip_code_fences(raw);
    let failure = || ValidationFailure::ParseFailure {
        raw: raw.to_string(),
    };

    let first = text.find('{');
    let last = text.rfind('}');

    let candidate = match (first, last) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            let trimmed = text.trim();
            if trimmed.starts_with('{') && trimmed.ends_with('}') {
                trimmed
            } else {
                return Err(failure());
            }
        }
    };

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Ok(value);
    }

    let start = first.ok_or_else(failure)?;
    match serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()
    {
        Some(Ok(value)) => Ok(value),
        _ => Err(failure()),
    }
}

/// Removes every ``` marker together with a language tag directly after it.
fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
            .unwrap_or(rest.len());
        rest = &rest[tag_len..];
    }
    out.push_str(rest);
    out
}
