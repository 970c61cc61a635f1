use serde_json::{Map, Value};

use super::ModelSchema;
use crate::models::application::{RatingResult, MAX_DETAIL_ITEMS};
use crate::models::resume::{StructuredJobDescription, StructuredResume};

const RESUME_KEYS: &[&str] = &["name", "summary", "skills", "experience", "education"];
const RESUME_LISTS: &[&str] = &["skills", "experience", "education"];

const JD_KEYS: &[&str] = &[
    "job_title",
    "required_skills",
    "preferred_skills",
    "required_experience_years",
    "required_education",
    "key_responsibilities",
];
const JD_LISTS: &[&str] = &["required_skills", "preferred_skills", "key_responsibilities"];

const RATING_KEYS: &[&str] = &["rating", "summary", "fits", "lacks"];

fn into_object(value: Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, got {}", kind_of(&other))),
    }
}

fn require_keys(map: &Map<String, Value>, keys: &[&str]) -> Result<(), String> {
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| !map.contains_key(*k))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing keys: {}", missing.join(", ")))
    }
}

/// Models often emit `null` for an empty list.
fn null_lists_to_empty(map: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        if let Some(slot) = map.get_mut(*key) {
            if slot.is_null() {
                *slot = Value::Array(vec![]);
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Resume
// ────────────────────────────────────────────────────────────────────────────

impl ModelSchema for StructuredResume {
    fn from_value(value: Value) -> Result<Self, String> {
        let mut map = into_object(value)?;
        require_keys(&map, RESUME_KEYS)?;
        if !map.contains_key("contact") && !map.contains_key("contact_info") {
            return Err("missing keys: contact".to_string());
        }
        null_lists_to_empty(&mut map, RESUME_LISTS);

        serde_json::from_value(Value::Object(map)).map_err(|e| format!("resume: {e}"))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Job description
// ────────────────────────────────────────────────────────────────────────────

impl ModelSchema for StructuredJobDescription {
    fn from_value(value: Value) -> Result<Self, String> {
        let mut map = into_object(value)?;
        require_keys(&map, JD_KEYS)?;
        null_lists_to_empty(&mut map, JD_LISTS);

        // "5+" or 5.5 years are common; keep the whole-year part.
        if let Some(years) = map.get_mut("required_experience_years") {
            let coerced = match coerce_number(years) {
                Some(n) if n >= 0.0 => Value::from(n as u32),
                _ => Value::Null,
            };
            *years = coerced;
        }

        serde_json::from_value(Value::Object(map)).map_err(|e| format!("job description: {e}"))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rating
// ────────────────────────────────────────────────────────────────────────────

impl ModelSchema for RatingResult {
    fn from_value(value: Value) -> Result<Self, String> {
        let map = into_object(value)?;
        require_keys(&map, RATING_KEYS)?;

        let rating = coerce_rating(&map["rating"])?;
        let summary = match &map["summary"] {
            Value::String(s) => s.clone(),
            other => return Err(format!("summary must be a string, got {}", kind_of(other))),
        };
        let fits = string_list(&map["fits"], "fits")?;
        let lacks = string_list(&map["lacks"], "lacks")?;

        Ok(RatingResult {
            rating,
            summary,
            fits,
            lacks,
        })
    }
}

/// Integer, float (truncated) or numeric string, clamped to 0–100.
fn coerce_rating(value: &Value) -> Result<u8, String> {
    let n = coerce_number(value)
        .ok_or_else(|| format!("rating must be numeric, got {}", kind_of(value)))?;
    Ok(n.trunc().clamp(0.0, 100.0) as u8)
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_end_matches('+')
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite()),
        _ => None,
    }
}

fn string_list(value: &Value, field: &str) -> Result<Vec<String>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("{field} must be a list, got {}", kind_of(value)))?;

    items
        .iter()
        .take(MAX_DETAIL_ITEMS)
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(format!(
                "{field} entries must be strings, got {}",
                kind_of(other)
            )),
        })
        .collect()
}
