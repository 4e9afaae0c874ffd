use super::schema::{ClassificationResult, Field};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Field name to raw string value, as decoded from the model output
pub type RawFields = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("Field {0:?} has a nested value")]
    NestedValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(Field),
    #[error("Empty value for field: {0}")]
    EmptyField(Field),
}

impl ValidationError {
    pub fn field(&self) -> Field {
        match self {
            ValidationError::MissingField(f) | ValidationError::EmptyField(f) => *f,
        }
    }
}

fn opening_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```[A-Za-z0-9_+-]*[ \t]*\r?\n?").expect("static regex"))
}

fn closing_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r?\n?```\s*$").expect("static regex"))
}

/// Remove a surrounding markdown code fence.
///
/// Text not starting with a fence is only trimmed.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let body = match opening_fence().find(trimmed) {
        Some(m) => &trimmed[m.end()..],
        None => trimmed,
    };
    let body = match closing_fence().find(body) {
        Some(m) => &body[..m.start()],
        None => body,
    };
    body.trim()
}

/// Decode model output into raw fields.
///
/// Strings are kept, numbers and booleans are stringified, `null` becomes an
/// empty string. Arrays and objects as values are rejected.
pub fn parse_response(raw: &str) -> Result<RawFields, ParseError> {
    let stripped = strip_fences(raw);
    debug!("Parsing response ({} chars)", stripped.len());

    let value: Value = serde_json::from_str(stripped).map_err(|e| {
        ParseError::InvalidJson(format!(
            "{}: {}",
            e,
            stripped.chars().take(100).collect::<String>()
        ))
    })?;

    let object = match value {
        Value::Object(map) => map,
        Value::Array(_) => return Err(ParseError::NotAnObject("array")),
        Value::String(_) => return Err(ParseError::NotAnObject("string")),
        Value::Number(_) => return Err(ParseError::NotAnObject("number")),
        Value::Bool(_) => return Err(ParseError::NotAnObject("boolean")),
        Value::Null => return Err(ParseError::NotAnObject("null")),
    };

    object
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                Value::Array(_) | Value::Object(_) => return Err(ParseError::NestedValue(key)),
            };
            Ok((key, text))
        })
        .collect()
}

/// Check that every field is present and non-blank.
///
/// Fields are checked in canonical order and the first failure is reported.
/// Out-of-domain values are accepted with a warning.
pub fn validate(fields: &RawFields) -> Result<ClassificationResult, ValidationError> {
    let mut values: [String; 7] = Default::default();

    for field in Field::ALL {
        let value = fields
            .get(field.key())
            .ok_or(ValidationError::MissingField(field))?
            .trim();
        if value.is_empty() {
            return Err(ValidationError::EmptyField(field));
        }
        if !field.allows(value) {
            warn!(
                field = field.key(),
                value, "Value outside the expected domain, accepting as-is"
            );
        }
        values[field.index()] = value.to_string();
    }

    for key in fields.keys().filter(|k| Field::from_key(k).is_none()) {
        debug!(key = key.as_str(), "Ignoring unexpected key in response");
    }

    Ok(ClassificationResult::from_values(values))
}
