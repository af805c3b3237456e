//! Validation and canonical re-serialization of final answers.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::shape::{display_path, join_path, Shape, ShapeError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("invalid JSON input: {0}")]
    MalformedInput(String),

    #[error("schema validation failed: field `{field}` {reason}")]
    SchemaViolation { field: String, reason: String },
}

impl ParseError {
    fn violation(path: &str, reason: impl Into<String>) -> Self {
        ParseError::SchemaViolation {
            field: display_path(path),
            reason: reason.into(),
        }
    }
}

/// Checks a candidate answer and produces its canonical bytes.
pub trait OutputParser: Send + Sync {
    fn parse(&self, raw: &[u8]) -> Result<Vec<u8>, ParseError>;

    /// Human-readable instructions describing the expected format.
    fn format_instructions(&self) -> String;
}

/// Validates JSON objects against an optional [`Shape`].
#[derive(Debug, Clone, Default)]
pub struct JsonOutputParser {
    shape: Option<Shape>,
}

impl JsonOutputParser {
    pub fn new(shape: Shape) -> Self {
        Self { shape: Some(shape) }
    }

    /// Accepts any JSON object.
    pub fn unconstrained() -> Self {
        Self { shape: None }
    }

    pub fn from_descriptor(descriptor: &Value) -> Result<Self, ShapeError> {
        Shape::from_descriptor(descriptor).map(Self::new)
    }

    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }
}

impl OutputParser for JsonOutputParser {
    fn parse(&self, raw: &[u8]) -> Result<Vec<u8>, ParseError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|err| ParseError::MalformedInput(err.to_string()))?;
        if !value.is_object() {
            return Err(ParseError::MalformedInput(
                "expected a JSON object".to_string(),
            ));
        }

        if let Some(shape) = &self.shape {
            validate(&value, shape)?;
        }

        serde_json::to_vec_pretty(&canonicalize(value))
            .map_err(|err| ParseError::MalformedInput(err.to_string()))
    }

    fn format_instructions(&self) -> String {
        match &self.shape {
            None => "Please provide the output in valid JSON format.".to_string(),
            Some(shape) => {
                let rendered = serde_json::to_string_pretty(&shape.to_descriptor())
                    .unwrap_or_else(|_| shape.to_descriptor().to_string());
                format!("Please provide the output in JSON format matching this schema:\n{rendered}")
            }
        }
    }
}

/// Shape of the answers the agent produces: `{"response": string, "confidence": 0..=1}`.
pub fn default_answer_shape() -> Shape {
    Shape::object([
        ("response", Shape::String),
        ("confidence", Shape::bounded_number(Some(0.0), Some(1.0))),
    ])
}

/// Checks `value` against `shape`, stopping at the first violation.
///
/// Object fields are visited in declared order; nested violations report a dotted path.
pub fn validate(value: &Value, shape: &Shape) -> Result<(), ParseError> {
    check(value, shape, "")
}

fn check(value: &Value, shape: &Shape, path: &str) -> Result<(), ParseError> {
    match shape {
        Shape::String => {
            if !value.is_string() {
                return Err(ParseError::violation(path, "must be a string"));
            }
        }
        Shape::Boolean => {
            if !value.is_boolean() {
                return Err(ParseError::violation(path, "must be a boolean"));
            }
        }
        Shape::Number { minimum, maximum } => {
            let number = value
                .as_f64()
                .ok_or_else(|| ParseError::violation(path, "must be a number"))?;
            if let Some(min) = minimum {
                if number < *min {
                    return Err(ParseError::violation(
                        path,
                        format!("must be greater than or equal to {min}"),
                    ));
                }
            }
            if let Some(max) = maximum {
                if number > *max {
                    return Err(ParseError::violation(
                        path,
                        format!("must be less than or equal to {max}"),
                    ));
                }
            }
        }
        Shape::Object(fields) => {
            let map = value
                .as_object()
                .ok_or_else(|| ParseError::violation(path, "must be an object"))?;
            for (name, field_shape) in fields {
                let field_path = join_path(path, name);
                let field = map
                    .get(name)
                    .ok_or_else(|| ParseError::violation(&field_path, "missing required field"))?;
                check(field, field_shape, &field_path)?;
            }
        }
    }
    Ok(())
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonicalize(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
