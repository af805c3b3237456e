//! Declarative JSON shapes shared by tool inputs and validated answers.

use serde_json::{json, Map, Value};
use thiserror::Error;

/// Expected structure of a JSON value.
///
/// Every field listed in an [`Shape::Object`] is required. Keys an object carries
/// beyond the listed ones are left unconstrained.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    String,
    Number {
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    Boolean,
    Object(Vec<(String, Shape)>),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid shape at `{path}`: {reason}")]
pub struct ShapeError {
    pub path: String,
    pub reason: String,
}

impl ShapeError {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: display_path(path),
            reason: reason.into(),
        }
    }
}

impl Shape {
    pub fn string() -> Self {
        Shape::String
    }

    pub fn number() -> Self {
        Shape::Number {
            minimum: None,
            maximum: None,
        }
    }

    pub fn bounded_number(minimum: Option<f64>, maximum: Option<f64>) -> Self {
        Shape::Number { minimum, maximum }
    }

    pub fn boolean() -> Self {
        Shape::Boolean
    }

    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Shape)>,
    {
        Shape::Object(
            fields
                .into_iter()
                .map(|(name, shape)| (name.into(), shape))
                .collect(),
        )
    }

    /// Declared fields when this is an object shape.
    pub fn fields(&self) -> Option<&[(String, Shape)]> {
        match self {
            Shape::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Shape::String => "string",
            Shape::Number { .. } => "number",
            Shape::Boolean => "boolean",
            Shape::Object(_) => "object",
        }
    }

    /// Builds a top-level shape from a descriptor such as
    /// `{"response": {"type": "string"}, "confidence": {"type": "number", "minimum": 0}}`.
    ///
    /// The top level must describe an object. Kinds that cannot be classified are
    /// rejected here rather than at validation time.
    pub fn from_descriptor(descriptor: &Value) -> Result<Self, ShapeError> {
        let shape = parse_descriptor(descriptor, "")?;
        match shape {
            Shape::Object(_) => Ok(shape),
            other => Err(ShapeError::new(
                "",
                format!("top-level shape must be an object, got {}", other.kind()),
            )),
        }
    }

    /// Renders the shape back into descriptor form. Nested objects use the
    /// explicit `{"type": "object", "properties": ...}` spelling.
    pub fn to_descriptor(&self) -> Value {
        match self {
            Shape::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, shape)| (name.clone(), shape.nested_descriptor()))
                    .collect(),
            ),
            other => other.nested_descriptor(),
        }
    }

    fn nested_descriptor(&self) -> Value {
        match self {
            Shape::String => json!({ "type": "string" }),
            Shape::Boolean => json!({ "type": "boolean" }),
            Shape::Number { minimum, maximum } => {
                let mut map = Map::new();
                map.insert("type".into(), json!("number"));
                if let Some(min) = minimum {
                    map.insert("minimum".into(), json!(min));
                }
                if let Some(max) = maximum {
                    map.insert("maximum".into(), json!(max));
                }
                Value::Object(map)
            }
            Shape::Object(_) => json!({ "type": "object", "properties": self.to_descriptor() }),
        }
    }

    /// JSON Schema rendering handed to the model as a tool's `parameters`.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Shape::Object(fields) => {
                let properties: Map<String, Value> = fields
                    .iter()
                    .map(|(name, shape)| (name.clone(), shape.to_json_schema()))
                    .collect();
                let required: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                })
            }
            other => other.nested_descriptor(),
        }
    }
}

fn parse_descriptor(value: &Value, path: &str) -> Result<Shape, ShapeError> {
    match value {
        Value::String(kind) => primitive(kind, None, None, path),
        Value::Object(map) => match map.get("type") {
            Some(Value::String(kind)) if kind == "object" => match map.get("properties") {
                Some(Value::Object(properties)) => parse_fields(properties, path),
                Some(_) => Err(ShapeError::new(path, "`properties` must be an object")),
                None => Ok(Shape::Object(Vec::new())),
            },
            Some(Value::String(kind)) => {
                primitive(kind, map.get("minimum"), map.get("maximum"), path)
            }
            Some(other) => Err(ShapeError::new(
                path,
                format!("`type` must be a string, got {other}"),
            )),
            None => parse_fields(map, path),
        },
        other => Err(ShapeError::new(
            path,
            format!("cannot classify descriptor {other}"),
        )),
    }
}

fn parse_fields(map: &Map<String, Value>, path: &str) -> Result<Shape, ShapeError> {
    let mut fields = Vec::with_capacity(map.len());
    for (name, descriptor) in map {
        let field_path = join_path(path, name);
        fields.push((name.clone(), parse_descriptor(descriptor, &field_path)?));
    }
    Ok(Shape::Object(fields))
}

fn primitive(
    kind: &str,
    minimum: Option<&Value>,
    maximum: Option<&Value>,
    path: &str,
) -> Result<Shape, ShapeError> {
    match kind {
        "number" => {
            let minimum = bound(minimum, "minimum", path)?;
            let maximum = bound(maximum, "maximum", path)?;
            if let (Some(min), Some(max)) = (minimum, maximum) {
                if min > max {
                    return Err(ShapeError::new(
                        path,
                        format!("minimum {min} is greater than maximum {max}"),
                    ));
                }
            }
            Ok(Shape::Number { minimum, maximum })
        }
        "string" | "boolean" if minimum.is_some() || maximum.is_some() => Err(ShapeError::new(
            path,
            format!("bounds are only valid on numbers, not {kind}"),
        )),
        "string" => Ok(Shape::String),
        "boolean" => Ok(Shape::Boolean),
        "object" => Ok(Shape::Object(Vec::new())),
        other => Err(ShapeError::new(path, format!("unknown kind `{other}`"))),
    }
}

fn bound(value: Option<&Value>, name: &str, path: &str) -> Result<Option<f64>, ShapeError> {
    match value {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| ShapeError::new(path, format!("`{name}` must be a number"))),
    }
}

pub(crate) fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

pub(crate) fn display_path(path: &str) -> String {
    if path.is_empty() {
        "(root)".to_string()
    } else {
        path.to_string()
    }
}
