//! Response shapes and validation.
//!
//! A [`Shape`] describes what a JSON response must look like. Validation walks
//! the whole value and reports every mismatch instead of stopping at the
//! first one, so a broken payload can be diagnosed in one pass.
//!
//! ```ignore
//! let shape = Shape::object([
//!     ("status", Shape::Boolean),
//!     ("data", Shape::array(Shape::object([
//!         ("id", Shape::Integer),
//!         ("vendor", Shape::String.nullable()),
//!     ]))),
//! ]);
//! shape.validate(&body)?;
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// A composable description of an expected JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Any,
    String,
    Number,
    Integer,
    Boolean,
    /// Object with the listed fields; unknown keys are accepted as-is.
    Object(Vec<Field>),
    Array(Box<Shape>),
    /// String-keyed dictionary whose values all share one shape.
    Record(Box<Shape>),
    Nullable(Box<Shape>),
    /// Only meaningful as an object field: the key may be absent.
    Optional(Box<Shape>),
    OneOf(Vec<Shape>),
}

/// One named field of an object shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub shape: Shape,
}

impl Shape {
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Shape)>,
        K: Into<String>,
    {
        Self::Object(
            fields
                .into_iter()
                .map(|(name, shape)| Field {
                    name: name.into(),
                    shape,
                })
                .collect(),
        )
    }

    pub fn array(item: Shape) -> Self {
        Self::Array(Box::new(item))
    }

    pub fn record(value: Shape) -> Self {
        Self::Record(Box::new(value))
    }

    pub fn one_of(alternatives: impl IntoIterator<Item = Shape>) -> Self {
        Self::OneOf(alternatives.into_iter().collect())
    }

    #[must_use]
    pub fn nullable(self) -> Self {
        Self::Nullable(Box::new(self))
    }

    #[must_use]
    pub fn optional(self) -> Self {
        Self::Optional(Box::new(self))
    }

    /// Combine two object shapes; fields of `other` replace same-named fields.
    ///
    /// If either side is not an object, `other` wins unless it is `Any`.
    #[must_use]
    pub fn merge(self, other: Shape) -> Self {
        match (self, other) {
            (Self::Object(mut fields), Self::Object(extra)) => {
                for field in extra {
                    match fields.iter_mut().find(|f| f.name == field.name) {
                        Some(existing) => existing.shape = field.shape,
                        None => fields.push(field),
                    }
                }
                Self::Object(fields)
            }
            (base, Self::Any) => base,
            (_, other) => other,
        }
    }

    /// Human readable form used in violation reports.
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::String => "string".to_string(),
            Self::Number => "number".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Object(_) => "object".to_string(),
            Self::Array(item) => format!("array<{}>", item.describe()),
            Self::Record(value) => format!("record<{}>", value.describe()),
            Self::Nullable(inner) => format!("{} | null", inner.describe()),
            Self::Optional(inner) => inner.describe(),
            Self::OneOf(alternatives) => alternatives
                .iter()
                .map(Shape::describe)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    /// Check `value`, collecting every violation.
    ///
    /// Each violation is logged at warn level before the error is returned.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        self.check(Some(value), &JsonPath::root(), &mut violations);

        if violations.is_empty() {
            return Ok(());
        }
        for v in &violations {
            tracing::warn!(
                path = %v.path,
                expected = %v.expected,
                received = %v.received,
                "Response validation failed: {}",
                v.message
            );
        }
        Err(ValidationError { violations })
    }

    fn conforms(&self, value: &Value) -> bool {
        let mut violations = Vec::new();
        self.check(Some(value), &JsonPath::root(), &mut violations);
        violations.is_empty()
    }

    /// Shallow check of the value's kind, without descending into children.
    fn matches_kind(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object(_) | Self::Record(_) => value.is_object(),
            Self::Array(_) => value.is_array(),
            Self::Nullable(inner) => value.is_null() || inner.matches_kind(value),
            Self::Optional(inner) => inner.matches_kind(value),
            Self::OneOf(alternatives) => alternatives.iter().any(|s| s.conforms(value)),
        }
    }

    fn check(&self, value: Option<&Value>, path: &JsonPath, out: &mut Vec<Violation>) {
        let value = match (self, value) {
            (Self::Optional(_), None) => return,
            (Self::Optional(inner), Some(v)) => return inner.check(Some(v), path, out),
            (_, None) => {
                out.push(Violation::missing(path, self));
                return;
            }
            (_, Some(v)) => v,
        };

        match self {
            Self::Any => {}
            Self::Nullable(_) if value.is_null() => {}
            Self::Nullable(inner) if inner.matches_kind(value) => inner.check(Some(value), path, out),
            Self::String if value.is_string() => {}
            Self::Number if value.is_number() => {}
            Self::Integer if value.is_i64() || value.is_u64() => {}
            Self::Boolean if value.is_boolean() => {}
            Self::Object(fields) if value.is_object() => {
                let object = value.as_object();
                for field in fields {
                    let child = object.and_then(|o| o.get(&field.name));
                    field.shape.check(child, &path.key(&field.name), out);
                }
            }
            Self::Array(item) if value.is_array() => {
                for (index, element) in value.as_array().into_iter().flatten().enumerate() {
                    item.check(Some(element), &path.index(index), out);
                }
            }
            Self::Record(inner) if value.is_object() => {
                for (key, element) in value.as_object().into_iter().flatten() {
                    inner.check(Some(element), &path.key(key), out);
                }
            }
            Self::OneOf(alternatives) if alternatives.iter().any(|s| s.conforms(value)) => {}
            _ => out.push(Violation::mismatch(path, self, value)),
        }
    }
}

/// The kind of JSON value actually found at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
    Missing,
}

impl Kind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
            Self::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// JSON location rendered as `$.data.items[0].name`.
///
/// Keys that would read ambiguously in dotted form are quoted: `$["a.b"]`.
#[derive(Debug, Clone)]
struct JsonPath(String);

impl JsonPath {
    fn root() -> Self {
        Self("$".to_string())
    }

    fn key(&self, key: &str) -> Self {
        if key.is_empty() || key.contains(['.', '[', ']', '"']) {
            Self(format!("{}[{}]", self.0, Value::String(key.to_string())))
        } else {
            Self(format!("{}.{}", self.0, key))
        }
    }

    fn index(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }
}

/// A single non-conforming location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub expected: String,
    pub received: Kind,
    pub message: String,
}

impl Violation {
    fn missing(path: &JsonPath, shape: &Shape) -> Self {
        Self {
            path: path.0.clone(),
            expected: shape.describe(),
            received: Kind::Missing,
            message: "required field is missing".to_string(),
        }
    }

    fn mismatch(path: &JsonPath, shape: &Shape, value: &Value) -> Self {
        let expected = shape.describe();
        let received = Kind::of(value);
        Self {
            message: format!("expected {expected}, received {received}"),
            path: path.0.clone(),
            expected,
            received,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every violation found in one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Paths of all violations, in discovery order.
    pub fn paths(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.path.as_str()).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "response failed validation with {} violation(s)",
            self.violations.len()
        )?;
        for (i, v) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{v}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// A Rust type with a declared response shape.
pub trait Validated: DeserializeOwned {
    fn shape() -> Shape;
}

impl Validated for Value {
    fn shape() -> Shape {
        Shape::Any
    }
}

/// Validate and hand the value back unchanged.
pub fn validate_value(shape: &Shape, value: Value) -> Result<Value, ValidationError> {
    shape.validate(&value)?;
    Ok(value)
}

/// Validate against `shape`, then deserialize into `T`.
pub fn parse<T: DeserializeOwned>(shape: &Shape, value: Value) -> Result<T, ValidationError> {
    shape.validate(&value)?;
    let received = Kind::of(&value);
    serde_json::from_value(value).map_err(|e| {
        tracing::warn!(target_type = std::any::type_name::<T>(), "Response deserialization failed: {e}");
        ValidationError::new(vec![Violation {
            path: "$".to_string(),
            expected: std::any::type_name::<T>().to_string(),
            received,
            message: e.to_string(),
        }])
    })
}
