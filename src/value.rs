use std::fmt;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// A toggle variation value.
///
/// Variations of a single toggle may mix types, so the concrete type is only known once a
/// variation is selected. The JSON representation is untagged: `true`, `42`, `4.2`, `"text"`, or
/// any other JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum Value {
    #[allow(missing_docs)]
    Bool(bool),
    /// A number without fractional part in the source JSON.
    Integer(i64),
    #[allow(missing_docs)]
    Number(f64),
    #[allow(missing_docs)]
    String(String),
    /// Objects, arrays, and `null`.
    Json(serde_json::Value),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl Value {
    #[allow(missing_docs)]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert into a plain [`serde_json::Value`].
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => (*b).into(),
            Value::Integer(i) => (*i).into(),
            Value::Number(n) => (*n).into(),
            Value::String(s) => s.as_str().into(),
            Value::Json(v) => v.clone(),
        }
    }

    /// Harmonize the type of a served variation with the caller's default: an integer variation
    /// served to a caller that expects a floating-point number becomes a float.
    pub(crate) fn widen_like(self, default: Option<&Value>) -> Value {
        match (self, default) {
            (Value::Integer(i), Some(Value::Number(_))) => Value::Number(i as f64),
            (value, _) => value,
        }
    }
}

/// Strings print verbatim, every other value prints as its JSON text.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => match serde_json::Number::from_f64(*n) {
                Some(number) => write!(f, "{number}"),
                None => write!(f, "{n}"),
            },
            Value::String(s) => f.write_str(s),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}
