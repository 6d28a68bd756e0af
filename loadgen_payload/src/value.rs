//! Typed field values.

use std::fmt;

use serde::Serialize;

/// The type of value a generator produces, fixed when the generator is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Signed 64-bit integer
    Int,
    /// 64-bit float
    Float,
    /// UTF-8 string
    Str,
    /// Boolean
    Bool,
}

/// One generated field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Signed 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Boolean
    Bool(bool),
}

impl Value {
    /// The `Kind` of this value.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Str(_) => Kind::Str,
            Value::Bool(_) => Kind::Bool,
        }
    }

    /// Interpret a literal the way a constant field does: boolean, then
    /// integer, then float, else the string itself.
    #[must_use]
    pub fn from_literal(literal: &str) -> Self {
        match literal {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(i) = literal.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = literal.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Str(literal.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}
