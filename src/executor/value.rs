use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Pipeline parameters, ordered by name
pub type Parameters = BTreeMap<String, Value>;

/// A value bound in the execution context or produced by a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    /// JSON has no encoding for infinities or NaN, so those fail to serialize
    #[serde(serialize_with = "reject_non_finite")]
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// A live runtime resource. It can be bound and passed around but never
    /// persisted, so any snapshot or value blob containing one fails to encode.
    #[serde(serialize_with = "reject_handle", skip_deserializing)]
    Handle(String),
}

fn reject_handle<S: Serializer>(name: &str, _serializer: S) -> Result<S::Ok, S::Error> {
    Err(serde::ser::Error::custom(format!(
        "handle '{}' cannot be serialized",
        name
    )))
}

fn reject_non_finite<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if !value.is_finite() {
        return Err(serde::ser::Error::custom(format!(
            "float {} cannot be serialized",
            value
        )));
    }
    serializer.serialize_f64(*value)
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Handle(_) => "handle",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Handle(_) => true,
        }
    }

    /// Parse a command-line parameter value
    ///
    /// Integers, finite floats, `true`/`false` and `none` are recognized;
    /// anything else is taken verbatim as a string.
    pub fn parse_param(raw: &str) -> Value {
        let trimmed = raw.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
        match trimmed {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "none" => Value::None,
            _ => Value::Str(raw.to_string()),
        }
    }

    /// Render for `print` and step output: strings without quotes
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Canonical literal form, readable back by the calc executor
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Bool(b) => write!(f, "{}", b),
            // `-` is an operator to the lexer, so i64::MIN has no single-token literal
            Value::Int(i64::MIN) => write!(f, "({} - 1)", i64::MIN + 1),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write_quoted(f, s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Handle(name) => {
                f.write_str("handle(")?;
                write_quoted(f, name)?;
                f.write_str(")")
            }
        }
    }
}

/// Double-quoted string using only the escapes the calc lexer decodes
fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\0' => f.write_str("\\0")?,
            other => write!(f, "{}", other)?,
        }
    }
    f.write_str("\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(Value::parse_param("42"), Value::Int(42));
        assert_eq!(Value::parse_param("2.5"), Value::Float(2.5));
        assert_eq!(Value::parse_param("true"), Value::Bool(true));
        assert_eq!(Value::parse_param("none"), Value::None);
        assert_eq!(Value::parse_param("hello"), Value::Str("hello".to_string()));
        assert_eq!(Value::parse_param("nan"), Value::Str("nan".to_string()));
    }

    #[test]
    fn test_display_literals() {
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Str("a\"b".to_string()).to_string(), "\"a\\\"b\"");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Str("x".to_string())]).to_string(),
            "[1, \"x\"]"
        );
    }

    #[test]
    fn test_handle_does_not_serialize() {
        let value = Value::List(vec![Value::Int(1), Value::Handle("db".to_string())]);
        let err = serde_json::to_vec(&value).unwrap_err();
        assert!(err.to_string().contains("handle 'db'"));
    }

    #[test]
    fn test_non_finite_float_does_not_serialize() {
        for value in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let nested = Value::List(vec![Value::Float(value)]);
            let err = serde_json::to_vec(&nested).unwrap_err();
            assert!(err.to_string().contains("cannot be serialized"));
        }
        assert!(serde_json::to_vec(&Value::Float(f64::MAX)).is_ok());
    }

    #[test]
    fn test_json_roundtrip_without_handles() {
        let value = Value::List(vec![Value::Float(0.5), Value::None, Value::Bool(false)]);
        let bytes = serde_json::to_vec(&value).unwrap();
        let back: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, value);
    }
}
