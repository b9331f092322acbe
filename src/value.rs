//! Tagged values for loosely typed request input: query text and JSON payloads.

use crate::schema::FieldKind;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One record: storage name -> value.
pub type Row = BTreeMap<String, FieldValue>;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<FieldValue>),
    Json(Value),
}

impl FieldValue {
    /// Best-effort typing of query-string text: integer, then float, then bool, else string.
    /// Text is only typed when it is the canonical spelling of the value, so `007`,
    /// `1.50` or `1e3` stay strings and a text column still sees them verbatim.
    pub fn infer(s: &str) -> Self {
        if let Ok(n) = s.parse::<i64>() {
            if n.to_string() == s {
                return FieldValue::Int(n);
            }
        }
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() && f.to_string() == s {
                return FieldValue::Float(f);
            }
        }
        match s {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            _ => FieldValue::String(s.to_string()),
        }
    }

    pub fn from_json(v: Value) -> Self {
        match v {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => n.as_f64().map(FieldValue::Float).unwrap_or(FieldValue::Null),
            },
            Value::String(s) => FieldValue::String(s),
            Value::Array(items) => FieldValue::List(items.into_iter().map(FieldValue::from_json).collect()),
            obj @ Value::Object(_) => FieldValue::Json(obj),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::Number((*i).into()),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::List(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            FieldValue::Json(v) => v.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to the declared column type. Lists are coerced element-wise.
    /// The error message names only the problem; callers add the field.
    pub fn coerce(self, kind: FieldKind) -> Result<FieldValue, String> {
        use FieldValue as V;
        match (self, kind) {
            (V::Null, _) => Ok(V::Null),
            (V::List(items), kind) => items
                .into_iter()
                .map(|v| v.coerce(kind))
                .collect::<Result<Vec<_>, _>>()
                .map(V::List),
            (v, FieldKind::Json) => Ok(v),

            (V::String(s), FieldKind::Text) => Ok(V::String(s)),
            (V::Int(i), FieldKind::Text) => Ok(V::String(i.to_string())),
            (V::Float(f), FieldKind::Text) => Ok(V::String(f.to_string())),
            (V::Bool(b), FieldKind::Text) => Ok(V::String(b.to_string())),

            (V::Int(i), FieldKind::Int) => i32::try_from(i)
                .map(|_| V::Int(i))
                .map_err(|_| format!("{} is out of range for i32", i)),
            (V::Int(i), FieldKind::BigInt) => Ok(V::Int(i)),
            (V::Float(f), FieldKind::Int | FieldKind::BigInt) if f.fract() == 0.0 => match float_to_i64(f) {
                Some(i) => V::Int(i).coerce(kind),
                None => Err(format!("{} is out of range for i64", f)),
            },
            (V::String(s), FieldKind::Int | FieldKind::BigInt) => {
                let t = s.trim();
                t.parse::<i64>()
                    .ok()
                    .or_else(|| t.parse::<f64>().ok().filter(|f| f.fract() == 0.0).and_then(float_to_i64))
                    .ok_or_else(|| format!("'{}' is not an integer", s))
                    .and_then(|i| V::Int(i).coerce(kind))
            }

            (V::Float(f), FieldKind::Float) => Ok(V::Float(f)),
            (V::Int(i), FieldKind::Float) => Ok(V::Float(i as f64)),
            (V::String(s), FieldKind::Float) => s
                .trim()
                .parse::<f64>()
                .map(V::Float)
                .map_err(|_| format!("'{}' is not a number", s)),

            (V::Bool(b), FieldKind::Bool) => Ok(V::Bool(b)),
            (V::Int(0), FieldKind::Bool) => Ok(V::Bool(false)),
            (V::Int(1), FieldKind::Bool) => Ok(V::Bool(true)),
            (V::String(s), FieldKind::Bool) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(V::Bool(true)),
                "false" | "0" => Ok(V::Bool(false)),
                _ => Err(format!("'{}' is not a boolean", s)),
            },

            (V::String(s), FieldKind::Uuid) => uuid::Uuid::parse_str(s.trim())
                .map(|u| V::String(u.to_string()))
                .map_err(|_| format!("'{}' is not a valid uuid", s)),

            (V::String(s), FieldKind::Timestamp) => {
                if is_timestamp(&s) {
                    Ok(V::String(s))
                } else {
                    Err(format!("'{}' is not a valid timestamp", s))
                }
            }

            (v, kind) => Err(format!("{} cannot be stored as {}", v.type_name(), kind.type_tag())),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "number",
            FieldValue::String(_) => "string",
            FieldValue::List(_) => "list",
            FieldValue::Json(_) => "object",
        }
    }
}

/// Exact conversion of an integral float; `None` outside the i64 range.
fn float_to_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn is_timestamp(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
            FieldValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Serialize a row to a JSON object.
pub fn row_to_json(row: &Row) -> Value {
    Value::Object(row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}
