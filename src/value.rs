use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::Arc;

/// Placeholder emitted in place of a value that cannot be represented as JSON.
pub const UNENCODABLE: &str = "<unencodable>";

/// Nesting deeper than this is treated as unencodable.
pub const MAX_DEPTH: usize = 64;

/// Type-erased `Serialize` value, converted to JSON only when encoded.
pub trait DynSerialize: Send + Sync {
    fn to_json(&self) -> serde_json::Result<Value>;
}

impl<T> DynSerialize for T
where
    T: Serialize + Send + Sync,
{
    fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Value of a custom context field attached to a log event.
#[derive(Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Array(Vec<FieldValue>),
    /// Ordered key/value pairs. Later duplicates replace earlier ones.
    Object(Vec<(String, FieldValue)>),
    /// Already-encoded JSON text, e.g. a JSON document stored in a context map.
    RawJson(String),
    /// Arbitrary `Serialize` value, converted lazily.
    Serialized(Arc<dyn DynSerialize>),
}

impl FieldValue {
    pub fn serialized<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        FieldValue::Serialized(Arc::new(value))
    }

    /// Plain-text rendering used for message arguments and lookups.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Null => "null".to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::I64(n) => n.to_string(),
            FieldValue::U64(n) => n.to_string(),
            FieldValue::F64(n) => n.to_string(),
            FieldValue::Str(s) => s.clone(),
            FieldValue::RawJson(s) => s.clone(),
            other => {
                let mut sink = ConversionReport::default();
                let value = other.to_json(false, &mut sink);
                serde_json::to_string(&value).unwrap_or_else(|_| UNENCODABLE.to_string())
            }
        }
    }

    /// Convert into a JSON value, substituting [`UNENCODABLE`] for anything
    /// that cannot be represented. Never fails.
    pub(crate) fn to_json(&self, parse_json_strings: bool, report: &mut ConversionReport) -> Value {
        self.to_json_at(parse_json_strings, report, 0)
    }

    fn to_json_at(&self, parse_json_strings: bool, report: &mut ConversionReport, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            return report.unencodable();
        }
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::I64(n) => Value::from(*n),
            FieldValue::U64(n) => Value::from(*n),
            FieldValue::F64(n) => match Number::from_f64(*n) {
                Some(num) => Value::Number(num),
                None => report.unencodable(),
            },
            FieldValue::Str(s) => {
                if parse_json_strings && looks_like_json(s) {
                    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
                } else {
                    Value::String(s.clone())
                }
            }
            FieldValue::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.to_json_at(parse_json_strings, report, depth + 1))
                    .collect(),
            ),
            FieldValue::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let value = value.to_json_at(parse_json_strings, report, depth + 1);
                    map.insert(key.clone(), value);
                }
                Value::Object(map)
            }
            FieldValue::RawJson(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) if json_depth(&value) + depth <= MAX_DEPTH => value,
                _ => report.unencodable(),
            },
            FieldValue::Serialized(inner) => match inner.to_json() {
                Ok(value) if json_depth(&value) + depth <= MAX_DEPTH => value,
                _ => report.unencodable(),
            },
        }
    }
}

/// Tally of substitutions made while converting values.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConversionReport {
    pub unencodable: u64,
}

impl ConversionReport {
    fn unencodable(&mut self) -> Value {
        self.unencodable += 1;
        Value::String(UNENCODABLE.to_string())
    }
}

/// A string is treated as embedded JSON when it is bracketed like an object or array.
pub fn looks_like_json(s: &str) -> bool {
    (s.starts_with('{') && s.ends_with('}')) || (s.starts_with('[') && s.ends_with(']'))
}

fn json_depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("Null"),
            FieldValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            FieldValue::I64(n) => f.debug_tuple("I64").field(n).finish(),
            FieldValue::U64(n) => f.debug_tuple("U64").field(n).finish(),
            FieldValue::F64(n) => f.debug_tuple("F64").field(n).finish(),
            FieldValue::Str(s) => f.debug_tuple("Str").field(s).finish(),
            FieldValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            FieldValue::Object(entries) => f.debug_tuple("Object").field(entries).finish(),
            FieldValue::RawJson(s) => f.debug_tuple("RawJson").field(s).finish(),
            FieldValue::Serialized(_) => f.write_str("Serialized(..)"),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::I64(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::I64(v as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::U64(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::U64(v as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::F64(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(v: Vec<T>) -> Self {
        FieldValue::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::I64(i)
                } else if let Some(u) = n.as_u64() {
                    FieldValue::U64(u)
                } else {
                    FieldValue::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => FieldValue::Str(s),
            Value::Array(items) => FieldValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => FieldValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}
