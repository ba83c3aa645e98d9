//! Untyped view over a parsed JSON object
//!
//! Scanner output is noisy: fields go missing, change type between scanner
//! versions, or show up as `null`. [`Document`] wraps a parsed object and
//! exposes typed accessors that never fail; every accessor returns the
//! column's zero value when the field is absent or cannot be coerced.
//!
//! Each accessor takes a list of keys and reads the first one that is present
//! with a non-null value, so a column can accept both the scanner's field
//! name and the column name.

use serde_json::{Map, Value};

use crate::models::Mapping;

/// Borrowed view of one JSON object
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> Document<'a> {
    pub fn new(fields: &'a Map<String, Value>) -> Self {
        Self { fields }
    }

    /// First non-null value among `keys`
    pub fn get(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|key| self.fields.get(*key))
            .find(|value| !value.is_null())
    }

    /// String column; absent means `""`
    pub fn string(&self, keys: &[&str]) -> String {
        self.get(keys).map(value_to_string).unwrap_or_default()
    }

    /// Source rendering of a field, `absent` when missing or `null`
    pub fn text_or(&self, keys: &[&str], absent: &str) -> String {
        self.get(keys)
            .map(value_to_string)
            .unwrap_or_else(|| absent.to_string())
    }

    /// Nullable string column; absent or `null` means `None`
    pub fn opt_string(&self, keys: &[&str]) -> Option<String> {
        self.get(keys).map(value_to_string)
    }

    /// Integer column; absent, non-numeric or out-of-range means `0`
    pub fn integer<T>(&self, keys: &[&str]) -> T
    where
        T: TryFrom<i64> + Default,
    {
        self.get(keys)
            .and_then(value_to_i64)
            .and_then(|n| T::try_from(n).ok())
            .unwrap_or_default()
    }

    /// Boolean column; absent means `false`
    pub fn flag(&self, keys: &[&str]) -> bool {
        self.get(keys).is_some_and(is_truthy)
    }

    /// Mapping column; absent or non-object means empty
    pub fn mapping(&self, keys: &[&str]) -> Mapping {
        match self.get(keys) {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect(),
            _ => Mapping::new(),
        }
    }

    /// List-of-strings column. A bare string becomes a one-element list.
    pub fn string_list(&self, keys: &[&str]) -> Vec<String> {
        match self.get(keys) {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(value_to_string)
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// Render a value for a string column; nested values become compact JSON
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Value::String(s) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        },
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Drop the fractional part; non-finite or out-of-range values have no integer
fn truncate(f: f64) -> Option<i64> {
    let t = f.trunc();
    (t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64).then_some(t as i64)
}

/// Truthiness used for flag columns
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        _ => false,
    }
}
