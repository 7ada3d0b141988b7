use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration value held by jobs, parameters and scopes.
///
/// Scalars keep their native type so that a template consisting of a single
/// reference can hand back exactly what was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Views the value as a list; scalars behave like a one-element list.
    pub fn as_list(&self) -> &[Value] {
        match self {
            Value::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    pub fn into_list(self) -> Vec<Value> {
        match self {
            Value::List(items) => items,
            other => vec![other],
        }
    }

    pub fn len_as_list(&self) -> usize {
        self.as_list().len()
    }

    /// True for an empty list. Scalars, including the empty string, are not empty.
    pub fn is_empty_list(&self) -> bool {
        matches!(self, Value::List(items) if items.is_empty())
    }

    /// Whether any string inside this value still carries a `${` reference.
    pub fn contains_reference(&self) -> bool {
        match self {
            Value::Str(s) => s.contains("${"),
            Value::List(items) => items.iter().any(Value::contains_reference),
            _ => false,
        }
    }

    /// String form used when the value takes part in template interpolation.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Element `index` of a list, or the scalar itself.
    pub fn element(&self, index: usize) -> Option<&Value> {
        match self {
            Value::List(items) => items.get(index),
            other if index == 0 => Some(other),
            _ => None,
        }
    }

    /// Deep-flattens `values` and drops elements already seen, keeping
    /// first-seen order.
    pub fn flatten_unique<'a>(values: impl IntoIterator<Item = &'a Value>) -> Vec<Value> {
        let mut out = Vec::new();
        for value in values {
            collect_unique(value, &mut out);
        }
        out
    }
}

fn collect_unique(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::List(items) => {
            for item in items {
                collect_unique(item, out);
            }
        }
        scalar => {
            if !out.contains(scalar) {
                out.push(scalar.clone());
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:?}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = String;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Err("null is not a configuration value".to_string()),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(x) = n.as_f64() {
                    Ok(Value::Float(x))
                } else {
                    Err(format!("unsupported number {}", n))
                }
            }
            serde_json::Value::String(s) => Ok(Value::Str(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Value::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            serde_json::Value::Object(_) => Err("maps are not configuration values".to_string()),
        }
    }
}
