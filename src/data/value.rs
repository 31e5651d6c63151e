use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Scalar values flowing through plans, bind parameters and result rows
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int64(i64),
    Float64(f64),
    String(String),
    Date(NaiveDate),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Date(_) => "date",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            Value::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Wrap an optional float, mapping non-finite results to `Null`
    pub fn finite(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Value::Float64(v),
            _ => Value::Null,
        }
    }
}

/// Negative zero folds onto zero so that Eq, Hash and Ord agree
fn canonical(f: f64) -> f64 {
    if f == 0.0 {
        0.0
    } else {
        f
    }
}

fn float_key(f: f64) -> u64 {
    canonical(f).to_bits()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => float_key(*a) == float_key(*b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            // Cross-type numeric comparisons
            (Value::Int64(a), Value::Float64(b)) => float_key(*a as f64) == float_key(*b),
            (Value::Float64(a), Value::Int64(b)) => float_key(*a) == float_key(*b as f64),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            // Integral floats hash like their integer form so that Eq and Hash agree
            Value::Int64(i) => {
                1u8.hash(state);
                float_key(*i as f64).hash(state)
            }
            Value::Float64(f) => {
                1u8.hash(state);
                float_key(*f).hash(state)
            }
            Value::String(s) => {
                3u8.hash(state);
                s.hash(state)
            }
            Value::Date(d) => {
                4u8.hash(state);
                d.hash(state)
            }
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Float64(a), Value::Float64(b)) => canonical(*a).total_cmp(&canonical(*b)),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Int64(a), Value::Float64(b)) => canonical(*a as f64).total_cmp(&canonical(*b)),
            (Value::Float64(a), Value::Int64(b)) => canonical(*a).total_cmp(&canonical(*b as f64)),
            // Different types: order by type discriminant
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Value {
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int64(_) | Value::Float64(_) => 1,
            Value::String(_) => 2,
            Value::Date(_) => 3,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}
