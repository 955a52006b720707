//! The tagged value type flowing through the aggregation engine.
//!
//! Every datum observed from a member, summarised on a leader, or written
//! back out is a [`Value`]. `Absent` means "not yet known" and never
//! compares equal to any concrete value.

use std::cmp::Ordering;

/// A datum addressed by a Victron D-Bus path.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Text(String),
    /// Not yet known. Never equal to any concrete value, including another
    /// `Absent` produced independently — use [`Value::is_absent`] rather
    /// than `==` when the question is "has this been observed at all".
    Absent,
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Truthiness used by the `All`/`Any` reducers: non-zero numbers are
    /// truthy, absent and zero are not.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Absent => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            Value::Text(_) | Value::Absent => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Double(d) => Some(*d as i64),
            Value::Text(_) | Value::Absent => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        match v {
            Some(f) => Value::Double(f),
            None => Value::Absent,
        }
    }
}

impl From<Option<i64>> for Value {
    fn from(v: Option<i64>) -> Self {
        match v {
            Some(i) => Value::Int(i),
            None => Value::Absent,
        }
    }
}

/// Numeric ordering used by `Max`; absent values never compare, mirroring
/// Python's `max(y for y in values if y is not None)` which simply drops
/// them from the candidate set.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        }
    }
}

/// `safe_add` from `original_source/dbus-acsystem.py`: sum of present
/// operands, but `Absent` if every operand is absent. This is what lets the
/// leader distinguish "no member wires this input" from "wired, reading
/// zero".
pub fn safe_add(values: impl IntoIterator<Item = Value>) -> Value {
    let mut total = 0.0f64;
    let mut any = false;
    for v in values {
        if let Some(f) = v.as_f64() {
            total += f;
            any = true;
        }
    }
    if any { Value::Double(total) } else { Value::Absent }
}

/// `safe_first` from `original_source/dbus-acsystem.py`: the first
/// non-absent value in iteration order, else `Absent`.
pub fn safe_first(values: impl IntoIterator<Item = Value>) -> Value {
    for v in values {
        if !v.is_absent() {
            return v;
        }
    }
    Value::Absent
}
