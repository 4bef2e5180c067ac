//! Generic scalar values exchanged with the generic SQL interface.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// A scalar value as seen by the generic interface.
///
/// This is the complete set of shapes a decoded column value or a query
/// argument can take; driver-specific types are converted into one of these.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL NULL
    #[default]
    Null,
    Bool(bool),
    /// Every integer width, widened
    Int(i64),
    /// Both float widths, widened
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    /// Date and timestamp values, normalized to UTC
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Returns true for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Convert into a positional native argument; NULL becomes a real absence.
    pub fn into_arg(self) -> Option<Value> {
        match self {
            Value::Null => None,
            v => Some(v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),+) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )+
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v.and_utc())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        v.and_hms_opt(0, 0, 0)
            .map_or(Value::Null, |dt| Value::Timestamp(dt.and_utc()))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A query argument with its position and optional name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    /// Parameter name, if the caller used a named parameter
    pub name: Option<String>,
    /// 1-based position
    pub ordinal: usize,
    pub value: Value,
}

impl NamedValue {
    /// Positional arguments `$1..$n` from plain values.
    pub fn positional<I, V>(values: I) -> Vec<NamedValue>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| NamedValue {
                name: None,
                ordinal: i + 1,
                value: v.into(),
            })
            .collect()
    }
}

/// Rust-side shape a column can be scanned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Float64,
    Float32,
    Int64,
    Int32,
    Int16,
    String,
    Bool,
    Timestamp,
    Bytes,
    /// No narrower type is known; any [`Value`] may appear
    Any,
}
