//! Typed scalar values and the coercion rules shared by query operands and
//! record fields.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use crate::error::QueryError;
use crate::schema::FieldType;

/// A scalar coerced to a field's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Number(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl TypedValue {
    /// Coerce query text to `field_type`. Returns `None` when the text is not
    /// a valid literal of that type.
    pub fn parse(text: &str, field_type: FieldType) -> Option<Self> {
        match field_type {
            FieldType::Number => parse_number(text).map(TypedValue::Number),
            FieldType::Timestamp => parse_timestamp(text).map(TypedValue::Timestamp),
            FieldType::String => Some(TypedValue::Text(text.to_string())),
        }
    }

    /// Coerce the stored JSON value of `field` to `field_type`. `Ok(None)`
    /// means the value is null.
    pub fn from_json(
        field: &str,
        value: &Value,
        field_type: FieldType,
    ) -> Result<Option<Self>, QueryError> {
        let typed = match (field_type, value) {
            (_, Value::Null) => return Ok(None),
            (FieldType::Number, Value::Number(n)) => {
                n.as_f64().filter(|f| f.is_finite()).map(|f| TypedValue::Number(f + 0.0))
            }
            (FieldType::Number, Value::String(s)) => parse_number(s).map(TypedValue::Number),
            (FieldType::Timestamp, Value::String(s)) => {
                parse_timestamp(s).map(TypedValue::Timestamp)
            }
            (FieldType::Timestamp, Value::Number(n)) => n
                .as_i64()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .map(TypedValue::Timestamp),
            (FieldType::String, Value::String(s)) => Some(TypedValue::Text(s.clone())),
            (FieldType::String, Value::Number(n)) => Some(TypedValue::Text(n.to_string())),
            (FieldType::String, Value::Bool(b)) => Some(TypedValue::Text(b.to_string())),
            _ => None,
        };

        typed.map(Some).ok_or_else(|| QueryError::TypeMismatch {
            field: field.to_string(),
            expected: field_type,
            value: value.to_string(),
        })
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            TypedValue::Number(_) => FieldType::Number,
            TypedValue::Timestamp(_) => FieldType::Timestamp,
            TypedValue::Text(_) => FieldType::String,
        }
    }

    /// Total order between values of the same type; `None` across types.
    pub fn compare(&self, other: &TypedValue) -> Option<Ordering> {
        match (self, other) {
            (TypedValue::Number(a), TypedValue::Number(b)) => Some(a.total_cmp(b)),
            (TypedValue::Timestamp(a), TypedValue::Timestamp(b)) => Some(a.cmp(b)),
            (TypedValue::Text(a), TypedValue::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Number(n) => write!(f, "{}", n),
            TypedValue::Timestamp(ts) => {
                f.write_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            TypedValue::Text(s) => f.write_str(s),
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    // "inf" and "NaN" parse as f64 but are not literals of a numeric field.
    // Adding 0.0 folds -0 into 0 so equality agrees with total_cmp.
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f + 0.0)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    text.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}
