use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Field map of a single document.
pub type Fields = BTreeMap<String, FieldValue>;

/// Loosely-typed value as held by the document store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
    /// Write-only sentinel; the store replaces it with its own commit time.
    ServerTimestamp,
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::ServerTimestamp => "server timestamp",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Equality as evaluated by an `==` filter: integers and doubles compare
    /// numerically, everything else must match type and value.
    pub fn query_eq(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Double(b)) | (Self::Double(b), Self::Integer(a)) => {
                (*a as f64) == *b
            }
            (a, b) => a == b,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_crosses_integer_and_double() {
        assert!(FieldValue::Integer(5).query_eq(&FieldValue::Double(5.0)));
        assert!(FieldValue::Double(5.0).query_eq(&FieldValue::Integer(5)));
        assert!(!FieldValue::Integer(5).query_eq(&FieldValue::Double(5.5)));
    }

    #[test]
    fn equality_is_type_strict_otherwise() {
        assert!(!FieldValue::String("1".into()).query_eq(&FieldValue::Integer(1)));
        assert!(!FieldValue::Boolean(true).query_eq(&FieldValue::Integer(1)));
        assert!(FieldValue::from("x").query_eq(&FieldValue::String("x".into())));
    }

    #[test]
    fn options_convert_to_null() {
        assert!(FieldValue::from(None::<String>).is_null());
        assert_eq!(FieldValue::from(Some(3)), FieldValue::Integer(3));
    }
}
