//! Value wrappers: typed leaf values that are neither entities nor collections

use crate::entity::cast::parse_float;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::any::Any;
use std::fmt;

/// A typed leaf value constructed from a raw JSON primitive.
///
/// Wrappers own their parse rules and project themselves back to JSON when an
/// entity is serialized.
pub trait ValueWrapper: fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Short name of the wrapper kind, used in logs and debug output
    fn kind(&self) -> &'static str;

    /// Transport-ready projection
    fn to_json(&self) -> Value;

    /// True when the wrapper holds no meaningful value
    fn is_empty(&self) -> bool;

    fn clone_box(&self) -> Box<dyn ValueWrapper>;

    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn ValueWrapper> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl dyn ValueWrapper {
    /// Downcast to a concrete wrapper type
    pub fn downcast_ref<T: ValueWrapper>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Constructor reference stored in a cast declaration
pub type WrapperFactory = fn(&Value) -> Box<dyn ValueWrapper>;

/// Date/time wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DateValue(Option<DateTime<Utc>>);

impl DateValue {
    /// Create a new DateValue from a DateTime<Utc>
    pub fn new(datetime: DateTime<Utc>) -> Self {
        Self(Some(datetime))
    }

    pub fn empty() -> Self {
        Self(None)
    }

    /// Create a DateValue representing the current moment
    pub fn now() -> Self {
        Self(Some(Utc::now()))
    }

    /// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`; anything else is empty
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Self(Some(dt.with_timezone(&Utc)));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Self(Some(naive.and_utc()));
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Self(date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()));
        }
        Self(None)
    }

    pub fn from_value(raw: &Value) -> Self {
        match raw {
            Value::String(s) => Self::parse(s),
            _ => Self(None),
        }
    }

    /// Get the inner DateTime<Utc>
    pub fn datetime(&self) -> Option<&DateTime<Utc>> {
        self.0.as_ref()
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> Option<String> {
        self.0.map(|dt| dt.to_rfc3339())
    }

    pub(crate) fn factory(raw: &Value) -> Box<dyn ValueWrapper> {
        Box::new(Self::from_value(raw))
    }
}

impl From<DateTime<Utc>> for DateValue {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => Ok(()),
        }
    }
}

impl ValueWrapper for DateValue {
    fn kind(&self) -> &'static str {
        "date"
    }

    fn to_json(&self) -> Value {
        self.to_rfc3339().map(Value::String).unwrap_or(Value::Null)
    }

    fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    fn clone_box(&self) -> Box<dyn ValueWrapper> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Numeric wrapper; unparseable input becomes `0`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NumberValue(f64);

impl NumberValue {
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn from_value(raw: &Value) -> Self {
        Self(parse_float(raw))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn set(&mut self, raw: &Value) {
        self.0 = parse_float(raw);
    }

    pub fn factory(raw: &Value) -> Box<dyn ValueWrapper> {
        Box::new(Self::from_value(raw))
    }
}

impl fmt::Display for NumberValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ValueWrapper for NumberValue {
    fn kind(&self) -> &'static str {
        "number"
    }

    fn to_json(&self) -> Value {
        serde_json::Number::from_f64(self.0)
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(0))
    }

    fn is_empty(&self) -> bool {
        self.0 == 0.0
    }

    fn clone_box(&self) -> Box<dyn ValueWrapper> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_date_parsing_formats() {
        let rfc = DateValue::parse("2024-03-01T10:20:30Z");
        assert_eq!(rfc.to_string(), "2024-03-01 10:20:30");

        let sql = DateValue::parse("2024-03-01 10:20:30");
        assert_eq!(sql, rfc);

        let day = DateValue::parse("2024-03-01");
        assert_eq!(day.to_string(), "2024-03-01 00:00:00");

        assert!(DateValue::parse("not a date").is_empty());
        assert!(DateValue::from_value(&Value::Null).is_empty());
    }

    #[test]
    fn test_date_json_projection_reparses() {
        let date = DateValue::parse("2024-03-01 10:20:30");
        let json = date.to_json();
        assert_eq!(json, json!("2024-03-01T10:20:30+00:00"));
        assert_eq!(DateValue::from_value(&json), date);
        assert_eq!(DateValue::empty().to_json(), Value::Null);
        assert_eq!(DateValue::empty().to_string(), "");
    }

    #[test]
    fn test_number_wrapper() {
        assert_eq!(NumberValue::from_value(&json!("12.5 USD")).value(), 12.5);
        assert_eq!(NumberValue::from_value(&json!("abc")).value(), 0.0);
        assert_eq!(NumberValue::from_value(&json!(3)).to_json(), json!(3.0));

        let boxed: Box<dyn ValueWrapper> = NumberValue::factory(&json!(2));
        assert_eq!(boxed.kind(), "number");
        assert_eq!(boxed.downcast_ref::<NumberValue>().map(|n| n.value()), Some(2.0));
    }
}
