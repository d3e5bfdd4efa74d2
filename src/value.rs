//! Canonical stored field values.
//!
//! A field's stored value is always one of these canonical forms or
//! absent; a value that failed casting is never stored.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::array::TypedArray;
use crate::instance::Instance;

/// Canonical typed value held in an instance's raw store.
#[derive(Clone)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Array(TypedArray),
    Object(Instance),
    /// Passthrough for `any`-typed fields, schema-less object fields, and
    /// preserved nulls.
    Raw(Value),
}

impl FieldValue {
    /// Renders the canonical JSON view of this value. Whole numbers render
    /// as integers, dates as RFC 3339 strings, containers recursively.
    /// This is a raw snapshot: it does not materialize lazy defaults or
    /// run getter hooks (`Instance::to_object` does).
    pub fn to_value(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Number(n) => number_value(*n),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Date(dt) => Value::String(dt.to_rfc3339()),
            FieldValue::Array(arr) => Value::Array(arr.to_array()),
            FieldValue::Object(inst) => inst.snapshot(),
            FieldValue::Raw(v) => v.clone(),
        }
    }

    /// Falsiness used by required detection: empty string, zero, NaN,
    /// false, null. Dates, arrays, and instances are never falsy.
    pub(crate) fn is_falsy(&self) -> bool {
        match self {
            FieldValue::String(s) => s.is_empty(),
            FieldValue::Number(n) => *n == 0.0 || n.is_nan(),
            FieldValue::Boolean(b) => !b,
            FieldValue::Date(_) | FieldValue::Array(_) | FieldValue::Object(_) => false,
            FieldValue::Raw(v) => match v {
                Value::Null => true,
                Value::Bool(b) => !b,
                Value::Number(n) => n.as_f64().map_or(true, |f| f == 0.0),
                Value::String(s) => s.is_empty(),
                Value::Array(_) | Value::Object(_) => false,
            },
        }
    }
}

/// Renders a float as a JSON integer when it is whole and in range.
pub(crate) fn number_value(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "String({:?})", s),
            FieldValue::Number(n) => write!(f, "Number({})", n),
            FieldValue::Boolean(b) => write!(f, "Boolean({})", b),
            FieldValue::Date(dt) => write!(f, "Date({})", dt.to_rfc3339()),
            FieldValue::Array(arr) => write!(f, "Array(len={})", arr.len()),
            FieldValue::Object(_) => write!(f, "Object(..)"),
            FieldValue::Raw(v) => write!(f, "Raw({})", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whole_numbers_render_as_integers() {
        assert_eq!(FieldValue::Number(15.0).to_value(), json!(15));
        assert_eq!(FieldValue::Number(-3.0).to_value(), json!(-3));
        assert_eq!(FieldValue::Number(1.5).to_value(), json!(1.5));
    }

    #[test]
    fn non_finite_numbers_render_as_null() {
        assert_eq!(FieldValue::Number(f64::NAN).to_value(), Value::Null);
        assert_eq!(FieldValue::Number(f64::INFINITY).to_value(), Value::Null);
    }

    #[test]
    fn falsiness_matches_required_semantics() {
        assert!(FieldValue::String(String::new()).is_falsy());
        assert!(!FieldValue::String("x".into()).is_falsy());
        assert!(FieldValue::Number(0.0).is_falsy());
        assert!(FieldValue::Boolean(false).is_falsy());
        assert!(FieldValue::Raw(Value::Null).is_falsy());
        assert!(!FieldValue::Raw(json!({})).is_falsy());
        assert!(!FieldValue::Date(Utc::now()).is_falsy());
    }
}
