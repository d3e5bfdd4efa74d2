//! Typecast engine.
//!
//! Given a raw JSON input and a compiled field descriptor, produces the
//! canonical typed value, signals absence, or fails with a coded cast or
//! validation failure. Casting never mutates the input's owner; the
//! instance write path decides what a failure does (append to the error
//! log, leave the prior value untouched).
//!
//! Per-type semantics:
//! - string: rejects object/array input; stringify, then transform ->
//!   clip -> enum -> minLength -> maxLength -> regex
//! - number: booleans map to 1/0; string input has digit-group separators
//!   normalized before parsing; then transform, then min/max
//! - boolean: `"false"` casts to false, numbers by sign, otherwise truthy
//! - date: numeric timestamps with seconds/milliseconds inferred from
//!   digit count, or parseable strings; unparseable input is a
//!   *validation* failure, a preserved compatibility asymmetry
//! - array/object: handled element-wise / key-wise, preserving the
//!   destination's identity (see the instance write path)
//! - any: passthrough

use std::rc::Rc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::array::TypedArray;
use crate::error::ErrorCode;
use crate::options::Options;
use crate::schema::{FieldDescriptor, FieldKind};
use crate::value::FieldValue;

/// A rejected cast: code, optional custom message, and the rejected input.
/// The instance write path wraps this into a full `FieldError` with the
/// field name, prior value, and descriptor.
#[derive(Debug)]
pub(crate) struct CastFailure {
    pub code: ErrorCode,
    pub message: Option<String>,
    pub rejected: Value,
}

impl CastFailure {
    fn new(code: ErrorCode, rejected: Value) -> Self {
        Self {
            code,
            message: None,
            rejected,
        }
    }

    fn with_message(code: ErrorCode, message: Option<String>, rejected: Value) -> Self {
        Self {
            code,
            message,
            rejected,
        }
    }
}

/// Casts a raw input against a descriptor. `Ok(None)` means the input
/// resolves to absence (null, or empty string for number/boolean/date).
pub(crate) fn cast_value(
    input: Value,
    desc: &Rc<FieldDescriptor>,
    opts: &Rc<Options>,
) -> Result<Option<FieldValue>, CastFailure> {
    match &desc.kind {
        FieldKind::String => cast_string(input, desc, opts),
        FieldKind::Number => cast_number(input, desc, opts),
        FieldKind::Boolean => cast_boolean(input, desc, opts),
        FieldKind::Date => cast_date(input, desc, opts),
        FieldKind::Any => {
            if input.is_null() && !opts.preserve_null {
                Ok(None)
            } else {
                Ok(Some(FieldValue::Raw(input)))
            }
        }
        FieldKind::Object(None) => {
            if input.is_null() {
                return Ok(absent(opts));
            }
            if input.is_object() {
                Ok(Some(FieldValue::Raw(input)))
            } else {
                Err(CastFailure::new(ErrorCode::ObjectCast, input))
            }
        }
        FieldKind::Object(Some(model)) => {
            if input.is_null() {
                return Ok(absent(opts));
            }
            if !input.is_object() {
                return Err(CastFailure::new(ErrorCode::ObjectCast, input));
            }
            Ok(Some(FieldValue::Object(model.create_from(input))))
        }
        FieldKind::Array(element) => {
            let list = enumerate_list(input)?;
            let mut arr = TypedArray::new(
                Rc::clone(element),
                desc.unique,
                desc.filter.clone(),
                Rc::clone(opts),
            );
            arr.push(list);
            Ok(Some(FieldValue::Array(arr)))
        }
        // Aliases own no storage; the accessor layer redirects them to
        // their target before casting.
        FieldKind::Alias(_) => Ok(None),
    }
}

/// Converts an enumerable input into an element list: arrays as-is,
/// objects by their values, null as empty.
pub(crate) fn enumerate_list(input: Value) -> Result<Vec<Value>, CastFailure> {
    match input {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map.into_iter().map(|(_, v)| v).collect()),
        other => Err(CastFailure::new(ErrorCode::ArrayCast, other)),
    }
}

fn absent(opts: &Options) -> Option<FieldValue> {
    if opts.preserve_null {
        Some(FieldValue::Raw(Value::Null))
    } else {
        None
    }
}

fn cast_string(
    input: Value,
    desc: &FieldDescriptor,
    opts: &Options,
) -> Result<Option<FieldValue>, CastFailure> {
    let mut s = match input {
        Value::Null => return Ok(absent(opts)),
        Value::Object(_) | Value::Array(_) => {
            return Err(CastFailure::new(ErrorCode::StringCast, input));
        }
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
    };

    if let Some(transform) = &desc.transform {
        s = match transform(Value::String(s)) {
            Value::String(out) => out,
            other => other.to_string(),
        };
    }
    if let Some(transform) = &desc.string_transform {
        s = transform(s);
    }

    if desc.clip {
        if let Some(max) = &desc.max_length {
            if s.chars().count() > max.value {
                s = s.chars().take(max.value).collect();
            }
        }
    }

    if let Some(members) = &desc.enum_values {
        if !members.value.contains(&s) {
            return Err(CastFailure::with_message(
                ErrorCode::StringEnum,
                members.message.clone(),
                Value::String(s),
            ));
        }
    }
    if let Some(min) = &desc.min_length {
        if s.chars().count() < min.value {
            return Err(CastFailure::with_message(
                ErrorCode::StringMinLength,
                min.message.clone(),
                Value::String(s),
            ));
        }
    }
    if let Some(max) = &desc.max_length {
        if s.chars().count() > max.value {
            return Err(CastFailure::with_message(
                ErrorCode::StringMaxLength,
                max.message.clone(),
                Value::String(s),
            ));
        }
    }
    if let Some(pattern) = &desc.regex {
        if !pattern.value.is_match(&s) {
            return Err(CastFailure::with_message(
                ErrorCode::StringRegex,
                pattern.message.clone(),
                Value::String(s),
            ));
        }
    }

    Ok(Some(FieldValue::String(s)))
}

fn cast_number(
    input: Value,
    desc: &FieldDescriptor,
    opts: &Options,
) -> Result<Option<FieldValue>, CastFailure> {
    let mut n = match &input {
        Value::Null => return Ok(absent(opts)),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) => f,
            None => return Err(CastFailure::new(ErrorCode::NumberCast, input)),
        },
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let normalized =
                normalize_number_string(trimmed, opts.use_decimal_number_group_separator);
            match normalized.parse::<f64>() {
                Ok(f) => f,
                Err(_) => return Err(CastFailure::new(ErrorCode::NumberCast, input)),
            }
        }
        Value::Array(_) | Value::Object(_) => {
            return Err(CastFailure::new(ErrorCode::NumberCastCollection, input));
        }
    };

    if let Some(transform) = &desc.number_transform {
        n = transform(n);
    }

    if let Some(min) = &desc.min {
        if n < min.value {
            return Err(CastFailure::with_message(
                ErrorCode::NumberMin,
                min.message.clone(),
                input,
            ));
        }
    }
    if let Some(max) = &desc.max {
        if n > max.value {
            return Err(CastFailure::with_message(
                ErrorCode::NumberMax,
                max.message.clone(),
                input,
            ));
        }
    }

    Ok(Some(FieldValue::Number(n)))
}

/// Strips digit-group separators and normalizes the decimal separator.
/// Default mode: comma groups, point decimal. Decimal mode: point groups,
/// comma decimal. Group separators are only dropped between digits.
fn normalize_number_string(s: &str, decimal_mode: bool) -> String {
    let group = if decimal_mode { '.' } else { ',' };
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == group {
            let between_digits = i > 0
                && chars[i - 1].is_ascii_digit()
                && i + 1 < chars.len()
                && chars[i + 1].is_ascii_digit();
            if between_digits {
                continue;
            }
            out.push(c);
        } else if decimal_mode && c == ',' {
            out.push('.');
        } else {
            out.push(c);
        }
    }
    out
}

fn cast_boolean(
    input: Value,
    desc: &FieldDescriptor,
    opts: &Options,
) -> Result<Option<FieldValue>, CastFailure> {
    let mut b = match &input {
        Value::Null => return Ok(absent(opts)),
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f > 0.0),
        Value::String(s) => {
            if s.is_empty() {
                return Ok(None);
            }
            s != "false"
        }
        // Truthy coercion: any object or array is true.
        Value::Array(_) | Value::Object(_) => true,
    };

    if let Some(transform) = &desc.boolean_transform {
        b = transform(b);
    }

    Ok(Some(FieldValue::Boolean(b)))
}

fn cast_date(
    input: Value,
    desc: &FieldDescriptor,
    opts: &Options,
) -> Result<Option<FieldValue>, CastFailure> {
    let parsed = match &input {
        Value::Null => return Ok(absent(opts)),
        Value::Number(n) => n.as_f64().and_then(|f| timestamp_to_date(f as i64)),
        Value::String(s) => {
            if s.is_empty() {
                return Ok(None);
            }
            let trimmed = s.trim();
            if let Ok(ts) = trimmed.parse::<i64>() {
                timestamp_to_date(ts)
            } else {
                parse_date_string(trimmed)
            }
        }
        _ => None,
    };

    // Unparseable input is a validation failure, not a cast failure.
    let mut dt = match parsed {
        Some(dt) => dt,
        None => return Err(CastFailure::new(ErrorCode::DateParse, input)),
    };

    if let Some(transform) = &desc.date_transform {
        dt = transform(dt);
    }

    Ok(Some(FieldValue::Date(dt)))
}

/// Converts a numeric timestamp, inferring precision from digit count:
/// up to ten digits is seconds, beyond that milliseconds.
fn timestamp_to_date(ts: i64) -> Option<DateTime<Utc>> {
    if ts.unsigned_abs() <= 9_999_999_999 {
        Utc.timestamp_opt(ts, 0).single()
    } else {
        Utc.timestamp_millis_opt(ts).single()
    }
}

fn parse_date_string(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}
