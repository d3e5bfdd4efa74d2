//! Cast and validation error taxonomy.
//!
//! Two top-level kinds:
//! - `Cast`: the input cannot be represented as the declared type at all
//! - `Validation`: the input is of the right type but violates a constraint
//!
//! Codes are stable and grouped by kind and field type (11xx string cast,
//! 12xx number cast, 14xx array cast, 15xx object cast, 21xx string
//! validation, 22xx number validation, 23xx date validation, 29xx
//! required/hook). Errors raised during a field write never cross the
//! assignment boundary as `Err`; they accumulate on the instance and are
//! retrieved through `Instance::errors`.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

use crate::schema::FieldDescriptor;

/// Top-level error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Value cannot be represented as the declared type.
    Cast,
    /// Value is of the right type but violates a declared constraint.
    Validation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Cast => write!(f, "CAST"),
            ErrorKind::Validation => write!(f, "VALIDATION"),
        }
    }
}

/// Stable per-type, per-constraint error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Object or array input assigned to a string field.
    StringCast,
    /// String input that is not numeric after separator normalization.
    NumberCast,
    /// Array or object input assigned to a number field.
    NumberCastCollection,
    /// Input that cannot be converted to an element list.
    ArrayCast,
    /// Non-object input assigned to an object field.
    ObjectCast,
    /// String not a member of the declared enum.
    StringEnum,
    /// String shorter than `min_length`.
    StringMinLength,
    /// String longer than `max_length` (without clip).
    StringMaxLength,
    /// String does not match the declared regex.
    StringRegex,
    /// Number below `min`.
    NumberMin,
    /// Number above `max`.
    NumberMax,
    /// Unparseable date input. Classified as validation, not cast: a
    /// preserved compatibility asymmetry relative to the other types.
    DateParse,
    /// Required field absent (or falsy, under the default configuration).
    RequiredMissing,
    /// A post-read getter hook raised.
    GetterFailed,
}

impl ErrorCode {
    /// Returns the stable numeric code.
    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::StringCast => 1101,
            ErrorCode::NumberCast => 1201,
            ErrorCode::NumberCastCollection => 1202,
            ErrorCode::ArrayCast => 1401,
            ErrorCode::ObjectCast => 1501,
            ErrorCode::StringEnum => 2101,
            ErrorCode::StringMinLength => 2102,
            ErrorCode::StringMaxLength => 2103,
            ErrorCode::StringRegex => 2104,
            ErrorCode::NumberMin => 2201,
            ErrorCode::NumberMax => 2202,
            ErrorCode::DateParse => 2301,
            ErrorCode::RequiredMissing => 2901,
            ErrorCode::GetterFailed => 2902,
        }
    }

    /// Returns the top-level kind for this code.
    pub fn kind(&self) -> ErrorKind {
        if self.code() < 2000 {
            ErrorKind::Cast
        } else {
            ErrorKind::Validation
        }
    }

    /// Returns the default message used when no custom message is declared.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::StringCast => "Cannot cast object or array to string",
            ErrorCode::NumberCast => "Cannot cast input to number",
            ErrorCode::NumberCastCollection => "Cannot cast object or array to number",
            ErrorCode::ArrayCast => "Cannot cast input to array",
            ErrorCode::ObjectCast => "Cannot cast input to object",
            ErrorCode::StringEnum => "String is not a member of the declared enum",
            ErrorCode::StringMinLength => "String is shorter than the declared minimum length",
            ErrorCode::StringMaxLength => "String is longer than the declared maximum length",
            ErrorCode::StringRegex => "String does not match the declared pattern",
            ErrorCode::NumberMin => "Number is below the declared minimum",
            ErrorCode::NumberMax => "Number is above the declared maximum",
            ErrorCode::DateParse => "Input could not be parsed as a date",
            ErrorCode::RequiredMissing => "Required field is missing",
            ErrorCode::GetterFailed => "Getter hook raised an error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One rejected write (or lazily detected required violation), accumulated
/// on the owning instance.
#[derive(Debug, Clone)]
pub struct FieldError {
    code: ErrorCode,
    message: String,
    field_name: String,
    rejected: Value,
    previous: Option<Value>,
    descriptor: Rc<FieldDescriptor>,
}

impl FieldError {
    pub(crate) fn new(
        code: ErrorCode,
        message: Option<String>,
        field_name: impl Into<String>,
        rejected: Value,
        previous: Option<Value>,
        descriptor: Rc<FieldDescriptor>,
    ) -> Self {
        Self {
            code,
            message: message.unwrap_or_else(|| code.default_message().to_string()),
            field_name: field_name.into(),
            rejected,
            previous,
            descriptor,
        }
    }

    /// Returns the top-level kind.
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Returns the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the message (default or caller-supplied).
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the name of the offending field. Errors surfaced from a
    /// nested instance carry a `parent.child` prefixed name.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Returns the rejected input value.
    pub fn rejected(&self) -> &Value {
        &self.rejected
    }

    /// Returns the previously accepted value, if one was stored.
    pub fn previous(&self) -> Option<&Value> {
        self.previous.as_ref()
    }

    /// Returns the offending field descriptor.
    pub fn descriptor(&self) -> &Rc<FieldDescriptor> {
        &self.descriptor
    }

    pub(crate) fn with_prefix(&self, prefix: &str) -> FieldError {
        if prefix.is_empty() {
            self.clone()
        } else {
            let mut err = self.clone();
            err.field_name = format!("{}.{}", prefix, self.field_name);
            err
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: field '{}': {}",
            self.kind(),
            self.code,
            self.field_name,
            self.message
        )
    }
}

impl std::error::Error for FieldError {}

/// Schema compilation failure. Unlike field writes, compiling a schema
/// declaration is a fallible `Result`-returning operation.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// Alias target does not exist in the same schema.
    #[error("Alias '{alias}' refers to unknown field '{target}'")]
    UnknownAliasTarget { alias: String, target: String },

    /// Alias target is itself an alias.
    #[error("Alias '{alias}' refers to alias field '{target}'; chains are not supported")]
    AliasToAlias { alias: String, target: String },

    /// Malformed raw declaration.
    #[error("Invalid declaration for field '{field}': {reason}")]
    InvalidDeclaration { field: String, reason: String },
}

/// Result type for schema compilation.
pub type CompileResult<T> = Result<T, CompileError>;
