//! Raw schema declarations.
//!
//! A declaration is what a caller hands to `Model::new`: per field, either
//! a bare type reference, a properties block with constraints and hooks, a
//! nested plain schema (compiled recursively into a sub-schema), an array
//! literal, or a pre-compiled model reference. The compiler normalizes all
//! of these into immutable `FieldDescriptor`s; declarations themselves are
//! never mutated by compilation.
//!
//! Hook-free schemas can also be written as plain JSON and parsed with
//! `SchemaDecl::from_json`.

use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use crate::error::{CompileError, CompileResult};
use crate::instance::Instance;
use crate::model::Model;

/// Generic pre-cast transform applied to raw string input.
pub type TransformHook = Rc<dyn Fn(Value) -> Value>;
/// String-specific transform, applied after the generic transform.
pub type StringTransform = Rc<dyn Fn(String) -> String>;
/// Post-cast number transform.
pub type NumberTransform = Rc<dyn Fn(f64) -> f64>;
/// Post-cast boolean transform.
pub type BooleanTransform = Rc<dyn Fn(bool) -> bool>;
/// Post-cast date transform.
pub type DateTransform = Rc<dyn Fn(DateTime<Utc>) -> DateTime<Utc>>;
/// Post-read getter hook; the transformed value is never persisted back.
/// An `Err` is captured on the instance as an error record, not raised.
pub type GetterHook = Rc<dyn Fn(Value) -> Result<Value, String>>;
/// Array element filter predicate; rejected elements are dropped.
pub type FilterHook = Rc<dyn Fn(&Value) -> bool>;
/// Required predicate, evaluated against the instance (or the root
/// instance under `inherit_root_this`) when errors are retrieved.
pub type RequiredFn = Rc<dyn Fn(&Instance) -> bool>;
/// Zero-argument default value producer.
pub type DefaultFn = Rc<dyn Fn() -> Value>;

/// Type names recognized in bare type references. A bare `Object` is an
/// object field without a nested schema (any object accepted as-is); a
/// bare `Array` is an untyped array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
    Any,
}

impl TypeName {
    /// Parses a lowercase type tag.
    pub fn parse(tag: &str) -> Option<TypeName> {
        match tag {
            "string" => Some(TypeName::String),
            "number" => Some(TypeName::Number),
            "boolean" => Some(TypeName::Boolean),
            "date" => Some(TypeName::Date),
            "array" => Some(TypeName::Array),
            "object" => Some(TypeName::Object),
            "any" => Some(TypeName::Any),
            _ => None,
        }
    }
}

/// A constraint value, optionally paired with a custom error message.
/// Every constraint accepts either the bare value or the pair form.
#[derive(Debug, Clone)]
pub struct Constraint<T> {
    pub value: T,
    pub message: Option<String>,
}

impl<T> Constraint<T> {
    pub fn new(value: T) -> Self {
        Self { value, message: None }
    }

    pub fn with_message(value: T, message: impl Into<String>) -> Self {
        Self {
            value,
            message: Some(message.into()),
        }
    }
}

impl<T> From<T> for Constraint<T> {
    fn from(value: T) -> Self {
        Constraint::new(value)
    }
}

/// A field default: literal value or zero-argument producer.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    Producer(DefaultFn),
}

/// Required-ness of a field, with an optional custom message. The
/// predicate form is evaluated lazily when errors are retrieved, because
/// required-ness can depend on other fields' current values.
#[derive(Clone, Default)]
pub enum Required {
    #[default]
    No,
    Always(Option<String>),
    When(RequiredFn, Option<String>),
}

impl Required {
    pub fn yes() -> Self {
        Required::Always(None)
    }
}

/// Nested object type: an inline sub-schema declaration, or a reference to
/// an already-compiled model (never re-compiled).
#[derive(Clone)]
pub enum ObjectDecl {
    Schema(SchemaDecl),
    Model(Rc<Model>),
}

/// One field declaration in any of its accepted shapes.
#[derive(Clone)]
pub enum FieldDecl {
    /// Bare type reference: `"number"`.
    Type(TypeName),
    /// Properties block: `{type, ...constraints}`.
    Props(Box<FieldProps>),
    /// Nested plain schema object, auto-compiled into a sub-schema.
    Schema(SchemaDecl),
    /// Array literal: `[]` (untyped) or `[X]` (typed element).
    Array(Option<Box<FieldDecl>>),
    /// Pre-compiled model reference, used verbatim as the nested type.
    Model(Rc<Model>),
}

impl From<TypeName> for FieldDecl {
    fn from(t: TypeName) -> Self {
        FieldDecl::Type(t)
    }
}

impl From<FieldProps> for FieldDecl {
    fn from(p: FieldProps) -> Self {
        FieldDecl::Props(Box::new(p))
    }
}

impl From<SchemaDecl> for FieldDecl {
    fn from(s: SchemaDecl) -> Self {
        FieldDecl::Schema(s)
    }
}

impl From<Rc<Model>> for FieldDecl {
    fn from(m: Rc<Model>) -> Self {
        FieldDecl::Model(m)
    }
}

/// Full properties block for one field.
#[derive(Clone, Default)]
pub struct FieldProps {
    pub type_name: Option<TypeName>,
    pub object_type: Option<ObjectDecl>,
    pub array_type: Option<Box<FieldDecl>>,
    pub alias: Option<String>,
    pub min: Option<Constraint<f64>>,
    pub max: Option<Constraint<f64>>,
    pub min_length: Option<Constraint<usize>>,
    pub max_length: Option<Constraint<usize>>,
    pub regex: Option<Constraint<Regex>>,
    pub enum_values: Option<Constraint<Vec<String>>>,
    pub clip: bool,
    pub unique: bool,
    pub filter: Option<FilterHook>,
    pub transform: Option<TransformHook>,
    pub string_transform: Option<StringTransform>,
    pub number_transform: Option<NumberTransform>,
    pub boolean_transform: Option<BooleanTransform>,
    pub date_transform: Option<DateTransform>,
    pub getter: Option<GetterHook>,
    pub default: Option<DefaultValue>,
    pub read_only: bool,
    pub invisible: bool,
    pub required: Required,
}

impl FieldProps {
    pub fn string() -> Self {
        Self {
            type_name: Some(TypeName::String),
            ..Self::default()
        }
    }

    pub fn number() -> Self {
        Self {
            type_name: Some(TypeName::Number),
            ..Self::default()
        }
    }

    pub fn boolean() -> Self {
        Self {
            type_name: Some(TypeName::Boolean),
            ..Self::default()
        }
    }

    pub fn date() -> Self {
        Self {
            type_name: Some(TypeName::Date),
            ..Self::default()
        }
    }

    pub fn any() -> Self {
        Self {
            type_name: Some(TypeName::Any),
            ..Self::default()
        }
    }

    /// Array field with the given element declaration.
    pub fn array_of(element: impl Into<FieldDecl>) -> Self {
        Self {
            array_type: Some(Box::new(element.into())),
            ..Self::default()
        }
    }

    /// Object field governed by an inline sub-schema.
    pub fn object_of(schema: SchemaDecl) -> Self {
        Self {
            object_type: Some(ObjectDecl::Schema(schema)),
            ..Self::default()
        }
    }

    /// Object field governed by a pre-compiled model.
    pub fn object_model(model: Rc<Model>) -> Self {
        Self {
            object_type: Some(ObjectDecl::Model(model)),
            ..Self::default()
        }
    }

    /// Object field without a nested schema; any object value is accepted
    /// as-is.
    pub fn object() -> Self {
        Self {
            type_name: Some(TypeName::Object),
            ..Self::default()
        }
    }

    /// Alias field redirecting to the target field.
    pub fn aliased(target: impl Into<String>) -> Self {
        Self {
            alias: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn min(mut self, v: impl Into<Constraint<f64>>) -> Self {
        self.min = Some(v.into());
        self
    }

    pub fn max(mut self, v: impl Into<Constraint<f64>>) -> Self {
        self.max = Some(v.into());
        self
    }

    pub fn min_length(mut self, v: impl Into<Constraint<usize>>) -> Self {
        self.min_length = Some(v.into());
        self
    }

    pub fn max_length(mut self, v: impl Into<Constraint<usize>>) -> Self {
        self.max_length = Some(v.into());
        self
    }

    pub fn regex(mut self, v: impl Into<Constraint<Regex>>) -> Self {
        self.regex = Some(v.into());
        self
    }

    pub fn enum_values(mut self, v: impl Into<Constraint<Vec<String>>>) -> Self {
        self.enum_values = Some(v.into());
        self
    }

    pub fn clip(mut self) -> Self {
        self.clip = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn filter(mut self, f: FilterHook) -> Self {
        self.filter = Some(f);
        self
    }

    pub fn transform(mut self, f: TransformHook) -> Self {
        self.transform = Some(f);
        self
    }

    pub fn string_transform(mut self, f: StringTransform) -> Self {
        self.string_transform = Some(f);
        self
    }

    pub fn number_transform(mut self, f: NumberTransform) -> Self {
        self.number_transform = Some(f);
        self
    }

    pub fn boolean_transform(mut self, f: BooleanTransform) -> Self {
        self.boolean_transform = Some(f);
        self
    }

    pub fn date_transform(mut self, f: DateTransform) -> Self {
        self.date_transform = Some(f);
        self
    }

    pub fn getter(mut self, f: GetterHook) -> Self {
        self.getter = Some(f);
        self
    }

    pub fn default_value(mut self, v: Value) -> Self {
        self.default = Some(DefaultValue::Literal(v));
        self
    }

    pub fn default_producer(mut self, f: DefaultFn) -> Self {
        self.default = Some(DefaultValue::Producer(f));
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn invisible(mut self) -> Self {
        self.invisible = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = Required::Always(None);
        self
    }

    pub fn required_message(mut self, message: impl Into<String>) -> Self {
        self.required = Required::Always(Some(message.into()));
        self
    }

    pub fn required_when(mut self, predicate: RequiredFn) -> Self {
        self.required = Required::When(predicate, None);
        self
    }
}

/// Ordered raw schema declaration: field name to declaration form.
#[derive(Clone, Default)]
pub struct SchemaDecl {
    fields: IndexMap<String, FieldDecl>,
}

impl SchemaDecl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn field(mut self, name: impl Into<String>, decl: impl Into<FieldDecl>) -> Self {
        self.fields.insert(name.into(), decl.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, decl: impl Into<FieldDecl>) {
        self.fields.insert(name.into(), decl.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldDecl)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Deep-merges additions onto this declaration: nested plain schemas
    /// merge recursively, everything else is replaced by the addition.
    pub fn merge(&self, additions: &SchemaDecl) -> SchemaDecl {
        let mut merged = self.clone();
        for (name, addition) in additions.iter() {
            let combined = match (merged.fields.get(name), addition) {
                (Some(FieldDecl::Schema(base)), FieldDecl::Schema(add)) => {
                    FieldDecl::Schema(base.merge(add))
                }
                _ => addition.clone(),
            };
            merged.fields.insert(name.clone(), combined);
        }
        merged
    }

    /// Parses a schema declaration written as plain JSON. Hooks cannot be
    /// expressed in this form; everything else can:
    ///
    /// ```json
    /// {
    ///   "name": { "type": "string", "minLength": 2 },
    ///   "age": "number",
    ///   "tags": [{ "type": "string", "maxLength": 5 }],
    ///   "address": { "city": "string", "zip": "string" }
    /// }
    /// ```
    pub fn from_json(value: &Value) -> CompileResult<SchemaDecl> {
        let obj = value.as_object().ok_or_else(|| CompileError::InvalidDeclaration {
            field: "$root".into(),
            reason: "schema declaration must be a JSON object".into(),
        })?;
        let mut decl = SchemaDecl::new();
        for (name, field) in obj {
            decl.insert(name.clone(), field_from_json(name, field)?);
        }
        Ok(decl)
    }
}

fn field_from_json(name: &str, value: &Value) -> CompileResult<FieldDecl> {
    match value {
        Value::String(tag) => {
            let type_name = TypeName::parse(tag).ok_or_else(|| CompileError::InvalidDeclaration {
                field: name.to_string(),
                reason: format!("unknown type '{}'", tag),
            })?;
            Ok(FieldDecl::Type(type_name))
        }
        Value::Array(items) => match items.as_slice() {
            [] => Ok(FieldDecl::Array(None)),
            [element] => Ok(FieldDecl::Array(Some(Box::new(field_from_json(name, element)?)))),
            _ => Err(CompileError::InvalidDeclaration {
                field: name.to_string(),
                reason: "array literal takes at most one element declaration".into(),
            }),
        },
        Value::Object(map) => {
            // A "type" key holding a recognized tag marks a properties
            // block; any other object is a nested plain schema.
            match map.get("type") {
                Some(Value::String(tag)) if TypeName::parse(tag).is_some() => {
                    props_from_json(name, map)
                }
                Some(Value::Object(_)) => {
                    let nested = SchemaDecl::from_json(map.get("type").unwrap_or(&Value::Null))?;
                    Ok(FieldDecl::Props(Box::new(FieldProps::object_of(nested))))
                }
                Some(other) if map.len() == 1 => Err(CompileError::InvalidDeclaration {
                    field: name.to_string(),
                    reason: format!("unsupported type declaration: {}", other),
                }),
                _ if map.contains_key("alias") => props_from_json(name, map),
                _ => Ok(FieldDecl::Schema(SchemaDecl::from_json(value)?)),
            }
        }
        other => Err(CompileError::InvalidDeclaration {
            field: name.to_string(),
            reason: format!("unsupported declaration: {}", other),
        }),
    }
}

fn props_from_json(
    name: &str,
    map: &serde_json::Map<String, Value>,
) -> CompileResult<FieldDecl> {
    let mut props = FieldProps::default();
    for (key, raw) in map {
        match key.as_str() {
            "type" => {
                if let Value::String(tag) = raw {
                    props.type_name = TypeName::parse(tag);
                }
            }
            "alias" => {
                props.alias = Some(string_prop(name, key, raw)?);
            }
            "min" => {
                let (value, message) = pair_prop(raw);
                props.min = Some(constraint_f64(name, key, value, message)?);
            }
            "max" => {
                let (value, message) = pair_prop(raw);
                props.max = Some(constraint_f64(name, key, value, message)?);
            }
            "minLength" => {
                let (value, message) = pair_prop(raw);
                props.min_length = Some(constraint_usize(name, key, value, message)?);
            }
            "maxLength" => {
                let (value, message) = pair_prop(raw);
                props.max_length = Some(constraint_usize(name, key, value, message)?);
            }
            "regex" => {
                let (value, message) = pair_prop(raw);
                let pattern = value.as_str().ok_or_else(|| invalid(name, key, value))?;
                let regex = Regex::new(pattern).map_err(|e| CompileError::InvalidDeclaration {
                    field: name.to_string(),
                    reason: format!("invalid regex: {}", e),
                })?;
                props.regex = Some(Constraint { value: regex, message });
            }
            "enum" => {
                let (value, message) = pair_prop(raw);
                let items = value.as_array().ok_or_else(|| invalid(name, key, value))?;
                let members = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).ok_or_else(|| invalid(name, key, v)))
                    .collect::<CompileResult<Vec<_>>>()?;
                props.enum_values = Some(Constraint { value: members, message });
            }
            "clip" => props.clip = bool_prop(name, key, raw)?,
            "unique" => props.unique = bool_prop(name, key, raw)?,
            "readOnly" => props.read_only = bool_prop(name, key, raw)?,
            "invisible" => props.invisible = bool_prop(name, key, raw)?,
            "default" => props.default = Some(DefaultValue::Literal(raw.clone())),
            "required" => {
                let (value, message) = pair_prop(raw);
                if bool_prop(name, key, value)? {
                    props.required = Required::Always(message);
                }
            }
            other => {
                return Err(CompileError::InvalidDeclaration {
                    field: name.to_string(),
                    reason: format!("unrecognized property '{}'", other),
                });
            }
        }
    }
    Ok(FieldDecl::Props(Box::new(props)))
}

/// Splits the `[value, customMessage]` pair form; a bare value carries no
/// custom message.
fn pair_prop(raw: &Value) -> (&Value, Option<String>) {
    if let Value::Array(items) = raw {
        if items.len() == 2 {
            if let Value::String(message) = &items[1] {
                return (&items[0], Some(message.clone()));
            }
        }
    }
    (raw, None)
}

fn constraint_f64(
    field: &str,
    key: &str,
    value: &Value,
    message: Option<String>,
) -> CompileResult<Constraint<f64>> {
    let v = value.as_f64().ok_or_else(|| invalid(field, key, value))?;
    Ok(Constraint { value: v, message })
}

fn constraint_usize(
    field: &str,
    key: &str,
    value: &Value,
    message: Option<String>,
) -> CompileResult<Constraint<usize>> {
    let v = value.as_u64().ok_or_else(|| invalid(field, key, value))? as usize;
    Ok(Constraint { value: v, message })
}

fn bool_prop(field: &str, key: &str, value: &Value) -> CompileResult<bool> {
    value.as_bool().ok_or_else(|| invalid(field, key, value))
}

fn string_prop(field: &str, key: &str, value: &Value) -> CompileResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(field, key, value))
}

fn invalid(field: &str, key: &str, value: &Value) -> CompileError {
    CompileError::InvalidDeclaration {
        field: field.to_string(),
        reason: format!("invalid value for '{}': {}", key, value),
    }
}
