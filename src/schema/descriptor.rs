//! Compiled field descriptors.
//!
//! A `FieldDescriptor` is the canonical, immutable form of one declared
//! field: a tagged kind plus the constraints and hooks relevant to it.
//! Descriptors are built once at compile time, wrapped in `Rc`, and shared
//! read-only by every instance of the model.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::decl::{
    BooleanTransform, Constraint, DateTransform, DefaultValue, FilterHook, GetterHook,
    NumberTransform, Required, StringTransform, TransformHook,
};
use crate::model::Model;

/// Tagged field kind, resolved once at compile time so field access never
/// re-inspects the raw declaration.
#[derive(Clone)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    /// Ordered sequence with a compiled element descriptor.
    Array(Rc<FieldDescriptor>),
    /// Nested schema-governed instance, or `None` for an object field
    /// without a nested schema (any object value accepted as-is).
    Object(Option<Rc<Model>>),
    /// Storage-less redirection to the named target field.
    Alias(String),
    /// Passthrough, no casting.
    Any,
}

/// Compiled, immutable representation of one schema field.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub min: Option<Constraint<f64>>,
    pub max: Option<Constraint<f64>>,
    pub min_length: Option<Constraint<usize>>,
    pub max_length: Option<Constraint<usize>>,
    pub regex: Option<Constraint<regex::Regex>>,
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

impl FieldDescriptor {
    /// Bare descriptor of the given kind with no constraints.
    pub(crate) fn bare(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            regex: None,
            enum_values: None,
            clip: false,
            unique: false,
            filter: None,
            transform: None,
            string_transform: None,
            number_transform: None,
            boolean_transform: None,
            date_transform: None,
            getter: None,
            default: None,
            read_only: false,
            invisible: false,
            required: Required::No,
        }
    }

    /// Descriptor for a dynamically admitted unknown key (`any`-typed).
    pub(crate) fn any(name: impl Into<String>) -> Self {
        Self::bare(name, FieldKind::Any)
    }

    /// Returns the lowercase type tag for this field.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Array(_) => "array",
            FieldKind::Object(_) => "object",
            FieldKind::Alias(_) => "alias",
            FieldKind::Any => "any",
        }
    }
}

// Hooks are closures; Debug shows the structural parts only.
impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("type", &self.type_name())
            .field("read_only", &self.read_only)
            .field("invisible", &self.invisible)
            .finish_non_exhaustive()
    }
}

/// Compiled schema: declaration-ordered mapping of field name to shared
/// descriptor. Shared by reference across every instance of one model and
/// never mutated after compilation.
pub struct Schema {
    pub(crate) fields: IndexMap<String, Rc<FieldDescriptor>>,
}

impl Schema {
    pub fn get(&self, name: &str) -> Option<&Rc<FieldDescriptor>> {
        self.fields.get(name)
    }

    /// Resolves a field name, optionally case-insensitively. Returns the
    /// canonical name alongside the descriptor.
    pub fn resolve(&self, name: &str, ignore_case: bool) -> Option<(&str, &Rc<FieldDescriptor>)> {
        if let Some((key, desc)) = self.fields.get_key_value(name) {
            return Some((key.as_str(), desc));
        }
        if ignore_case {
            return self
                .fields
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(key, desc)| (key.as_str(), desc));
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Rc<FieldDescriptor>)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|(k, d)| (k, d.type_name())))
            .finish()
    }
}
