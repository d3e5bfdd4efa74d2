//! Schema-governed object instances.
//!
//! An instance owns its raw value store and error log; the compiled
//! schema and options are shared read-only with every sibling instance of
//! the same model. Field access runs through one uniform accessor pair:
//! writes flow through the typecast engine and either store the canonical
//! value or append an error record, reads lazily materialize container
//! fields and apply the post-read getter hook. A write never returns an
//! error to the caller.

use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::array::TypedArray;
use crate::cast::{self, CastFailure};
use crate::error::{ErrorCode, FieldError};
use crate::model::Model;
use crate::options::Options;
use crate::schema::{DefaultValue, FieldDescriptor, FieldKind, GetterHook, Required, Schema};
use crate::value::FieldValue;

/// A live, schema-governed object.
#[derive(Clone)]
pub struct Instance {
    schema: Rc<Schema>,
    options: Rc<Options>,
    values: indexmap::IndexMap<String, FieldValue>,
    /// Unknown keys admitted under non-strict mode, as `any`-typed fields
    /// local to this instance; the shared schema is never touched.
    extra: indexmap::IndexMap<String, Rc<FieldDescriptor>>,
    errors: Vec<FieldError>,
}

impl Instance {
    pub(crate) fn bind(schema: Rc<Schema>, options: Rc<Options>) -> Self {
        Self {
            schema,
            options,
            values: indexmap::IndexMap::new(),
            extra: indexmap::IndexMap::new(),
            errors: Vec::new(),
        }
    }

    /// The shared compiled schema.
    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    /// The shared model options.
    pub fn options(&self) -> &Rc<Options> {
        &self.options
    }

    /// Declared field names followed by dynamically admitted ones.
    pub fn field_names(&self) -> Vec<String> {
        self.schema
            .iter()
            .map(|(name, _)| name.clone())
            .chain(self.extra.keys().cloned())
            .collect()
    }

    /// True when the field currently holds a value.
    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Assigns a field. Never fails from the caller's perspective: a
    /// rejected input appends one error record and leaves the prior value
    /// unchanged; an undeclared name is admitted as an `any`-typed field
    /// (non-strict) or dropped (strict).
    pub fn set(&mut self, name: &str, value: Value) {
        if self.options.dot_notation && name.contains('.') {
            return self.set_path(name, value);
        }
        let (canonical, desc) = match self.resolve(name) {
            Some(found) => found,
            None => {
                if self.options.strict {
                    tracing::debug!(field = name, "dropped write to undeclared field");
                    return;
                }
                let desc = Rc::new(FieldDescriptor::any(name));
                self.extra.insert(name.to_string(), Rc::clone(&desc));
                (name.to_string(), desc)
            }
        };
        self.write_field(&canonical, &desc, value, false);
    }

    /// Bulk-assigns each key of an object through its field setter.
    pub fn populate(&mut self, values: Value) {
        if let Value::Object(map) = values {
            for (name, value) in map {
                self.set(&name, value);
            }
        }
    }

    /// Dotted-path assignment, traversing nested object fields. Each hop
    /// and the final write go through the regular per-field pipeline.
    pub fn set_path(&mut self, path: &str, value: Value) {
        match path.split_once('.') {
            None => {
                let (canonical, desc) = match self.resolve(path) {
                    Some(found) => found,
                    None => {
                        if self.options.strict {
                            tracing::debug!(field = path, "dropped write to undeclared field");
                            return;
                        }
                        let desc = Rc::new(FieldDescriptor::any(path));
                        self.extra.insert(path.to_string(), Rc::clone(&desc));
                        (path.to_string(), desc)
                    }
                };
                self.write_field(&canonical, &desc, value, false);
            }
            Some((head, rest)) => match self.object_mut(head) {
                Some(nested) => nested.set_path(rest, value),
                None => {
                    tracing::debug!(path, "dotted path does not traverse an object field");
                }
            },
        }
    }

    fn write_field(
        &mut self,
        name: &str,
        desc: &Rc<FieldDescriptor>,
        input: Value,
        suspend_read_only: bool,
    ) {
        if desc.read_only && !suspend_read_only {
            return;
        }
        match &desc.kind {
            FieldKind::Alias(target) => {
                // The alias's own transform composes with the target's
                // pipeline; storage belongs entirely to the target.
                let input = match &desc.transform {
                    Some(transform) => transform(input),
                    None => input,
                };
                if let Some((target_name, target_desc)) = self.resolve(target) {
                    self.write_field(&target_name, &target_desc, input, suspend_read_only);
                }
            }
            FieldKind::Array(element) => {
                // Container casting repopulates the destination in place,
                // so the veto runs on the raw input.
                if !self.veto_allows(name, &input) {
                    return;
                }
                let list = match cast::enumerate_list(input) {
                    Ok(list) => list,
                    Err(failure) => return self.log_rejection(name, desc, failure),
                };
                let element = Rc::clone(element);
                self.ensure_array(name, desc, &element);
                let rendered = match self.values.get_mut(name) {
                    Some(FieldValue::Array(arr)) => {
                        arr.clear();
                        arr.push(list);
                        Value::Array(arr.to_array())
                    }
                    _ => return,
                };
                self.notify_set(name, &rendered);
            }
            FieldKind::Object(Some(_)) => {
                if !self.veto_allows(name, &input) {
                    return;
                }
                if input.is_object() {
                    // An existing nested instance keeps its identity: it
                    // is cleared, then repopulated key-by-key.
                    if let Some(FieldValue::Object(nested)) = self.values.get_mut(name) {
                        nested.clear();
                        nested.populate(input);
                        let rendered = self
                            .values
                            .get(name)
                            .map(FieldValue::to_value)
                            .unwrap_or(Value::Null);
                        self.notify_set(name, &rendered);
                        return;
                    }
                }
                match cast::cast_value(input, desc, &self.options) {
                    Ok(Some(value)) => {
                        let rendered = value.to_value();
                        self.values.insert(name.to_string(), value);
                        self.notify_set(name, &rendered);
                    }
                    Ok(None) => {
                        self.values.shift_remove(name);
                        self.notify_set(name, &Value::Null);
                    }
                    Err(failure) => self.log_rejection(name, desc, failure),
                }
            }
            _ => {
                let previous = self.values.get(name).map(FieldValue::to_value);
                match cast::cast_value(input, desc, &self.options) {
                    Ok(result) => {
                        let rendered = result
                            .as_ref()
                            .map(FieldValue::to_value)
                            .unwrap_or(Value::Null);
                        if !self.veto_allows(name, &rendered) {
                            return;
                        }
                        match result {
                            Some(value) => {
                                self.values.insert(name.to_string(), value);
                            }
                            None => {
                                self.values.shift_remove(name);
                            }
                        }
                        self.notify_set(name, &rendered);
                    }
                    Err(failure) => {
                        self.log_rejection_with_previous(name, desc, failure, previous);
                    }
                }
            }
        }
    }

    fn veto_allows(&self, name: &str, value: &Value) -> bool {
        match &self.options.on_before_value_set {
            Some(hook) => hook(name, value),
            None => true,
        }
    }

    fn notify_set(&self, name: &str, value: &Value) {
        if let Some(hook) = &self.options.on_value_set {
            hook(name, value);
        }
    }

    fn log_rejection(&mut self, name: &str, desc: &Rc<FieldDescriptor>, failure: CastFailure) {
        let previous = self.values.get(name).map(FieldValue::to_value);
        self.log_rejection_with_previous(name, desc, failure, previous);
    }

    fn log_rejection_with_previous(
        &mut self,
        name: &str,
        desc: &Rc<FieldDescriptor>,
        failure: CastFailure,
        previous: Option<Value>,
    ) {
        tracing::debug!(
            field = name,
            code = failure.code.code(),
            "rejected field write"
        );
        self.errors.push(FieldError::new(
            failure.code,
            failure.message,
            name,
            failure.rejected,
            previous,
            Rc::clone(desc),
        ));
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Reads a field's canonical JSON view. Object and array fields
    /// materialize lazily on first access; the getter hook (when
    /// declared) transforms the returned value without persisting it.
    /// An unknown name reads as null.
    pub fn get(&mut self, name: &str) -> Value {
        if self.options.dot_notation && name.contains('.') {
            return self.get_path(name);
        }
        match self.resolve(name) {
            Some((canonical, desc)) => self.read_field(&canonical, &desc),
            None => Value::Null,
        }
    }

    /// Dotted-path read, traversing nested object fields.
    pub fn get_path(&mut self, path: &str) -> Value {
        match path.split_once('.') {
            None => match self.resolve(path) {
                Some((canonical, desc)) => self.read_field(&canonical, &desc),
                None => Value::Null,
            },
            Some((head, rest)) => match self.object_mut(head) {
                Some(nested) => nested.get_path(rest),
                None => Value::Null,
            },
        }
    }

    fn read_field(&mut self, name: &str, desc: &Rc<FieldDescriptor>) -> Value {
        if let FieldKind::Alias(target) = &desc.kind {
            let target = target.clone();
            let mut value = self.get(&target);
            if let Some(getter) = desc.getter.clone() {
                value = self.apply_getter(name, desc, &getter, value);
            }
            return value;
        }
        self.materialize(name, desc);
        let stored = self
            .values
            .get(name)
            .map(FieldValue::to_value)
            .unwrap_or(Value::Null);
        match desc.getter.clone() {
            Some(getter) => self.apply_getter(name, desc, &getter, stored),
            None => stored,
        }
    }

    fn apply_getter(
        &mut self,
        name: &str,
        desc: &Rc<FieldDescriptor>,
        getter: &GetterHook,
        value: Value,
    ) -> Value {
        match getter(value.clone()) {
            Ok(out) => out,
            Err(message) => {
                // Getter failures are captured, not propagated.
                self.errors.push(FieldError::new(
                    ErrorCode::GetterFailed,
                    Some(message),
                    name,
                    value.clone(),
                    None,
                    Rc::clone(desc),
                ));
                value
            }
        }
    }

    fn materialize(&mut self, name: &str, desc: &Rc<FieldDescriptor>) {
        if self.values.contains_key(name) {
            return;
        }
        match &desc.kind {
            FieldKind::Array(element) => {
                let element = Rc::clone(element);
                self.ensure_array(name, desc, &element);
            }
            FieldKind::Object(Some(model)) => {
                let nested = model.create();
                self.values.insert(name.to_string(), FieldValue::Object(nested));
            }
            FieldKind::Object(None) => {
                self.values.insert(
                    name.to_string(),
                    FieldValue::Raw(Value::Object(serde_json::Map::new())),
                );
            }
            _ => {}
        }
    }

    fn ensure_array(&mut self, name: &str, desc: &Rc<FieldDescriptor>, element: &Rc<FieldDescriptor>) {
        if !matches!(self.values.get(name), Some(FieldValue::Array(_))) {
            self.values.insert(
                name.to_string(),
                FieldValue::Array(TypedArray::new(
                    Rc::clone(element),
                    desc.unique,
                    desc.filter.clone(),
                    Rc::clone(&self.options),
                )),
            );
        }
    }

    /// Mutable access to an array field's wrapper, materializing it if
    /// unset. Follows aliases. Returns `None` for non-array fields.
    pub fn array_mut(&mut self, name: &str) -> Option<&mut TypedArray> {
        let (canonical, desc) = self.resolve(name)?;
        if let FieldKind::Alias(target) = &desc.kind {
            let target = target.clone();
            return self.array_mut(&target);
        }
        let FieldKind::Array(element) = &desc.kind else {
            return None;
        };
        let element = Rc::clone(element);
        self.ensure_array(&canonical, &desc, &element);
        match self.values.get_mut(&canonical) {
            Some(FieldValue::Array(arr)) => Some(arr),
            _ => None,
        }
    }

    /// Mutable access to a nested schema-governed instance, materializing
    /// it if unset. Follows aliases. Returns `None` for fields that are
    /// not nested-schema object fields.
    pub fn object_mut(&mut self, name: &str) -> Option<&mut Instance> {
        let (canonical, desc) = self.resolve(name)?;
        if let FieldKind::Alias(target) = &desc.kind {
            let target = target.clone();
            return self.object_mut(&target);
        }
        if !matches!(desc.kind, FieldKind::Object(Some(_))) {
            return None;
        }
        self.materialize(&canonical, &desc);
        match self.values.get_mut(&canonical) {
            Some(FieldValue::Object(nested)) => Some(nested),
            _ => None,
        }
    }

    /// The stored date for a date field, if set.
    pub fn date_of(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.values.get(name) {
            Some(FieldValue::Date(dt)) => Some(*dt),
            _ => None,
        }
    }

    fn resolve(&self, name: &str) -> Option<(String, Rc<FieldDescriptor>)> {
        if let Some((canonical, desc)) = self.schema.resolve(name, self.options.keys_ignore_case) {
            return Some((canonical.to_string(), Rc::clone(desc)));
        }
        if let Some((key, desc)) = self.extra.get_key_value(name) {
            return Some((key.clone(), Rc::clone(desc)));
        }
        if self.options.keys_ignore_case {
            return self
                .extra
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(key, desc)| (key.clone(), Rc::clone(desc)));
        }
        None
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Resets every non-alias field: nested object fields clear
    /// recursively (keeping their identity), array fields truncate,
    /// scalar fields become absent.
    pub fn clear(&mut self) {
        let fields: Vec<(String, Rc<FieldDescriptor>)> = self
            .schema
            .iter()
            .map(|(name, desc)| (name.clone(), Rc::clone(desc)))
            .chain(self.extra.iter().map(|(name, desc)| (name.clone(), Rc::clone(desc))))
            .collect();
        for (name, desc) in fields {
            if matches!(desc.kind, FieldKind::Alias(_)) {
                continue;
            }
            match self.values.get_mut(&name) {
                Some(FieldValue::Object(nested)) => nested.clear(),
                Some(FieldValue::Array(arr)) => arr.clear(),
                Some(_) => {
                    self.values.shift_remove(&name);
                }
                None => {}
            }
        }
    }

    /// Applies declared defaults with read-only suspended. Producer
    /// defaults are evaluated now, once per construction.
    pub(crate) fn apply_defaults(&mut self) {
        let fields: Vec<(String, Rc<FieldDescriptor>)> = self
            .schema
            .iter()
            .map(|(name, desc)| (name.clone(), Rc::clone(desc)))
            .collect();
        for (name, desc) in fields {
            let Some(default) = desc.default.clone() else {
                continue;
            };
            let value = match default {
                DefaultValue::Literal(v) => v,
                DefaultValue::Producer(producer) => producer(),
            };
            self.write_field(&name, &desc, value, true);
        }
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Builds a plain snapshot by reading every field through its getter
    /// (materializing lazy defaults), skipping invisible fields and
    /// absent values (unless `set_undefined`), recursing into nested
    /// instances and wrappers, and omitting resulting empty containers
    /// (unless `set_undefined`). The model's post-serialize hook, when
    /// declared, transforms the finished snapshot.
    pub fn to_object(&mut self) -> Value {
        let fields: Vec<(String, Rc<FieldDescriptor>)> = self
            .schema
            .iter()
            .map(|(name, desc)| (name.clone(), Rc::clone(desc)))
            .chain(self.extra.iter().map(|(name, desc)| (name.clone(), Rc::clone(desc))))
            .collect();
        let mut out = serde_json::Map::new();
        for (name, desc) in fields {
            if desc.invisible || matches!(desc.kind, FieldKind::Alias(_)) {
                continue;
            }
            let value = self.serialize_field(&name, &desc);
            let include = match &value {
                Value::Null => self.options.set_undefined,
                Value::Object(map) if map.is_empty() => self.options.set_undefined,
                Value::Array(items) if items.is_empty() => self.options.set_undefined,
                _ => true,
            };
            if include {
                out.insert(name, value);
            }
        }
        let mut snapshot = Value::Object(out);
        if let Some(hook) = self.options.to_object.clone() {
            snapshot = hook(snapshot);
        }
        snapshot
    }

    /// Alias for `to_object`.
    pub fn to_json(&mut self) -> Value {
        self.to_object()
    }

    fn serialize_field(&mut self, name: &str, desc: &Rc<FieldDescriptor>) -> Value {
        self.materialize(name, desc);
        let value = match self.values.get_mut(name) {
            Some(FieldValue::Object(nested)) => nested.to_object(),
            Some(FieldValue::Array(arr)) => Value::Array(
                arr.iter_mut()
                    .map(|element| match element {
                        FieldValue::Object(nested) => nested.to_object(),
                        other => other.to_value(),
                    })
                    .collect(),
            ),
            Some(other) => other.to_value(),
            None => Value::Null,
        };
        match desc.getter.clone() {
            Some(getter) => self.apply_getter(name, desc, &getter, value),
            None => value,
        }
    }

    /// Raw stored-value snapshot without materialization or hooks. Used
    /// for value equality (array uniqueness) and rendering.
    pub(crate) fn snapshot(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.values {
            map.insert(name.clone(), value.to_value());
        }
        Value::Object(map)
    }

    /// Constructs a new instance from the current serialized snapshot.
    pub fn clone_instance(&mut self) -> Instance {
        let snapshot = self.to_object();
        let mut clone = Instance::bind(Rc::clone(&self.schema), Rc::clone(&self.options));
        clone.apply_defaults();
        clone.populate(snapshot);
        clone
    }

    /// Invokes a per-factory method by name. Returns `None` when the
    /// model declares no such method.
    pub fn invoke(&mut self, name: &str, args: &[Value]) -> Option<Value> {
        let hook = self.options.methods.get(name).cloned()?;
        Some(hook(self, args))
    }

    // ------------------------------------------------------------------
    // Error inspection
    // ------------------------------------------------------------------

    /// Pending error records plus a synthesized missing-field error for
    /// every field whose required condition currently holds and whose
    /// value is absent (or falsy, unless `allow_falsy_values`). Recurses
    /// into nested instances, prefixing their field names with the parent
    /// field name.
    pub fn errors(&self) -> Vec<FieldError> {
        self.collect_errors("", self)
    }

    /// True when `errors()` would return at least one record.
    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    /// Discards pending error records, recursing into nested instances,
    /// including those held as array elements.
    pub fn clear_errors(&mut self) {
        self.errors.clear();
        for value in self.values.values_mut() {
            match value {
                FieldValue::Object(nested) => nested.clear_errors(),
                FieldValue::Array(arr) => {
                    for element in arr.iter_mut() {
                        if let FieldValue::Object(nested) = element {
                            nested.clear_errors();
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn collect_errors(&self, prefix: &str, root: &Instance) -> Vec<FieldError> {
        let mut out: Vec<FieldError> = self
            .errors
            .iter()
            .map(|error| error.with_prefix(prefix))
            .collect();

        for (name, desc) in self.schema.iter() {
            let message = match &desc.required {
                Required::No => continue,
                Required::Always(message) => message.clone(),
                Required::When(predicate, message) => {
                    // Under inherit_root_this the predicate sees the
                    // outermost instance of the hierarchy.
                    let context = if self.options.inherit_root_this { root } else { self };
                    if !predicate(context) {
                        continue;
                    }
                    message.clone()
                }
            };
            let missing = match self.values.get(name) {
                None => true,
                Some(value) => !self.options.allow_falsy_values && value.is_falsy(),
            };
            if missing {
                out.push(FieldError::new(
                    ErrorCode::RequiredMissing,
                    message,
                    join_path(prefix, name),
                    Value::Null,
                    None,
                    Rc::clone(desc),
                ));
            }
        }

        // Lazy materialization means an object field conceptually always
        // exists, so required detection must see nested schemas even when
        // no value is stored yet.
        for (name, desc) in self.schema.iter() {
            if self.values.contains_key(name) {
                continue;
            }
            if let FieldKind::Object(Some(model)) = &desc.kind {
                collect_unset_required(model, &join_path(prefix, name), root, &mut out);
            }
        }

        for (name, value) in &self.values {
            match value {
                FieldValue::Object(nested) => {
                    out.extend(nested.collect_errors(&join_path(prefix, name), root));
                }
                FieldValue::Array(arr) => {
                    for (index, element) in arr.iter().enumerate() {
                        if let FieldValue::Object(nested) = element {
                            let element_prefix =
                                format!("{}.{}", join_path(prefix, name), index);
                            out.extend(nested.collect_errors(&element_prefix, root));
                        }
                    }
                }
                _ => {}
            }
        }

        out
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Required violations of a nested schema field that has not materialized
/// yet. Fields with a declared default are skipped: materialization would
/// fill them. Conditional predicates evaluate against the root under
/// root-context inheritance, otherwise against an empty stand-in for the
/// instance that materialization would create.
fn collect_unset_required(
    model: &Rc<Model>,
    prefix: &str,
    root: &Instance,
    out: &mut Vec<FieldError>,
) {
    for (name, desc) in model.schema().iter() {
        if desc.default.is_some() {
            continue;
        }
        let message = match &desc.required {
            Required::No => None,
            Required::Always(message) => Some(message.clone()),
            Required::When(predicate, message) => {
                let stand_in;
                let context = if model.options().inherit_root_this {
                    root
                } else {
                    stand_in =
                        Instance::bind(Rc::clone(model.schema()), Rc::clone(model.options()));
                    &stand_in
                };
                if predicate(context) {
                    Some(message.clone())
                } else {
                    None
                }
            }
        };
        if let Some(message) = message {
            out.push(FieldError::new(
                ErrorCode::RequiredMissing,
                message,
                join_path(prefix, name),
                Value::Null,
                None,
                Rc::clone(desc),
            ));
        }
        if let FieldKind::Object(Some(nested)) = &desc.kind {
            collect_unset_required(nested, &join_path(prefix, name), root, out);
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("fields", &self.schema.len())
            .field("set", &self.values.keys().collect::<Vec<_>>())
            .field("errors", &self.errors.len())
            .finish()
    }
}
