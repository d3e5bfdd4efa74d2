//! Factory-level configuration.
//!
//! One `Options` value is built when a `Model` is created, wrapped in `Rc`,
//! and shared read-only by every instance the model produces. `extend`
//! never mutates a base model's options; it merges an `OptionsPatch` into a
//! fresh copy for the derived model.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::instance::Instance;

/// Before-write hook: `(field name, cast value) -> allow`. Returning
/// `false` vetoes the write outright; nothing is stored or logged.
pub type VetoHook = Rc<dyn Fn(&str, &Value) -> bool>;

/// After-write notification hook: `(field name,
/// stored value)`.
pub type NotifyHook = Rc<dyn Fn(&str, &Value)>;

/// Post-serialize hook applied to the finished `to_object` snapshot.
pub type SerializeHook = Rc<dyn Fn(Value) -> Value>;

/// Construction hook: `(instance, initial values, default behavior)`. The
/// third argument is the default shallow-populate routine; an overriding
/// hook delegates to it explicitly instead of reaching through a reserved
/// slot.
pub type ConstructHook =
    Rc<dyn Fn(&mut Instance, Option<&Value>, &dyn Fn(&mut Instance, Option<&Value>))>;

/// Per-factory method, invoked through `Instance::invoke`.
pub type MethodHook = Rc<dyn Fn(&mut Instance, &[Value]) -> Value>;

/// Shared, immutable model configuration.
#[derive(Clone, Default)]
pub struct Options {
    /// Reject writes to undeclared fields instead of admitting them
    /// dynamically as `any`-typed fields. On by default.
    pub strict: bool,
    /// Enable dotted-path addressing in `get`/`set`.
    pub dot_notation: bool,
    /// Include absent fields (as null) and empty containers in serialized
    /// output.
    pub set_undefined: bool,
    /// Store assigned nulls instead of coercing null to absent.
    pub preserve_null: bool,
    /// Resolve field names case-insensitively.
    pub keys_ignore_case: bool,
    /// Evaluate required predicates of nested instances against the
    /// outermost (root) instance.
    pub inherit_root_this: bool,
    /// A present-but-falsy value satisfies a required constraint.
    pub allow_falsy_values: bool,
    /// Parse numeric strings with comma as the decimal separator and point
    /// as the digit-group separator.
    pub use_decimal_number_group_separator: bool,
    /// Before-write veto hook.
    pub on_before_value_set: Option<VetoHook>,
    /// After-write notification hook.
    pub on_value_set: Option<NotifyHook>,
    /// Post-serialize transform applied by `to_object`.
    pub to_object: Option<SerializeHook>,
    /// Construction hook overriding the default shallow populate.
    pub construct: Option<ConstructHook>,
    /// Per-factory methods, invoked through `Instance::invoke`.
    pub methods: IndexMap<String, MethodHook>,
}

impl Options {
    /// Returns the default configuration: strict mode on, everything else
    /// off.
    pub fn new() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// Merges a patch onto this configuration, producing the derived
    /// model's options. Flags and hooks present in the patch override the
    /// base; methods are merged by name with patch entries winning.
    pub fn merged(&self, patch: &OptionsPatch) -> Options {
        let mut methods = self.methods.clone();
        for (name, hook) in &patch.methods {
            methods.insert(name.clone(), Rc::clone(hook));
        }
        Options {
            strict: patch.strict.unwrap_or(self.strict),
            dot_notation: patch.dot_notation.unwrap_or(self.dot_notation),
            set_undefined: patch.set_undefined.unwrap_or(self.set_undefined),
            preserve_null: patch.preserve_null.unwrap_or(self.preserve_null),
            keys_ignore_case: patch.keys_ignore_case.unwrap_or(self.keys_ignore_case),
            inherit_root_this: patch.inherit_root_this.unwrap_or(self.inherit_root_this),
            allow_falsy_values: patch.allow_falsy_values.unwrap_or(self.allow_falsy_values),
            use_decimal_number_group_separator: patch
                .use_decimal_number_group_separator
                .unwrap_or(self.use_decimal_number_group_separator),
            on_before_value_set: patch
                .on_before_value_set
                .clone()
                .or_else(|| self.on_before_value_set.clone()),
            on_value_set: patch.on_value_set.clone().or_else(|| self.on_value_set.clone()),
            to_object: patch.to_object.clone().or_else(|| self.to_object.clone()),
            construct: patch.construct.clone().or_else(|| self.construct.clone()),
            methods,
        }
    }

    /// Returns a copy with the post-serialize hook stripped. Nested
    /// sub-schemas inherit the parent options except this hook.
    pub(crate) fn for_nested(&self) -> Options {
        let mut opts = self.clone();
        opts.to_object = None;
        opts
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("strict", &self.strict)
            .field("dot_notation", &self.dot_notation)
            .field("set_undefined", &self.set_undefined)
            .field("preserve_null", &self.preserve_null)
            .field("keys_ignore_case", &self.keys_ignore_case)
            .field("inherit_root_this", &self.inherit_root_this)
            .field("allow_falsy_values", &self.allow_falsy_values)
            .field(
                "use_decimal_number_group_separator",
                &self.use_decimal_number_group_separator,
            )
            .field("on_before_value_set", &self.on_before_value_set.is_some())
            .field("on_value_set", &self.on_value_set.is_some())
            .field("to_object", &self.to_object.is_some())
            .field("construct", &self.construct.is_some())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Partial options for `Model::extend`: every field optional, merged onto
/// the base model's options.
#[derive(Clone, Default)]
pub struct OptionsPatch {
    pub strict: Option<bool>,
    pub dot_notation: Option<bool>,
    pub set_undefined: Option<bool>,
    pub preserve_null: Option<bool>,
    pub keys_ignore_case: Option<bool>,
    pub inherit_root_this: Option<bool>,
    pub allow_falsy_values: Option<bool>,
    pub use_decimal_number_group_separator: Option<bool>,
    pub on_before_value_set: Option<VetoHook>,
    pub on_value_set: Option<NotifyHook>,
    pub to_object: Option<SerializeHook>,
    pub construct: Option<ConstructHook>,
    pub methods: IndexMap<String, MethodHook>,
}

impl OptionsPatch {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_strict() {
        let opts = Options::new();
        assert!(opts.strict);
        assert!(!opts.dot_notation);
        assert!(!opts.set_undefined);
        assert!(!opts.preserve_null);
        assert!(!opts.allow_falsy_values);
    }

    #[test]
    fn merge_overrides_only_patched_flags() {
        let base = Options {
            strict: true,
            dot_notation: true,
            ..Options::default()
        };
        let patch = OptionsPatch {
            strict: Some(false),
            ..OptionsPatch::default()
        };
        let merged = base.merged(&patch);
        assert!(!merged.strict);
        assert!(merged.dot_notation);
    }

    #[test]
    fn merge_combines_method_maps() {
        let mut base = Options::new();
        base.methods
            .insert("a".into(), Rc::new(|_: &mut Instance, _: &[Value]| Value::Null) as MethodHook);
        let mut patch = OptionsPatch::new();
        patch
            .methods
            .insert("b".into(), Rc::new(|_: &mut Instance, _: &[Value]| Value::Null) as MethodHook);
        let merged = base.merged(&patch);
        assert!(merged.methods.contains_key("a"));
        assert!(merged.methods.contains_key("b"));
    }

    #[test]
    fn nested_options_drop_serialize_hook() {
        let mut base = Options::new();
        base.to_object = Some(Rc::new(|v| v) as SerializeHook);
        base.dot_notation = true;
        let nested = base.for_nested();
        assert!(nested.to_object.is_none());
        assert!(nested.dot_notation);
    }
}
