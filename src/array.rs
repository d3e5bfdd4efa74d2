//! Typed array wrapper.
//!
//! An ordered, mutable sequence that intercepts every insertion: each
//! candidate is cast against the element descriptor, optionally filtered,
//! and optionally deduplicated before it is appended. The wrapper never
//! holds an element that has not passed the element pipeline.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::cast;
use crate::options::Options;
use crate::schema::{FieldDescriptor, FilterHook};
use crate::value::FieldValue;

/// Ordered sequence enforcing element casting, optional filtering, and
/// optional uniqueness on insertion.
#[derive(Clone)]
pub struct TypedArray {
    element: Rc<FieldDescriptor>,
    unique: bool,
    filter: Option<FilterHook>,
    options: Rc<Options>,
    items: Vec<FieldValue>,
}

impl TypedArray {
    pub(crate) fn new(
        element: Rc<FieldDescriptor>,
        unique: bool,
        filter: Option<FilterHook>,
        options: Rc<Options>,
    ) -> Self {
        Self {
            element,
            unique,
            filter,
            options,
            items: Vec::new(),
        }
    }

    /// Appends candidates, each routed through the element pipeline.
    /// Candidates the engine rejects (or that produce no value) are
    /// dropped, as are filtered and duplicate candidates; the returned
    /// count is the number actually appended, which may be smaller than
    /// the number given.
    pub fn push(&mut self, values: impl IntoIterator<Item = Value>) -> usize {
        let mut appended = 0;
        for candidate in values {
            match cast::cast_value(candidate, &self.element, &self.options) {
                Ok(Some(cast)) => {
                    let rendered = cast.to_value();
                    if let Some(filter) = &self.filter {
                        if !filter(&rendered) {
                            continue;
                        }
                    }
                    if self.unique && self.items.iter().any(|e| e.to_value() == rendered) {
                        continue;
                    }
                    self.items.push(cast);
                    appended += 1;
                }
                Ok(None) => {}
                Err(failure) => {
                    tracing::debug!(
                        code = failure.code.code(),
                        element = self.element.type_name(),
                        "dropped array element rejected by cast"
                    );
                }
            }
        }
        appended
    }

    /// Appends a single candidate; returns true when it was appended.
    pub fn push_one(&mut self, value: Value) -> bool {
        self.push([value]) == 1
    }

    /// Returns a new wrapper of the same element type holding this
    /// wrapper's elements followed by the given inputs. Array inputs are
    /// flattened one level; everything is re-inserted through `push`, so
    /// the result is re-cast, re-filtered, and re-deduplicated and can
    /// differ from naive structural concatenation.
    pub fn concat(&self, others: &[Value]) -> TypedArray {
        let mut out = TypedArray::new(
            Rc::clone(&self.element),
            self.unique,
            self.filter.clone(),
            Rc::clone(&self.options),
        );
        out.push(self.to_array());
        for other in others {
            match other {
                Value::Array(items) => {
                    out.push(items.clone());
                }
                single => {
                    out.push([single.clone()]);
                }
            }
        }
        out
    }

    /// Plain ordered snapshot. Nested instances and wrappers serialize
    /// recursively, other object elements are shallow-cloned. Not safe
    /// against reference cycles.
    pub fn to_array(&self) -> Vec<Value> {
        self.items.iter().map(FieldValue::to_value).collect()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.get(index).map(FieldValue::to_value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldValue> {
        self.items.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FieldValue> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Element descriptor this wrapper enforces.
    pub fn element(&self) -> &Rc<FieldDescriptor> {
        &self.element
    }
}

impl fmt::Debug for TypedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedArray")
            .field("element", &self.element.type_name())
            .field("unique", &self.unique)
            .field("len", &self.items.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldProps, SchemaDecl};
    use serde_json::json;

    fn wrapper(props: FieldProps, unique: bool, filter: Option<FilterHook>) -> TypedArray {
        let decl = SchemaDecl::new().field("e", props);
        let options = Rc::new(Options::new());
        let schema = crate::schema::compile(&decl, &options).unwrap();
        TypedArray::new(Rc::clone(schema.get("e").unwrap()), unique, filter, options)
    }

    #[test]
    fn push_casts_elements() {
        let mut arr = wrapper(FieldProps::number(), false, None);
        assert_eq!(arr.push([json!("1"), json!(2), json!(true)]), 3);
        assert_eq!(arr.to_array(), vec![json!(1), json!(2), json!(1)]);
    }

    #[test]
    fn rejected_elements_are_dropped_not_appended() {
        let mut arr = wrapper(FieldProps::string().max_length(5), false, None);
        assert!(arr.push_one(json!("hello")));
        assert!(!arr.push_one(json!("toolong")));
        assert_eq!(arr.len(), 1);
    }

    #[test]
    fn unique_drops_duplicates_by_value() {
        let mut arr = wrapper(FieldProps::number().unique(), true, None);
        assert_eq!(arr.push([json!(1), json!("1"), json!(2)]), 2);
        assert_eq!(arr.to_array(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn filter_drops_non_matching_candidates() {
        let filter: FilterHook = Rc::new(|v| v.as_i64().map_or(false, |n| n % 2 == 0));
        let mut arr = wrapper(FieldProps::number(), false, Some(filter));
        assert_eq!(arr.push([json!(1), json!(2), json!(3), json!(4)]), 2);
        assert_eq!(arr.to_array(), vec![json!(2), json!(4)]);
    }

    #[test]
    fn concat_revalidates_instead_of_structural_concatenation() {
        let mut arr = wrapper(FieldProps::string().max_length(5), false, None);
        arr.push([json!("one"), json!("two")]);
        // "toolong" fails the element pipeline during re-insertion.
        let combined = arr.concat(&[json!(["three", "toolong"]), json!("four")]);
        assert_eq!(
            combined.to_array(),
            vec![json!("one"), json!("two"), json!("three"), json!("four")]
        );
        // The source wrapper is untouched.
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn concat_dedupes_across_inputs_when_unique() {
        let mut arr = wrapper(FieldProps::number().unique(), true, None);
        arr.push([json!(1), json!(2)]);
        let combined = arr.concat(&[json!([2, 3, 1])]);
        assert_eq!(combined.to_array(), vec![json!(1), json!(2), json!(3)]);
    }
}
