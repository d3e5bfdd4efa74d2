//! Instance Invariant Tests
//!
//! End-to-end behavior of schema-governed instances:
//! - Writes cast to the canonical type or reject with a stable code
//! - A rejected write leaves the prior value standing
//! - Errors accumulate and never propagate to the caller
//! - Required fields synthesize missing-field errors on demand
//! - Serialization reflects only visible, present fields

use std::rc::Rc;

use serde_json::{json, Value};
use shapecast::{
    ErrorCode, ErrorKind, FieldProps, Instance, Model, Options, OptionsPatch, SchemaDecl,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn person_model() -> Model {
    Model::new(
        SchemaDecl::new()
            .field("name", FieldProps::string())
            .field("age", FieldProps::number().min(0.0).max(120.0)),
    )
    .unwrap()
}

// =============================================================================
// Cast-or-Reject Write Path
// =============================================================================

/// Numeric strings cast to numbers on assignment.
#[test]
fn test_write_casts_to_canonical_type() {
    let mut person = person_model().create();
    person.set("age", json!("36"));
    assert_eq!(person.get("age"), json!(36));
    person.set("name", json!(42));
    assert_eq!(person.get("name"), json!("42"));
}

/// An out-of-range value is rejected with one validation error and the
/// prior value stands.
#[test]
fn test_rejected_write_keeps_prior_value() {
    let mut person = person_model().create();
    person.set("age", json!(15));
    person.set("age", json!(-1));

    assert_eq!(person.get("age"), json!(15));
    let errors = person.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), ErrorCode::NumberMin);
    assert_eq!(errors[0].kind(), ErrorKind::Validation);
    assert_eq!(errors[0].field_name(), "age");
    assert_eq!(errors[0].rejected(), &json!(-1));
    assert_eq!(errors[0].previous(), Some(&json!(15)));
}

/// Errors accumulate across writes until cleared.
#[test]
fn test_errors_accumulate_and_clear() {
    let mut person = person_model().create();
    person.set("age", json!(-1));
    person.set("age", json!(200));
    assert_eq!(person.errors().len(), 2);

    person.clear_errors();
    assert!(!person.has_errors());
}

/// A write that fails the cast entirely records a cast-kind error.
#[test]
fn test_uncastable_input_records_cast_error() {
    let mut person = person_model().create();
    person.set("age", json!("not a number"));
    let errors = person.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), ErrorCode::NumberCast);
    assert_eq!(errors[0].kind(), ErrorKind::Cast);
    assert_eq!(person.get("age"), Value::Null);
}

// =============================================================================
// Required Fields
// =============================================================================

/// A required field with no value synthesizes a missing-field error; the
/// error disappears once the field is set.
#[test]
fn test_required_field_missing_until_set() {
    let model = Model::new(
        SchemaDecl::new().field("name", FieldProps::string().required()),
    )
    .unwrap();
    let mut person = model.create();

    let errors = person.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), ErrorCode::RequiredMissing);
    assert_eq!(errors[0].field_name(), "name");

    person.set("name", json!("Ada"));
    assert!(!person.has_errors());
}

/// A present-but-falsy value fails the required check unless falsy values
/// are allowed.
#[test]
fn test_required_rejects_falsy_unless_allowed() {
    let decl = SchemaDecl::new().field("name", FieldProps::string().required());

    let strict_falsy = Model::new(decl.clone()).unwrap();
    let mut person = strict_falsy.create();
    person.set("name", json!(""));
    assert!(person.has_errors());

    let mut options = Options::new();
    options.allow_falsy_values = true;
    let lenient = Model::with_options(decl, options).unwrap();
    let mut person = lenient.create();
    person.set("name", json!(""));
    assert!(!person.has_errors());
}

/// Nested required errors surface with dotted field names.
#[test]
fn test_nested_required_errors_are_prefixed() {
    let model = Model::new(
        SchemaDecl::new().field(
            "profile",
            FieldProps::object_of(
                SchemaDecl::new().field("email", FieldProps::string().required()),
            ),
        ),
    )
    .unwrap();
    let mut person = model.create();
    person.set("profile", json!({}));

    let errors = person.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field_name(), "profile.email");
}

/// A required field inside a nested schema is detected even before the
/// parent field is ever read or written.
#[test]
fn test_nested_required_detected_before_materialization() {
    let model = Model::new(
        SchemaDecl::new()
            .field("name", FieldProps::string())
            .field(
                "profile",
                FieldProps::object_of(
                    SchemaDecl::new().field("email", FieldProps::string().required()),
                ),
            ),
    )
    .unwrap();
    let mut person = model.create();

    let errors = person.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), ErrorCode::RequiredMissing);
    assert_eq!(errors[0].field_name(), "profile.email");

    person.set("profile", json!({ "email": "ada@example.com" }));
    assert!(!person.has_errors());
}

/// The unmaterialized walk honors nested defaults and recurses through
/// deeper schema levels.
#[test]
fn test_nested_required_walk_skips_defaults_and_recurses() {
    let model = Model::new(
        SchemaDecl::new().field(
            "profile",
            FieldProps::object_of(
                SchemaDecl::new()
                    .field(
                        "plan",
                        FieldProps::string().default_value(json!("free")).required(),
                    )
                    .field(
                        "contact",
                        FieldProps::object_of(
                            SchemaDecl::new().field("email", FieldProps::string().required()),
                        ),
                    ),
            ),
        ),
    )
    .unwrap();
    let person = model.create();

    // "plan" would take its default at materialization, so only the
    // deeper field reports.
    let errors = person.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field_name(), "profile.contact.email");
}

/// Conditional requirements evaluate against the root instance when
/// root-context inheritance is on.
#[test]
fn test_conditional_required_sees_root_with_inheritance() {
    let mut options = Options::new();
    options.inherit_root_this = true;
    let model = Model::with_options(
        SchemaDecl::new()
            .field("is_member", FieldProps::boolean())
            .field(
                "profile",
                FieldProps::object_of(SchemaDecl::new().field(
                    "member_id",
                    FieldProps::string()
                        .required_when(Rc::new(|root: &Instance| root.is_set("is_member"))),
                )),
            ),
        options,
    )
    .unwrap();

    let mut person = model.create();
    person.set("profile", json!({}));
    assert!(!person.has_errors());

    person.set("is_member", json!(true));
    let errors = person.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field_name(), "profile.member_id");
}

// =============================================================================
// Strict Mode and Dynamic Keys
// =============================================================================

/// Strict mode drops undeclared writes without recording an error.
#[test]
fn test_strict_mode_drops_unknown_keys_silently() {
    let mut person = person_model().create();
    person.set("nickname", json!("ada"));
    assert_eq!(person.get("nickname"), Value::Null);
    assert!(!person.has_errors());
}

/// Non-strict mode admits unknown keys as untyped fields local to the
/// instance; siblings are unaffected.
#[test]
fn test_non_strict_admits_unknown_keys_per_instance() {
    let mut options = Options::new();
    options.strict = false;
    let model = Model::with_options(
        SchemaDecl::new().field("name", FieldProps::string()),
        options,
    )
    .unwrap();

    let mut a = model.create();
    a.set("nickname", json!("ada"));
    assert_eq!(a.get("nickname"), json!("ada"));
    assert_eq!(a.to_object(), json!({ "nickname": "ada" }));

    let mut b = model.create();
    assert_eq!(b.get("nickname"), Value::Null);
}

/// Case-insensitive key resolution maps variant spellings onto the
/// declared field.
#[test]
fn test_keys_ignore_case_resolves_declared_names() {
    let mut options = Options::new();
    options.keys_ignore_case = true;
    let model = Model::with_options(
        SchemaDecl::new().field("firstName", FieldProps::string()),
        options,
    )
    .unwrap();
    let mut person = model.create();
    person.set("FIRSTNAME", json!("Ada"));
    assert_eq!(person.get("firstname"), json!("Ada"));
    assert_eq!(person.to_object(), json!({ "firstName": "Ada" }));
}

// =============================================================================
// Field Modifiers
// =============================================================================

/// Read-only fields ignore direct writes but still accept their default.
#[test]
fn test_read_only_ignores_writes_but_takes_default() {
    let model = Model::new(
        SchemaDecl::new().field(
            "kind",
            FieldProps::string().default_value(json!("person")).read_only(),
        ),
    )
    .unwrap();
    let mut person = model.create();
    assert_eq!(person.get("kind"), json!("person"));
    person.set("kind", json!("robot"));
    assert_eq!(person.get("kind"), json!("person"));
}

/// Invisible fields stay readable but never serialize.
#[test]
fn test_invisible_field_reads_but_does_not_serialize() {
    let model = Model::new(
        SchemaDecl::new()
            .field("name", FieldProps::string())
            .field("secret", FieldProps::string().invisible()),
    )
    .unwrap();
    let mut person = model.create_from(json!({ "name": "Ada", "secret": "s3cret" }));
    assert_eq!(person.get("secret"), json!("s3cret"));
    assert_eq!(person.to_object(), json!({ "name": "Ada" }));
}

/// Producer defaults are evaluated once per construction.
#[test]
fn test_producer_default_runs_per_instance() {
    use std::cell::Cell;
    let counter = Rc::new(Cell::new(0));
    let seen = Rc::clone(&counter);
    let model = Model::new(SchemaDecl::new().field(
        "seq",
        FieldProps::number().default_producer(Rc::new(move || {
            seen.set(seen.get() + 1);
            json!(seen.get())
        })),
    ))
    .unwrap();

    let mut first = model.create();
    let mut second = model.create();
    assert_eq!(first.get("seq"), json!(1));
    assert_eq!(second.get("seq"), json!(2));
    assert_eq!(counter.get(), 2);
}

// =============================================================================
// Null Handling and Serialization
// =============================================================================

/// Null coerces to absent by default, and is stored when nulls are
/// preserved.
#[test]
fn test_null_absent_by_default_stored_when_preserved() {
    let mut person = person_model().create();
    person.set("name", json!("Ada"));
    person.set("name", Value::Null);
    assert_eq!(person.get("name"), Value::Null);
    assert_eq!(person.to_object(), json!({}));

    let mut options = Options::new();
    options.preserve_null = true;
    options.set_undefined = true;
    let model = Model::with_options(
        SchemaDecl::new().field("name", FieldProps::string()),
        options,
    )
    .unwrap();
    let mut person = model.create();
    person.set("name", Value::Null);
    assert_eq!(person.to_object(), json!({ "name": null }));
}

/// Serialization round-trips: feeding a snapshot back through the factory
/// reproduces it.
#[test]
fn test_serialization_round_trips_through_construction() {
    let model = person_model();
    let mut person = model.create_from(json!({ "name": "Ada", "age": 36 }));
    let snapshot = person.to_object();
    let mut rebuilt = model.create_from(snapshot.clone());
    assert_eq!(rebuilt.to_object(), snapshot);
}

/// Clearing resets every field; nested instances keep identity but lose
/// content.
#[test]
fn test_clear_resets_fields() {
    let mut person = person_model().create_from(json!({ "name": "Ada", "age": 36 }));
    person.clear();
    assert_eq!(person.to_object(), json!({}));
}

/// An instance clone is an independent copy of the serialized state.
#[test]
fn test_clone_instance_is_independent() {
    let mut person = person_model().create_from(json!({ "name": "Ada", "age": 36 }));
    let mut copy = person.clone_instance();
    copy.set("age", json!(40));
    assert_eq!(person.get("age"), json!(36));
    assert_eq!(copy.get("age"), json!(40));
}

// =============================================================================
// Aliases and Dotted Paths
// =============================================================================

/// Writing through an alias is equivalent to writing the target; the
/// alias itself never serializes.
#[test]
fn test_alias_redirects_reads_and_writes() {
    let model = Model::new(
        SchemaDecl::new()
            .field("name", FieldProps::string())
            .field("fullName", FieldProps::aliased("name")),
    )
    .unwrap();
    let mut person = model.create();
    person.set("fullName", json!("Ada"));
    assert_eq!(person.get("name"), json!("Ada"));
    assert_eq!(person.get("fullName"), json!("Ada"));
    assert_eq!(person.to_object(), json!({ "name": "Ada" }));
}

/// Dotted paths write and read through nested object fields.
#[test]
fn test_dotted_paths_traverse_nested_objects() {
    let mut options = Options::new();
    options.dot_notation = true;
    let model = Model::with_options(
        SchemaDecl::new().field(
            "profile",
            FieldProps::object_of(SchemaDecl::new().field("email", FieldProps::string())),
        ),
        options,
    )
    .unwrap();
    let mut person = model.create();
    person.set("profile.email", json!("ada@example.com"));
    assert_eq!(person.get("profile.email"), json!("ada@example.com"));
    assert_eq!(
        person.to_object(),
        json!({ "profile": { "email": "ada@example.com" } })
    );
}

/// A dotted path through a non-object field is dropped, not an error.
#[test]
fn test_dotted_path_through_scalar_is_dropped() {
    let mut options = Options::new();
    options.dot_notation = true;
    let model = Model::with_options(
        SchemaDecl::new().field("name", FieldProps::string()),
        options,
    )
    .unwrap();
    let mut person = model.create();
    person.set("name.first", json!("Ada"));
    assert_eq!(person.get("name"), Value::Null);
    assert!(!person.has_errors());
}

// =============================================================================
// Hooks
// =============================================================================

/// The before-write veto rejects values without recording an error.
#[test]
fn test_veto_hook_blocks_writes() {
    let mut options = Options::new();
    options.on_before_value_set = Some(Rc::new(|field, _value| field != "age"));
    let model = Model::with_options(
        SchemaDecl::new()
            .field("name", FieldProps::string())
            .field("age", FieldProps::number()),
        options,
    )
    .unwrap();
    let mut person = model.create();
    person.set("name", json!("Ada"));
    person.set("age", json!(36));
    assert_eq!(person.get("name"), json!("Ada"));
    assert_eq!(person.get("age"), Value::Null);
    assert!(!person.has_errors());
}

/// The after-write hook observes each stored value.
#[test]
fn test_notify_hook_observes_stored_values() {
    use std::cell::RefCell;
    let log: Rc<RefCell<Vec<(String, Value)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let mut options = Options::new();
    options.on_value_set = Some(Rc::new(move |field, value| {
        sink.borrow_mut().push((field.to_string(), value.clone()));
    }));
    let model = Model::with_options(
        SchemaDecl::new().field("age", FieldProps::number()),
        options,
    )
    .unwrap();
    let mut person = model.create();
    person.set("age", json!("36"));
    assert_eq!(log.borrow().as_slice(), &[("age".to_string(), json!(36))]);
}

/// The post-serialize hook transforms the root snapshot only; nested
/// instances serialize untransformed.
#[test]
fn test_to_object_hook_applies_to_root_only() {
    let mut options = Options::new();
    options.to_object = Some(Rc::new(|snapshot| {
        let mut map = snapshot.as_object().cloned().unwrap_or_default();
        map.insert("wrapped".to_string(), json!(true));
        Value::Object(map)
    }));
    let model = Model::with_options(
        SchemaDecl::new().field(
            "profile",
            FieldProps::object_of(SchemaDecl::new().field("email", FieldProps::string())),
        ),
        options,
    )
    .unwrap();
    let mut person = model.create_from(json!({ "profile": { "email": "ada@example.com" } }));
    assert_eq!(
        person.to_object(),
        json!({
            "profile": { "email": "ada@example.com" },
            "wrapped": true
        })
    );
}

/// Getter failures are captured as error records; the raw value comes
/// back unchanged.
#[test]
fn test_getter_failure_is_captured_not_thrown() {
    let model = Model::new(SchemaDecl::new().field(
        "name",
        FieldProps::string().getter(Rc::new(|_value| Err("getter broke".to_string()))),
    ))
    .unwrap();
    let mut person = model.create_from(json!({ "name": "Ada" }));
    assert_eq!(person.get("name"), json!("Ada"));
    let errors = person.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), ErrorCode::GetterFailed);
    assert_eq!(errors[0].message(), "getter broke");
}

// =============================================================================
// Model Extension
// =============================================================================

/// Extending never disturbs the base factory.
#[test]
fn test_extend_leaves_base_model_untouched() {
    let base = person_model();
    let extended = base
        .extend(
            &SchemaDecl::new().field("email", FieldProps::string()),
            &OptionsPatch::new(),
        )
        .unwrap();

    let mut from_base = base.create();
    from_base.set("email", json!("ada@example.com"));
    assert_eq!(from_base.get("email"), Value::Null);

    let mut from_extended = extended.create();
    from_extended.set("email", json!("ada@example.com"));
    assert_eq!(from_extended.get("email"), json!("ada@example.com"));
}
