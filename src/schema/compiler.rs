//! Schema compiler.
//!
//! Normalizes heterogeneous raw declarations into canonical
//! `FieldDescriptor`s: bare type references, properties blocks, nested
//! plain schemas (compiled recursively into embedded sub-models), array
//! literals, and pre-compiled model references. The caller's declaration
//! is read, never written; compilation happens once per model and the
//! result is shared by reference.

use std::rc::Rc;

use indexmap::IndexMap;

use super::decl::{FieldDecl, FieldProps, ObjectDecl, SchemaDecl, TypeName};
use super::descriptor::{FieldDescriptor, FieldKind, Schema};
use crate::error::{CompileError, CompileResult};
use crate::model::Model;
use crate::options::Options;

/// Compiles a raw schema declaration against the model options.
pub(crate) fn compile(decl: &SchemaDecl, options: &Rc<Options>) -> CompileResult<Schema> {
    let mut fields = IndexMap::with_capacity(decl.len());
    for (name, field_decl) in decl.iter() {
        let descriptor = compile_field(name, field_decl, options)?;
        fields.insert(name.clone(), Rc::new(descriptor));
    }

    // Alias targets must exist and must not themselves be aliases.
    for (name, descriptor) in &fields {
        if let FieldKind::Alias(target) = &descriptor.kind {
            match fields.get(target) {
                None => {
                    return Err(CompileError::UnknownAliasTarget {
                        alias: name.clone(),
                        target: target.clone(),
                    });
                }
                Some(target_desc) => {
                    if matches!(target_desc.kind, FieldKind::Alias(_)) {
                        return Err(CompileError::AliasToAlias {
                            alias: name.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }
    }

    tracing::trace!(fields = fields.len(), "compiled schema");
    Ok(Schema { fields })
}

fn compile_field(
    name: &str,
    decl: &FieldDecl,
    options: &Rc<Options>,
) -> CompileResult<FieldDescriptor> {
    match decl {
        FieldDecl::Type(type_name) => {
            Ok(FieldDescriptor::bare(name, kind_for(name, *type_name)))
        }
        // A pre-compiled model reference is used verbatim, never
        // re-compiled into a fresh sub-schema.
        FieldDecl::Model(model) => Ok(FieldDescriptor::bare(
            name,
            FieldKind::Object(Some(Rc::clone(model))),
        )),
        FieldDecl::Schema(nested) => {
            if nested.is_empty() {
                Ok(FieldDescriptor::bare(name, FieldKind::Object(None)))
            } else {
                let model = nested_model(nested, options)?;
                Ok(FieldDescriptor::bare(name, FieldKind::Object(Some(model))))
            }
        }
        FieldDecl::Array(element) => {
            let element_desc = match element {
                Some(inner) => compile_field(name, inner, options)?,
                None => FieldDescriptor::any(name),
            };
            Ok(FieldDescriptor::bare(
                name,
                FieldKind::Array(Rc::new(element_desc)),
            ))
        }
        FieldDecl::Props(props) => compile_props(name, props, options),
    }
}

fn compile_props(
    name: &str,
    props: &FieldProps,
    options: &Rc<Options>,
) -> CompileResult<FieldDescriptor> {
    let kind = if let Some(target) = &props.alias {
        FieldKind::Alias(target.clone())
    } else if let Some(element) = &props.array_type {
        FieldKind::Array(Rc::new(compile_field(name, element, options)?))
    } else if let Some(object_type) = &props.object_type {
        match object_type {
            ObjectDecl::Model(model) => FieldKind::Object(Some(Rc::clone(model))),
            ObjectDecl::Schema(nested) if nested.is_empty() => FieldKind::Object(None),
            ObjectDecl::Schema(nested) => FieldKind::Object(Some(nested_model(nested, options)?)),
        }
    } else {
        // Absent type resolves to `any`.
        match props.type_name {
            None => FieldKind::Any,
            Some(type_name) => kind_for(name, type_name),
        }
    };

    let mut descriptor = FieldDescriptor::bare(name, kind);
    descriptor.min = props.min.clone();
    descriptor.max = props.max.clone();
    descriptor.min_length = props.min_length.clone();
    descriptor.max_length = props.max_length.clone();
    descriptor.regex = props.regex.clone();
    descriptor.enum_values = props.enum_values.clone();
    descriptor.clip = props.clip;
    descriptor.unique = props.unique;
    descriptor.filter = props.filter.clone();
    descriptor.transform = props.transform.clone();
    descriptor.string_transform = props.string_transform.clone();
    descriptor.number_transform = props.number_transform.clone();
    descriptor.boolean_transform = props.boolean_transform.clone();
    descriptor.date_transform = props.date_transform.clone();
    descriptor.getter = props.getter.clone();
    descriptor.default = props.default.clone();
    descriptor.read_only = props.read_only;
    descriptor.invisible = props.invisible;
    descriptor.required = props.required.clone();
    Ok(descriptor)
}

fn kind_for(name: &str, type_name: TypeName) -> FieldKind {
    match type_name {
        TypeName::String => FieldKind::String,
        TypeName::Number => FieldKind::Number,
        TypeName::Boolean => FieldKind::Boolean,
        TypeName::Date => FieldKind::Date,
        TypeName::Array => FieldKind::Array(Rc::new(FieldDescriptor::any(name))),
        TypeName::Object => FieldKind::Object(None),
        TypeName::Any => FieldKind::Any,
    }
}

/// Compiles an embedded sub-schema into its own model. Nested instances
/// inherit the parent options except the post-serialize hook.
fn nested_model(nested: &SchemaDecl, options: &Rc<Options>) -> CompileResult<Rc<Model>> {
    let nested_options = Rc::new(options.for_nested());
    Ok(Rc::new(Model::with_shared_options(
        nested.clone(),
        nested_options,
    )?))
}
