//! Schema subsystem: raw declarations, compiled descriptors, compiler.
//!
//! # Design Principles
//!
//! - Declarations are normalized once per model; descriptors are
//!   immutable afterward
//! - The compiled schema is shared by reference across instances, never
//!   per-instance
//! - Nested plain schemas compile recursively into embedded sub-models
//! - Pre-compiled model references are used verbatim, never re-compiled

mod compiler;
mod decl;
mod descriptor;

pub(crate) use compiler::compile;
pub use decl::{
    BooleanTransform, Constraint, DateTransform, DefaultFn, DefaultValue, FieldDecl, FieldProps,
    FilterHook, GetterHook, NumberTransform, ObjectDecl, Required, RequiredFn, SchemaDecl,
    StringTransform, TransformHook, TypeName,
};
pub use descriptor::{FieldDescriptor, FieldKind, Schema};
