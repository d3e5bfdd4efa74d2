//! shapecast - schema-driven object shaping
//!
//! Declares object shapes once, then stamps out live instances whose
//! field reads and writes run through a typecast and validation
//! pipeline. Writes never fail loudly: rejected inputs accumulate as
//! inspectable error records while the prior value stands.
//!
//! # Design Principles
//!
//! - Schemas compile once per model; instances share the compiled form
//!   by reference
//! - Every write is cast to the field's canonical type or rejected with
//!   a stable error code, never stored raw
//! - Errors accumulate, they do not propagate; callers inspect them when
//!   they choose to
//! - Nested schemas and typed arrays compose recursively under the same
//!   pipeline

pub mod array;
mod cast;
pub mod error;
pub mod instance;
pub mod model;
pub mod options;
pub mod schema;
pub mod value;

pub use array::TypedArray;
pub use error::{CompileError, CompileResult, ErrorCode, ErrorKind, FieldError};
pub use instance::Instance;
pub use model::Model;
pub use options::{
    ConstructHook, MethodHook, NotifyHook, Options, OptionsPatch, SerializeHook, VetoHook,
};
pub use schema::{
    Constraint, DefaultValue, FieldDecl, FieldDescriptor, FieldKind, FieldProps, Required, Schema,
    SchemaDecl, TypeName,
};
pub use value::FieldValue;
