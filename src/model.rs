//! Model factories.
//!
//! A model pairs a compiled schema with a shared options block and stamps
//! out instances. Compilation happens exactly once, at model build time;
//! every instance holds reference-counted handles to the same schema and
//! options. `extend` derives a new factory by deep-merging schema
//! declarations and overlaying options, with construction hooks chained
//! through an explicit delegate.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::CompileResult;
use crate::instance::Instance;
use crate::options::{ConstructHook, MethodHook, Options, OptionsPatch};
use crate::schema::{self, Schema, SchemaDecl};

/// Instance factory built from a schema declaration.
#[derive(Clone)]
pub struct Model {
    decl: SchemaDecl,
    schema: Rc<Schema>,
    options: Rc<Options>,
}

impl Model {
    /// Compiles a declaration under the default options (strict mode on).
    pub fn new(decl: SchemaDecl) -> CompileResult<Model> {
        Self::with_options(decl, Options::new())
    }

    /// Compiles a declaration under explicit options.
    pub fn with_options(decl: SchemaDecl, options: Options) -> CompileResult<Model> {
        Self::with_shared_options(decl, Rc::new(options))
    }

    pub(crate) fn with_shared_options(
        decl: SchemaDecl,
        options: Rc<Options>,
    ) -> CompileResult<Model> {
        let schema = schema::compile(&decl, &options)?;
        Ok(Model {
            decl,
            schema: Rc::new(schema),
            options,
        })
    }

    /// Parses a JSON schema declaration and compiles it under the default
    /// options.
    pub fn from_json(decl: &Value) -> CompileResult<Model> {
        Self::new(SchemaDecl::from_json(decl)?)
    }

    /// The compiled schema shared by every instance of this model.
    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    /// The options block shared by every instance of this model.
    pub fn options(&self) -> &Rc<Options> {
        &self.options
    }

    /// Looks up a per-factory method by name.
    pub fn method(&self, name: &str) -> Option<&MethodHook> {
        self.options.methods.get(name)
    }

    /// Builds an empty instance: defaults applied, construction hook run
    /// with no input.
    pub fn create(&self) -> Instance {
        self.build(None)
    }

    /// Builds an instance from an initial value object: defaults applied
    /// first, then the input handed to the construction hook (or, absent
    /// one, shallow-populated field by field).
    pub fn create_from(&self, values: Value) -> Instance {
        self.build(Some(values))
    }

    fn build(&self, values: Option<Value>) -> Instance {
        let mut instance = Instance::bind(Rc::clone(&self.schema), Rc::clone(&self.options));
        instance.apply_defaults();
        let default_populate: fn(&mut Instance, Option<&Value>) = |instance, values| {
            if let Some(values) = values {
                instance.populate(values.clone());
            }
        };
        match &self.options.construct {
            Some(hook) => hook(&mut instance, values.as_ref(), &default_populate),
            None => default_populate(&mut instance, values.as_ref()),
        }
        instance
    }

    /// Derives a new factory: `additions` deep-merges over this model's
    /// declaration (nested schema declarations merge recursively, other
    /// collisions replace), `patch` overlays the options. When the patch
    /// carries a construction hook, the hook it receives as its delegate
    /// is this model's effective constructor rather than the bare
    /// shallow populate.
    pub fn extend(&self, additions: &SchemaDecl, patch: &OptionsPatch) -> CompileResult<Model> {
        let decl = self.decl.merge(additions);
        let mut options = self.options.merged(patch);
        if let Some(overriding) = patch.construct.clone() {
            let base_construct = self.options.construct.clone();
            let composed: ConstructHook = Rc::new(move |instance, values, fallback| {
                let base_construct = base_construct.clone();
                let delegate = move |instance: &mut Instance, values: Option<&Value>| {
                    match &base_construct {
                        Some(base) => base(instance, values, fallback),
                        None => fallback(instance, values),
                    }
                };
                overriding(instance, values, &delegate);
            });
            options.construct = Some(composed);
        }
        Self::with_options(decl, options)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("fields", &self.schema.len())
            .field("strict", &self.options.strict)
            .finish()
    }
}
