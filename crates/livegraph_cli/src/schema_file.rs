//! JSON schema files.
//!
//! ```json
//! {"models": [
//!   {"name": "Thread", "identity": ["id"], "fields": [
//!     {"name": "id", "kind": "attr"},
//!     {"name": "messages", "kind": "many", "target": "Message", "inverse": "thread"},
//!     {"name": "size", "kind": "attr", "compute": {"count": "messages"}}
//!   ]}
//! ]}
//! ```
//!
//! Computed attributes are limited to two built-in forms: `{"count":
//! relation}` and `{"copy": {"via": relation, "field": attribute}}`.

use crate::error::{CliError, CliResult};
use livegraph_core::{Field, ModelDef, Schema};
use livegraph_value::Value;
use serde::Deserialize;
use std::path::Path;

/// A parsed schema file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    /// Model declarations.
    pub models: Vec<ModelDecl>,
}

/// One model declaration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDecl {
    /// Model name.
    pub name: String,
    /// Identity field names, in key order.
    pub identity: Vec<String>,
    /// Field declarations.
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

/// Kind of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKindDecl {
    /// Scalar attribute.
    Attr,
    /// Single relation.
    One,
    /// Multi relation.
    Many,
}

/// A built-in compute function.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDecl {
    /// Number of members of a relation.
    Count(String),
    /// An attribute of the record a `one` relation points at.
    Copy {
        /// The `one` relation to follow.
        via: String,
        /// The attribute to read there.
        field: String,
    },
}

/// One field declaration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    /// Field name.
    pub name: String,
    /// Field kind.
    pub kind: FieldKindDecl,
    /// Target model of a relation.
    #[serde(default)]
    pub target: Option<String>,
    /// Inverse field on the target.
    #[serde(default)]
    pub inverse: Option<String>,
    /// Whether related records are owned.
    #[serde(default)]
    pub owned: bool,
    /// Default attribute value.
    #[serde(default)]
    pub default: Option<Value>,
    /// Built-in compute function.
    #[serde(default)]
    pub compute: Option<ComputeDecl>,
}

impl SchemaFile {
    /// Reads and parses a schema file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses schema JSON.
    pub fn parse(text: &str) -> CliResult<Self> {
        serde_json::from_str(text).map_err(|err| CliError::SchemaFile(err.to_string()))
    }

    /// Builds and validates the schema.
    pub fn to_schema(&self) -> CliResult<Schema> {
        let mut builder = Schema::builder();
        for model in &self.models {
            let mut def = ModelDef::new(&model.name).identity(model.identity.iter().cloned());
            for field in &model.fields {
                def = def.field(field.to_field(&model.name)?);
            }
            builder = builder.model(def);
        }
        Ok(builder.build()?)
    }
}

impl FieldDecl {
    fn to_field(&self, model: &str) -> CliResult<Field> {
        let target = || {
            self.target.clone().ok_or_else(|| {
                CliError::SchemaFile(format!("relation {model}.{} needs a target", self.name))
            })
        };
        let mut field = match self.kind {
            FieldKindDecl::Attr => Field::attr(&self.name),
            FieldKindDecl::One => Field::one(&self.name, target()?),
            FieldKindDecl::Many => Field::many(&self.name, target()?),
        };
        if let Some(inverse) = &self.inverse {
            field = field.inverse(inverse);
        }
        if self.owned {
            field = field.owned();
        }
        if let Some(default) = &self.default {
            field = field.default(default.clone());
        }
        if let Some(compute) = &self.compute {
            if self.kind != FieldKindDecl::Attr {
                return Err(CliError::SchemaFile(format!(
                    "{model}.{}: only attributes can use built-in compute functions",
                    self.name
                )));
            }
            field = compute.apply(field);
        }
        Ok(field)
    }
}

impl ComputeDecl {
    fn apply(&self, field: Field) -> Field {
        match self.clone() {
            ComputeDecl::Count(relation) => {
                field.compute(move |ctx, id| Value::from(ctx.count(id, &relation) as i64))
            }
            ComputeDecl::Copy { via, field: source } => field.compute(move |ctx, id| {
                ctx.one(id, &via)
                    .map(|target| ctx.attr(target, &source).clone())
                    .unwrap_or_default()
            }),
        }
    }
}
