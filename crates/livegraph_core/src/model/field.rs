//! Field declarations.
//!
//! A model's fields are declared once with the builders below and checked
//! when the [`Schema`](crate::Schema) is built. Three kinds exist:
//!
//! - `attr`: a scalar or arbitrary [`Value`]
//! - `one`: at most one related record
//! - `many`: an ordered, duplicate-free list of related records
//!
//! ```rust,ignore
//! Field::attr("name").default("");
//! Field::one("author", "Persona");
//! Field::many("messages", "Message").inverse("thread").owned();
//! Field::attr("message_count").compute(|ctx, id| ctx.count(id, "messages").into());
//! ```

use crate::compute::ComputeCtx;
use crate::error::CoreResult;
use crate::store::Store;
use crate::types::RecordId;
use livegraph_value::Value;
use std::fmt;
use std::sync::Arc;

/// Compute function of a derived attribute.
pub type AttrCompute = Arc<dyn Fn(&ComputeCtx<'_>, RecordId) -> Value + Send + Sync>;

/// Compute function of a derived relation.
///
/// For a `one` relation only the first returned record is kept.
pub type RecordsCompute = Arc<dyn Fn(&ComputeCtx<'_>, RecordId) -> Vec<RecordId> + Send + Sync>;

/// Hook run after a field's committed value changes.
///
/// Hooks may mutate the store; their mutations join the running flush.
pub type UpdateHook = Arc<dyn Fn(&mut Store, RecordId) -> CoreResult<()> + Send + Sync>;

/// Declared kind of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Scalar value.
    Attr,
    /// Single relation to `target`.
    One {
        /// Target model name.
        target: String,
    },
    /// Multi relation to `target`.
    Many {
        /// Target model name.
        target: String,
    },
}

impl FieldKind {
    /// Returns the target model for relations.
    pub fn target(&self) -> Option<&str> {
        match self {
            FieldKind::Attr => None,
            FieldKind::One { target } | FieldKind::Many { target } => Some(target),
        }
    }
}

/// How a computed field derives its value.
#[derive(Clone)]
pub enum Compute {
    /// Derives an attribute value.
    Attr(AttrCompute),
    /// Derives a list of related records.
    Records(RecordsCompute),
}

/// A field declaration.
#[derive(Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) default: Option<Value>,
    pub(crate) inverse: Option<String>,
    pub(crate) owned: bool,
    pub(crate) compute: Option<Compute>,
    pub(crate) on_update: Option<UpdateHook>,
}

impl Field {
    fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            inverse: None,
            owned: false,
            compute: None,
            on_update: None,
        }
    }

    /// Declares a scalar attribute. Its default is `Null`.
    pub fn attr(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Attr)
    }

    /// Declares a single relation to `target`.
    pub fn one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::One {
                target: target.into(),
            },
        )
    }

    /// Declares a multi relation to `target`.
    pub fn many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Many {
                target: target.into(),
            },
        )
    }

    /// Sets the value a new record starts with. Attributes only.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Names the reciprocal field on the target model. Relations only.
    #[must_use]
    pub fn inverse(mut self, field: impl Into<String>) -> Self {
        self.inverse = Some(field.into());
        self
    }

    /// Marks the related records as owned: they are deleted with this record.
    #[must_use]
    pub fn owned(mut self) -> Self {
        self.owned = true;
        self
    }

    /// Makes an attribute computed.
    #[must_use]
    pub fn compute<F>(mut self, f: F) -> Self
    where
        F: Fn(&ComputeCtx<'_>, RecordId) -> Value + Send + Sync + 'static,
    {
        self.compute = Some(Compute::Attr(Arc::new(f)));
        self
    }

    /// Makes a relation computed.
    #[must_use]
    pub fn compute_records<F>(mut self, f: F) -> Self
    where
        F: Fn(&ComputeCtx<'_>, RecordId) -> Vec<RecordId> + Send + Sync + 'static,
    {
        self.compute = Some(Compute::Records(Arc::new(f)));
        self
    }

    /// Registers a hook fired after the field's value changes.
    #[must_use]
    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Store, RecordId) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(f));
        self
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared kind.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("inverse", &self.inverse)
            .field("owned", &self.owned)
            .field("computed", &self.compute.is_some())
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}
