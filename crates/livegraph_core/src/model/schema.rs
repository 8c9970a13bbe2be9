//! Model declarations and the validated schema.

use crate::error::SchemaError;
use crate::model::field::{Compute, Field, FieldKind, UpdateHook};
use crate::types::{FieldId, ModelId};
use livegraph_value::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Declaration of one model: its name, identity fields and field set.
#[derive(Debug, Clone)]
pub struct ModelDef {
    name: String,
    identity: Vec<String>,
    fields: Vec<Field>,
}

impl ModelDef {
    /// Starts a model declaration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Sets the identity fields, in key order.
    #[must_use]
    pub fn identity<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the model name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one target.
    One,
    /// Ordered set of targets.
    Many,
}

/// Resolved relation metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationInfo {
    /// Target model.
    pub target: ModelId,
    /// One or many.
    pub cardinality: Cardinality,
    /// Reciprocal field on the target model.
    pub inverse: Option<FieldId>,
    /// Targets are deleted together with the owner.
    pub owned: bool,
}

/// Resolved shape of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldShape {
    /// Scalar attribute with its default.
    Attr {
        /// Value of a freshly created record.
        default: Value,
    },
    /// Relation to another model.
    Relation(RelationInfo),
}

/// A validated field of a [`Model`].
#[derive(Clone)]
pub struct FieldInfo {
    id: FieldId,
    name: String,
    shape: FieldShape,
    compute: Option<Compute>,
    on_update: Option<UpdateHook>,
    readonly: bool,
    identity: bool,
}

impl FieldInfo {
    /// Returns the field id.
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the resolved shape.
    pub fn shape(&self) -> &FieldShape {
        &self.shape
    }

    /// Returns the relation metadata, if this is a relation.
    pub fn relation(&self) -> Option<&RelationInfo> {
        match &self.shape {
            FieldShape::Relation(info) => Some(info),
            FieldShape::Attr { .. } => None,
        }
    }

    /// Returns true if the field is derived.
    pub fn is_computed(&self) -> bool {
        self.compute.is_some()
    }

    /// Returns true if external callers may not write the field.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Returns true if the field is part of the model's identity.
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub(crate) fn compute(&self) -> Option<&Compute> {
        self.compute.as_ref()
    }

    pub(crate) fn on_update(&self) -> Option<&UpdateHook> {
        self.on_update.as_ref()
    }
}

impl fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("computed", &self.compute.is_some())
            .field("readonly", &self.readonly)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// A validated model.
#[derive(Debug, Clone)]
pub struct Model {
    id: ModelId,
    name: String,
    fields: Vec<FieldInfo>,
    by_name: HashMap<String, FieldId>,
    identity: Vec<FieldId>,
}

impl Model {
    /// Returns the model id.
    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Returns the model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all fields in declaration order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Returns a field by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this model.
    pub fn field(&self, id: FieldId) -> &FieldInfo {
        &self.fields[id.index()]
    }

    /// Looks up a field id by name.
    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(name).copied()
    }

    /// Looks up a field by name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.field_id(name).map(|id| self.field(id))
    }

    /// Returns the identity fields in key order.
    pub fn identity(&self) -> &[FieldId] {
        &self.identity
    }

    /// Iterates over relation fields.
    pub fn relations(&self) -> impl Iterator<Item = (&FieldInfo, &RelationInfo)> {
        self.fields
            .iter()
            .filter_map(|f| f.relation().map(|r| (f, r)))
    }

    /// Iterates over computed fields.
    pub fn computed_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.is_computed())
    }
}

/// The validated set of models a store is built from.
///
/// A schema is immutable once built; every relation target and inverse has
/// been resolved to ids.
#[derive(Debug, Clone)]
pub struct Schema {
    models: Vec<Model>,
    by_name: HashMap<String, ModelId>,
}

impl Schema {
    /// Starts building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Returns a model by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this schema.
    pub fn model(&self, id: ModelId) -> &Model {
        &self.models[id.index()]
    }

    /// Looks up a model id by name.
    pub fn model_id(&self, name: &str) -> Option<ModelId> {
        self.by_name.get(name).copied()
    }

    /// Looks up a model by name.
    pub fn model_by_name(&self, name: &str) -> Option<&Model> {
        self.model_id(name).map(|id| self.model(id))
    }

    /// Returns all models in declaration order.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Returns the field `field` of model `model`.
    pub fn field(&self, model: ModelId, field: FieldId) -> &FieldInfo {
        self.model(model).field(field)
    }
}

/// Builder collecting model declarations.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    models: Vec<ModelDef>,
}

impl SchemaBuilder {
    /// Adds a model declaration.
    #[must_use]
    pub fn model(mut self, def: ModelDef) -> Self {
        self.models.push(def);
        self
    }

    /// Validates the declarations and resolves names to ids.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut by_name = HashMap::new();
        for (index, def) in self.models.iter().enumerate() {
            let id = ModelId(u32::try_from(index).unwrap_or(u32::MAX));
            if by_name.insert(def.name.clone(), id).is_some() {
                return Err(SchemaError::DuplicateModel {
                    model: def.name.clone(),
                });
            }
        }

        // First pass: shapes, options and per-model lookups.
        let mut models = Vec::with_capacity(self.models.len());
        let mut declared_inverses = Vec::with_capacity(self.models.len());
        for (index, def) in self.models.iter().enumerate() {
            let model_id = ModelId(u32::try_from(index).unwrap_or(u32::MAX));
            let mut fields = Vec::with_capacity(def.fields.len());
            let mut field_names = HashMap::new();
            let mut inverses = Vec::with_capacity(def.fields.len());

            for (field_index, field) in def.fields.iter().enumerate() {
                let field_id = FieldId(u32::try_from(field_index).unwrap_or(u32::MAX));
                if field_names.insert(field.name.clone(), field_id).is_some() {
                    return Err(SchemaError::DuplicateField {
                        model: def.name.clone(),
                        field: field.name.clone(),
                    });
                }
                let shape = resolve_shape(def, field, &by_name)?;
                inverses.push(field.inverse.clone());
                fields.push(FieldInfo {
                    id: field_id,
                    name: field.name.clone(),
                    shape,
                    compute: field.compute.clone(),
                    on_update: field.on_update.clone(),
                    readonly: field.compute.is_some(),
                    identity: false,
                });
            }

            let identity = resolve_identity(def, &mut fields, &field_names)?;
            models.push(Model {
                id: model_id,
                name: def.name.clone(),
                fields,
                by_name: field_names,
                identity,
            });
            declared_inverses.push(inverses);
        }

        // Second pass: pair up inverses on both sides.
        for (model_index, inverses) in declared_inverses.iter().enumerate() {
            for (field_index, inverse) in inverses.iter().enumerate() {
                if let Some(inverse) = inverse {
                    link_inverse(&mut models, model_index, field_index, inverse)?;
                }
            }
        }

        // The inverse of a computed relation is derived too.
        let mut derived = Vec::new();
        for model in &models {
            for (field, info) in model.relations() {
                if field.is_computed() {
                    if let Some(inverse) = info.inverse {
                        derived.push((info.target, inverse));
                    }
                }
            }
        }
        for (model, field) in derived {
            let model = &mut models[model.index()];
            let field = &mut model.fields[field.index()];
            if field.identity {
                return Err(SchemaError::InvalidIdentityField {
                    model: model.name.clone(),
                    field: field.name.clone(),
                    reason: "the inverse of a computed relation cannot identify a record".to_string(),
                });
            }
            field.readonly = true;
        }

        Ok(Schema { models, by_name })
    }
}

fn resolve_shape(
    def: &ModelDef,
    field: &Field,
    by_name: &HashMap<String, ModelId>,
) -> Result<FieldShape, SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidFieldOption {
        model: def.name.clone(),
        field: field.name.clone(),
        reason: reason.to_string(),
    };

    match &field.kind {
        FieldKind::Attr => {
            if field.inverse.is_some() {
                return Err(invalid("inverse declared on an attribute"));
            }
            if field.owned {
                return Err(invalid("ownership declared on an attribute"));
            }
            if matches!(field.compute, Some(Compute::Records(_))) {
                return Err(invalid("record compute declared on an attribute"));
            }
            Ok(FieldShape::Attr {
                default: field.default.clone().unwrap_or_default(),
            })
        }
        FieldKind::One { target } | FieldKind::Many { target } => {
            if field.default.is_some() {
                return Err(invalid("default declared on a relation"));
            }
            if matches!(field.compute, Some(Compute::Attr(_))) {
                return Err(invalid("value compute declared on a relation"));
            }
            let target_id = by_name
                .get(target)
                .copied()
                .ok_or_else(|| SchemaError::UnknownTarget {
                    model: def.name.clone(),
                    field: field.name.clone(),
                    target: target.clone(),
                })?;
            let cardinality = if matches!(field.kind, FieldKind::One { .. }) {
                Cardinality::One
            } else {
                Cardinality::Many
            };
            Ok(FieldShape::Relation(RelationInfo {
                target: target_id,
                cardinality,
                inverse: None,
                owned: field.owned,
            }))
        }
    }
}

fn resolve_identity(
    def: &ModelDef,
    fields: &mut [FieldInfo],
    field_names: &HashMap<String, FieldId>,
) -> Result<Vec<FieldId>, SchemaError> {
    if def.identity.is_empty() {
        return Err(SchemaError::MissingIdentity {
            model: def.name.clone(),
        });
    }

    let invalid = |field: &str, reason: &str| SchemaError::InvalidIdentityField {
        model: def.name.clone(),
        field: field.to_string(),
        reason: reason.to_string(),
    };

    let mut seen = HashSet::new();
    let mut identity = Vec::with_capacity(def.identity.len());
    for name in &def.identity {
        let id = field_names
            .get(name)
            .copied()
            .ok_or_else(|| invalid(name, "not declared"))?;
        if !seen.insert(id) {
            return Err(invalid(name, "listed twice"));
        }
        let field = &mut fields[id.index()];
        if field.compute.is_some() {
            return Err(invalid(name, "computed fields cannot identify a record"));
        }
        if let Some(info) = field.relation() {
            if info.cardinality == Cardinality::Many {
                return Err(invalid(name, "many relations cannot identify a record"));
            }
        }
        field.identity = true;
        identity.push(id);
    }
    Ok(identity)
}

fn link_inverse(
    models: &mut [Model],
    model_index: usize,
    field_index: usize,
    inverse: &str,
) -> Result<(), SchemaError> {
    let model = &models[model_index];
    let field = &model.fields[field_index];
    let mismatch = || SchemaError::InverseMismatch {
        model: model.name.clone(),
        field: field.name.clone(),
        inverse: inverse.to_string(),
    };

    let Some(info) = field.relation().copied() else {
        return Err(mismatch());
    };
    let target = &models[info.target.index()];
    let inverse_id = target
        .field_id(inverse)
        .ok_or_else(|| SchemaError::UnknownInverse {
            model: model.name.clone(),
            field: field.name.clone(),
            inverse: inverse.to_string(),
        })?;
    let inverse_info = target
        .field(inverse_id)
        .relation()
        .copied()
        .ok_or_else(mismatch)?;
    if inverse_info.target != model.id {
        return Err(mismatch());
    }

    let field_id = field.id;
    let this_model = model.id;
    // Either side may already be paired from the other side's declaration.
    if info.inverse.is_some_and(|existing| existing != inverse_id) {
        return Err(mismatch());
    }
    if inverse_info.inverse.is_some_and(|existing| existing != field_id) {
        return Err(mismatch());
    }

    set_inverse(models, this_model, field_id, inverse_id);
    set_inverse(models, info.target, inverse_id, field_id);
    Ok(())
}

fn set_inverse(models: &mut [Model], model: ModelId, field: FieldId, inverse: FieldId) {
    if let FieldShape::Relation(info) = &mut models[model.index()].fields[field.index()].shape {
        info.inverse = Some(inverse);
    }
}
