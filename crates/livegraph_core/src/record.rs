//! Record storage and record views.
//!
//! Records live in the store's arena. Callers never hold a record directly;
//! they hold a [`RecordId`] and borrow a [`RecordRef`] to read it or a
//! [`RecordMut`] to change it.

use crate::changes::Changes;
use crate::error::CoreResult;
use crate::identity::IdentityKey;
use crate::model::{Cardinality, FieldInfo, FieldShape, Model};
use crate::store::Store;
use crate::types::{FieldId, ModelId, RecordId};
use livegraph_value::Value;
use std::collections::BTreeSet;

/// Current value of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Attribute value.
    Attr(Value),
    /// Target of a `one` relation.
    One(Option<RecordId>),
    /// Targets of a `many` relation, in insertion order.
    Many(Vec<RecordId>),
}

impl FieldValue {
    /// Value a new record starts with for `field`.
    pub(crate) fn initial(field: &FieldInfo) -> Self {
        match field.shape() {
            FieldShape::Attr { default } => FieldValue::Attr(default.clone()),
            FieldShape::Relation(info) => match info.cardinality {
                Cardinality::One => FieldValue::One(None),
                Cardinality::Many => FieldValue::Many(Vec::new()),
            },
        }
    }

    /// Returns the attribute value.
    pub fn as_attr(&self) -> Option<&Value> {
        match self {
            FieldValue::Attr(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the related records of either relation kind.
    pub fn targets(&self) -> &[RecordId] {
        match self {
            FieldValue::Attr(_) | FieldValue::One(None) => &[],
            FieldValue::One(Some(target)) => std::slice::from_ref(target),
            FieldValue::Many(targets) => targets,
        }
    }

    /// Returns true if the relation holds `target`.
    pub fn holds(&self, target: RecordId) -> bool {
        self.targets().contains(&target)
    }
}

/// Arena entry of a live record.
#[derive(Debug, Clone)]
pub(crate) struct RecordData {
    pub(crate) model: ModelId,
    pub(crate) key: IdentityKey,
    pub(crate) values: Vec<FieldValue>,
    /// Relation slots on other records that hold this one.
    pub(crate) referrers: BTreeSet<(RecordId, FieldId)>,
}

impl RecordData {
    pub(crate) fn new(model: &Model, key: IdentityKey) -> Self {
        Self {
            model: model.id(),
            key,
            values: model.fields().iter().map(FieldValue::initial).collect(),
            referrers: BTreeSet::new(),
        }
    }

    pub(crate) fn value(&self, field: FieldId) -> &FieldValue {
        &self.values[field.index()]
    }

    pub(crate) fn value_mut(&mut self, field: FieldId) -> &mut FieldValue {
        &mut self.values[field.index()]
    }
}

/// Read access to a live record.
#[derive(Clone, Copy)]
pub struct RecordRef<'a> {
    store: &'a Store,
    id: RecordId,
    data: &'a RecordData,
}

impl<'a> RecordRef<'a> {
    pub(crate) fn new(store: &'a Store, id: RecordId, data: &'a RecordData) -> Self {
        Self { store, id, data }
    }

    /// Returns the record handle.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Returns the record's model.
    pub fn model(&self) -> &'a Model {
        self.store.schema().model(self.data.model)
    }

    /// Returns the identity key.
    pub fn key(&self) -> &'a IdentityKey {
        &self.data.key
    }

    /// Returns a field's current value, or `None` for an unknown field.
    pub fn get(&self, field: &str) -> Option<&'a FieldValue> {
        let id = self.model().field_id(field)?;
        Some(self.data.value(id))
    }

    /// Returns an attribute value. Unknown fields and relations read as `None`.
    pub fn attr(&self, field: &str) -> Option<&'a Value> {
        self.get(field).and_then(FieldValue::as_attr)
    }

    /// Returns the target of a `one` relation.
    pub fn one(&self, field: &str) -> Option<RecordId> {
        match self.get(field)? {
            FieldValue::One(target) => *target,
            _ => None,
        }
    }

    /// Returns the targets of a relation (empty for unknown fields).
    pub fn many(&self, field: &str) -> &'a [RecordId] {
        self.get(field).map(FieldValue::targets).unwrap_or(&[])
    }

    /// Follows a `one` relation.
    pub fn related(&self, field: &str) -> Option<RecordRef<'a>> {
        self.one(field).and_then(|target| self.store.record(target))
    }

    /// Iterates over the relation slots holding this record, as
    /// `(record, field name)`.
    pub fn referrers(&self) -> impl Iterator<Item = (RecordId, &'a str)> + 'a {
        let store = self.store;
        self.data.referrers.iter().filter_map(move |&(holder, field)| {
            let data = store.data(holder)?;
            Some((holder, store.schema().field(data.model, field).name()))
        })
    }

    /// Renders the record as a payload map.
    ///
    /// Relations are written as their targets' identity: the bare value for
    /// single-field identities, a map of identity fields otherwise.
    pub fn to_value(&self) -> Value {
        let model = self.model();
        let mut pairs = Vec::with_capacity(model.fields().len());
        for field in model.fields() {
            let value = match self.data.value(field.id()) {
                FieldValue::Attr(value) => value.clone(),
                FieldValue::One(target) => target
                    .and_then(|t| self.store.record(t))
                    .map(|r| r.key_value())
                    .unwrap_or(Value::Null),
                FieldValue::Many(targets) => Value::Array(
                    targets
                        .iter()
                        .filter_map(|&t| self.store.record(t))
                        .map(|r| r.key_value())
                        .collect(),
                ),
            };
            pairs.push((Value::from(field.name()), value));
        }
        Value::Map(pairs)
    }

    /// Returns the identity in payload form.
    pub fn key_value(&self) -> Value {
        let model = self.model();
        let parts = self.data.key.parts();
        if let [single] = parts {
            if model.field(model.identity()[0]).relation().is_none() {
                return single.clone();
            }
        }
        Value::Map(
            model
                .identity()
                .iter()
                .zip(parts)
                .map(|(&f, part)| (Value::from(model.field(f).name()), part.clone()))
                .collect(),
        )
    }
}

impl std::fmt::Debug for RecordRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordRef")
            .field("id", &self.id)
            .field("model", &self.model().name())
            .field("key", &self.data.key)
            .finish_non_exhaustive()
    }
}

/// Write access to a record.
///
/// Obtained from [`Store::record_mut`]; the handle may go stale if the
/// record is deleted through another path, in which case operations report
/// `RecordNotFound`.
#[derive(Debug)]
pub struct RecordMut<'a> {
    store: &'a mut Store,
    id: RecordId,
}

impl<'a> RecordMut<'a> {
    pub(crate) fn new(store: &'a mut Store, id: RecordId) -> Self {
        Self { store, id }
    }

    /// Returns the record handle.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Borrows the record for reading.
    pub fn get(&self) -> Option<RecordRef<'_>> {
        self.store.record(self.id)
    }

    /// Applies changes; see [`Store::update`].
    ///
    /// # Errors
    ///
    /// Same as [`Store::update`].
    pub fn update(&mut self, changes: Changes) -> CoreResult<()> {
        self.store.update(self.id, changes)
    }

    /// Deletes the record; see [`Store::delete`].
    ///
    /// # Errors
    ///
    /// Same as [`Store::delete`].
    pub fn delete(self) -> CoreResult<bool> {
        self.store.delete(self.id)
    }
}
