//! Identity keys and their resolution from payloads.
//!
//! A record's identity key is built from its model's identity fields, in
//! declared order. Attribute components are taken verbatim from the payload.
//! A relation component is the identity key of the related record, encoded
//! as `Value::Array`, so `(thread, persona)` memberships are keyed by who
//! they join rather than by arena slots.

use crate::changes::{Change, Changes};
use crate::error::{CoreError, CoreResult};
use crate::model::{FieldInfo, FieldShape, Model, RelationInfo};
use livegraph_value::Value;
use std::fmt;

/// The values that uniquely distinguish one record of a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey(Vec<Value>);

impl IdentityKey {
    /// Creates a key from its components.
    pub fn new(parts: Vec<Value>) -> Self {
        Self(parts)
    }

    /// Returns the components in key order.
    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    /// Encodes the key as an array value (the form relation components use).
    pub fn to_value(&self) -> Value {
        Value::Array(self.0.clone())
    }
}

impl From<Value> for IdentityKey {
    fn from(value: Value) -> Self {
        Self(vec![value])
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, ")")
    }
}

/// Builds the identity key of a `model` record described by `changes`.
///
/// Attribute components are read directly. Relation components are handed
/// to `relation_key`, which returns the related record's key; callers decide
/// whether that means a pure lookup or planning a nested insert.
///
/// # Errors
///
/// `MissingIdentity` when an identity field is absent or null,
/// `TypeMismatch` when an attribute component is given a record handle.
pub(crate) fn resolve_key<F>(
    model: &Model,
    changes: &Changes,
    mut relation_key: F,
) -> CoreResult<IdentityKey>
where
    F: FnMut(&FieldInfo, &RelationInfo, &Change) -> CoreResult<IdentityKey>,
{
    let mut parts = Vec::with_capacity(model.identity().len());
    for &field_id in model.identity() {
        let field = model.field(field_id);
        let missing = || CoreError::missing_identity(model.name(), field.name());
        let change = changes.get(field.name()).ok_or_else(missing)?;
        if matches!(change, Change::Data(Value::Null) | Change::Clear) {
            return Err(missing());
        }

        let part = match field.shape() {
            FieldShape::Attr { .. } => match change {
                Change::Data(value) => value.clone(),
                other => {
                    return Err(CoreError::type_mismatch(
                        model.name(),
                        field.name(),
                        "a value",
                        other.describe(),
                    ))
                }
            },
            FieldShape::Relation(info) => relation_key(field, info, change)?.to_value(),
        };
        parts.push(part);
    }
    Ok(IdentityKey(parts))
}

/// Expands a bare scalar into the payload of a single-field identity.
///
/// `5` given for a `Persona` relation means `{"id": 5}` when `Persona` is
/// identified by `id` alone. Composite identities cannot be abbreviated.
pub(crate) fn bare_changes(target: &Model, value: &Value) -> CoreResult<Changes> {
    match target.identity() {
        [single] => {
            let field = target.field(*single);
            if field.relation().is_some() {
                return Err(CoreError::invalid_payload(format!(
                    "model {} is identified by relation {}; a bare key cannot name it",
                    target.name(),
                    field.name()
                )));
            }
            Ok(Changes::new().set(field.name(), value.clone()))
        }
        _ => Err(CoreError::invalid_payload(format!(
            "model {} has a composite identity; bare key {value} is ambiguous",
            target.name()
        ))),
    }
}
