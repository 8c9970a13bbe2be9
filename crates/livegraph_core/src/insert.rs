//! Payload ingestion and updates.
//!
//! Each top-level item goes through two phases. Planning is pure: it runs
//! extensions' payload rewrites, resolves every identity (nested ones
//! included), and validates field names, read-only fields, value shapes and
//! record handles. Only a fully valid plan is applied, so a rejected item
//! leaves the store untouched.
//!
//! Applying is depth-first: a nested payload is inserted before it is
//! related, and records named in a relation identity exist before the
//! record whose key contains them.
//!
//! Relation payload forms:
//!
//! | payload                     | `one`               | `many`                |
//! |-----------------------------|---------------------|-----------------------|
//! | `null`                      | clear               | clear                 |
//! | scalar                      | bare key of target  | replace with `[key]`  |
//! | map                         | nested record       | replace with `[rec]`  |
//! | array                       | rejected            | replace, in order     |
//! | `[["ADD", x], ...]`         | rejected            | add / remove / clear  |

use crate::changes::{Change, Changes};
use crate::compute::FlushReport;
use crate::config::UnknownFieldPolicy;
use crate::error::{CoreError, CoreResult};
use crate::identity::{self, IdentityKey};
use crate::model::{Cardinality, FieldInfo, FieldShape, Model, RelationInfo};
use crate::store::Store;
use crate::types::{FieldId, ModelId, RecordId};
use livegraph_value::Value;
use std::collections::HashMap;

const ADD: &str = "ADD";
const DELETE: &str = "DELETE";
const CLEAR: &str = "CLEAR";

/// A validated insert of one record and everything nested in it.
pub(crate) struct Plan {
    model: ModelId,
    key: IdentityKey,
    ops: Vec<(FieldId, Op)>,
}

enum Target {
    Existing(RecordId),
    Nested(Box<Plan>),
}

/// A record to unlink, named by handle or by key.
enum TargetRef {
    Existing(RecordId),
    Key(ModelId, IdentityKey),
}

enum Op {
    Assign(Value),
    SetOne(Option<Target>),
    Unlink(TargetRef),
    Add(Vec<Target>),
    Remove(Vec<TargetRef>),
    Replace(Vec<Target>),
}

/// Outcome of [`Store::ingest`].
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Records inserted or merged, as `(model, record)`, in payload order.
    pub records: Vec<(String, RecordId)>,
    /// Items that were rejected. Other items are unaffected.
    pub failures: Vec<IngestFailure>,
    /// Report of the closing flush, unless ingestion ran inside a batch.
    pub flush: Option<FlushReport>,
}

impl IngestReport {
    /// Returns true if every item was accepted.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A rejected ingestion item.
#[derive(Debug)]
pub struct IngestFailure {
    /// Model name as given in the payload.
    pub model: String,
    /// Position of the item under its model.
    pub index: usize,
    /// Why it was rejected.
    pub error: CoreError,
}

impl Store {
    /// Finds or creates the record `data` describes and merges the fields it
    /// carries. Fields absent from `data` are left as they are.
    ///
    /// `data` is a map of fields, or a bare key for models identified by a
    /// single attribute.
    ///
    /// # Errors
    ///
    /// `UnknownModel`, `MissingIdentity` (at any nesting level),
    /// `ReadonlyField`, `TypeMismatch`, `UnknownField` under
    /// [`UnknownFieldPolicy::Reject`], `InvalidPayload`, or an error of the
    /// closing flush. On a payload error nothing is changed.
    pub fn insert(&mut self, model: &str, data: impl Into<Value>) -> CoreResult<RecordId> {
        let data = data.into();
        let model_id = self.model_id(model)?;
        self.batch(|store| store.insert_item(model_id, &data))
    }

    /// Like [`Store::insert`], for typed changes that may name records by
    /// handle.
    ///
    /// # Errors
    ///
    /// Same as [`Store::insert`], plus `RecordNotFound` for dead handles.
    pub fn insert_changes(&mut self, model: &str, changes: Changes) -> CoreResult<RecordId> {
        let model_id = self.model_id(model)?;
        self.batch(|store| store.insert_planned(model_id, Ok(changes)))
    }

    /// Inserts several items of one model in order, within one batch.
    /// Items succeed or fail independently.
    ///
    /// # Errors
    ///
    /// `UnknownModel`, or an error of the closing flush.
    pub fn insert_many(&mut self, model: &str, items: &[Value]) -> CoreResult<Vec<CoreResult<RecordId>>> {
        let model_id = self.model_id(model)?;
        self.batch(|store| {
            Ok(items
                .iter()
                .map(|item| store.insert_item(model_id, item))
                .collect())
        })
    }

    /// Ingests a `{ model: record | [record, ...], ... }` payload in one
    /// batch.
    ///
    /// # Errors
    ///
    /// `InvalidPayload` if `payload` is not a map, or an error of the
    /// closing flush. Per-item failures are collected in the report.
    pub fn ingest(&mut self, payload: &Value) -> CoreResult<IngestReport> {
        let Some(entries) = payload.as_map() else {
            return Err(CoreError::invalid_payload(format!(
                "ingest payload must map model names to records, found {}",
                payload.type_name()
            )));
        };

        let mut report = IngestReport::default();
        self.enter_batch();
        for (name, data) in entries {
            let model = name.as_text().map_or_else(|| name.to_string(), str::to_string);
            let model_id = match name.as_text().map(|n| self.model_id(n)) {
                Some(Ok(id)) => id,
                Some(Err(error)) => {
                    report.failures.push(IngestFailure {
                        model,
                        index: 0,
                        error,
                    });
                    continue;
                }
                None => {
                    report.failures.push(IngestFailure {
                        model,
                        index: 0,
                        error: CoreError::invalid_payload("model names must be text"),
                    });
                    continue;
                }
            };

            let items = match data {
                Value::Array(items) => items.as_slice(),
                single => std::slice::from_ref(single),
            };
            for (index, item) in items.iter().enumerate() {
                match self.insert_item(model_id, item) {
                    Ok(id) => report.records.push((model.clone(), id)),
                    Err(error) => report.failures.push(IngestFailure {
                        model: model.clone(),
                        index,
                        error,
                    }),
                }
            }
        }
        if self.leave_batch() {
            report.flush = Some(self.flush()?);
        }
        tracing::debug!(
            records = report.records.len(),
            failures = report.failures.len(),
            "ingested payload"
        );
        Ok(report)
    }

    /// Decodes a CBOR payload and ingests it.
    ///
    /// # Errors
    ///
    /// `Value` errors from decoding, otherwise as [`Store::ingest`].
    pub fn ingest_cbor(&mut self, bytes: &[u8]) -> CoreResult<IngestReport> {
        let payload = livegraph_value::from_cbor(bytes)?;
        self.ingest(&payload)
    }

    /// Applies changes to a live record.
    ///
    /// Relation changes may carry nested payloads (inserted first) or
    /// record handles. Everything is validated before anything changes.
    ///
    /// # Errors
    ///
    /// `RecordNotFound`, `ReadonlyField` for computed fields and inverses of
    /// computed relations, `IdentityImmutable` for a changed identity value,
    /// `TypeMismatch`, `UnknownField` under [`UnknownFieldPolicy::Reject`],
    /// or an error of the closing flush.
    pub fn update(&mut self, id: RecordId, changes: Changes) -> CoreResult<()> {
        let model_id = self
            .data(id)
            .map(|data| data.model)
            .ok_or(CoreError::RecordNotFound { record: id })?;
        self.batch(|store| {
            let ops = store
                .plan_update(model_id, id, &changes)
                .inspect_err(|err| {
                    store.stats.record_error();
                    tracing::debug!(record = %id, error = %err, "update rejected");
                })?;
            store.stats.record_update();
            for (field, op) in ops {
                store.apply_op(id, field, op);
            }
            store.reap_detached();
            store.finish_creates();
            tracing::debug!(record = %id, fields = changes.len(), "updated");
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Planning
    // ------------------------------------------------------------------

    fn insert_item(&mut self, model_id: ModelId, data: &Value) -> CoreResult<RecordId> {
        let changes = self.payload_changes(model_id, data);
        self.insert_planned(model_id, changes)
    }

    fn insert_planned(&mut self, model_id: ModelId, changes: CoreResult<Changes>) -> CoreResult<RecordId> {
        self.stats.record_insert();
        let model = self.schema.model(model_id).name().to_string();
        let plan = changes
            .and_then(|changes| self.plan_record(model_id, changes))
            .inspect_err(|err| {
                self.stats.record_error();
                tracing::debug!(model = %model, error = %err, "insert rejected");
            })?;
        let id = self.apply_plan(*plan);
        self.reap_detached();
        self.finish_creates();
        tracing::debug!(model = %model, record = %id, "inserted");
        Ok(id)
    }

    /// Runs the `before_insert` rewrites of the extensions that apply.
    pub(crate) fn rewrite_for_insert(&self, model: &Model, changes: &mut Changes) -> CoreResult<()> {
        for extension in &self.extensions {
            if extension.applies_to(model) {
                extension
                    .before_insert(model, changes)
                    .map_err(|err| CoreError::hook(extension.name(), err))?;
            }
        }
        Ok(())
    }

    fn plan_record(&self, model_id: ModelId, mut changes: Changes) -> CoreResult<Box<Plan>> {
        let model = self.schema.model(model_id);
        self.rewrite_for_insert(model, &mut changes)?;

        let mut identity_targets: HashMap<FieldId, Target> = HashMap::new();
        let key = identity::resolve_key(model, &changes, |field, info, change| {
            let target = self.plan_single(model, field, info, change)?;
            let key = self.target_key(&target);
            identity_targets.insert(field.id(), target);
            Ok(key)
        })?;

        let mut ops = Vec::with_capacity(changes.len());
        for &field_id in model.identity() {
            let op = match identity_targets.remove(&field_id) {
                Some(target) => Op::SetOne(Some(target)),
                None => match changes.get(model.field(field_id).name()) {
                    Some(Change::Data(value)) => Op::Assign(value.clone()),
                    _ => continue,
                },
            };
            ops.push((field_id, op));
        }
        for (name, change) in changes.iter() {
            let Some(field) = self.known_field(model, name)? else {
                continue;
            };
            if field.is_identity() {
                continue;
            }
            if field.is_readonly() {
                return Err(CoreError::readonly_field(model.name(), field.name()));
            }
            let field_ops = self.plan_field(model, field, change)?;
            self.check_identity_owner(field, &key, &field_ops)?;
            ops.extend(field_ops.into_iter().map(|op| (field.id(), op)));
        }
        Ok(Box::new(Plan {
            model: model_id,
            key,
            ops,
        }))
    }

    fn plan_update(&self, model_id: ModelId, id: RecordId, changes: &Changes) -> CoreResult<Vec<(FieldId, Op)>> {
        let model = self.schema.model(model_id);
        let key = self
            .data(id)
            .map(|data| &data.key)
            .ok_or(CoreError::RecordNotFound { record: id })?;

        let mut ops = Vec::with_capacity(changes.len());
        for (name, change) in changes.iter() {
            let Some(field) = self.known_field(model, name)? else {
                continue;
            };
            if field.is_readonly() {
                return Err(CoreError::readonly_field(model.name(), field.name()));
            }
            if field.is_identity() {
                self.check_identity_unchanged(model, field, key, change)?;
                continue;
            }
            let field_ops = self.plan_field(model, field, change)?;
            self.check_identity_owner(field, key, &field_ops)?;
            ops.extend(field_ops.into_iter().map(|op| (field.id(), op)));
        }
        Ok(ops)
    }

    fn known_field<'m>(&self, model: &'m Model, name: &str) -> CoreResult<Option<&'m FieldInfo>> {
        match model.field_by_name(name) {
            Some(field) => Ok(Some(field)),
            None => match self.config.unknown_fields {
                UnknownFieldPolicy::Ignore => {
                    tracing::trace!(model = model.name(), field = name, "ignoring unknown field");
                    Ok(None)
                }
                UnknownFieldPolicy::Reject => Err(CoreError::unknown_field(model.name(), name)),
            },
        }
    }

    fn check_identity_unchanged(
        &self,
        model: &Model,
        field: &FieldInfo,
        key: &IdentityKey,
        change: &Change,
    ) -> CoreResult<()> {
        let current = model
            .identity()
            .iter()
            .position(|&f| f == field.id())
            .and_then(|pos| key.parts().get(pos));
        let proposed = match (field.shape(), change) {
            (FieldShape::Attr { .. }, Change::Data(value)) => Some(value.clone()),
            (FieldShape::Relation(_), Change::Data(Value::Null)) => None,
            (FieldShape::Relation(info), Change::Data(value)) => {
                Some(self.payload_key(info.target, value)?.to_value())
            }
            (FieldShape::Relation(_), Change::Link(target)) => match self.data(*target) {
                Some(data) => Some(data.key.to_value()),
                None => return Err(CoreError::RecordNotFound { record: *target }),
            },
            _ => None,
        };
        if proposed.is_some() && proposed.as_ref() == current {
            Ok(())
        } else {
            Err(CoreError::identity_immutable(model.name(), field.name()))
        }
    }

    /// Linking from the inverse side of an identity relation cannot move a
    /// record to another owner: its key already names the owner it has.
    fn check_identity_owner(&self, field: &FieldInfo, owner: &IdentityKey, ops: &[Op]) -> CoreResult<()> {
        let Some(info) = field.relation() else {
            return Ok(());
        };
        let Some(inverse) = info.inverse else {
            return Ok(());
        };
        let target_model = self.schema.model(info.target);
        let Some(position) = target_model.identity().iter().position(|&f| f == inverse) else {
            return Ok(());
        };

        let expected = owner.to_value();
        for op in ops {
            let targets: &[Target] = match op {
                Op::SetOne(Some(target)) => std::slice::from_ref(target),
                Op::Add(targets) | Op::Replace(targets) => targets.as_slice(),
                _ => &[],
            };
            for target in targets {
                if self.target_key(target).parts().get(position) != Some(&expected) {
                    return Err(CoreError::identity_immutable(
                        target_model.name(),
                        target_model.field(inverse).name(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn plan_field(&self, model: &Model, field: &FieldInfo, change: &Change) -> CoreResult<Vec<Op>> {
        let mismatch = |expected: &str, found: String| {
            CoreError::type_mismatch(model.name(), field.name(), expected, found)
        };
        let info = match field.shape() {
            FieldShape::Attr { .. } => {
                return match change {
                    Change::Data(value) => Ok(vec![Op::Assign(value.clone())]),
                    other => Err(mismatch("a value", other.describe())),
                };
            }
            FieldShape::Relation(info) => info,
        };

        let op = match (info.cardinality, change) {
            (_, Change::Data(Value::Null) | Change::Clear) => match info.cardinality {
                Cardinality::One => Op::SetOne(None),
                Cardinality::Many => Op::Replace(Vec::new()),
            },
            (Cardinality::One, Change::Unlink(target)) => {
                Op::Unlink(self.checked_ref(model, field, info, *target)?)
            }
            (Cardinality::One, other) => Op::SetOne(Some(self.plan_single(model, field, info, other)?)),

            (Cardinality::Many, Change::Data(Value::Array(items))) if is_command_list(items) => {
                return self.plan_commands(model, field, info, items);
            }
            (Cardinality::Many, Change::Data(Value::Array(items))) => Op::Replace(
                items
                    .iter()
                    .map(|item| self.plan_nested(model, field, info.target, item))
                    .collect::<CoreResult<_>>()?,
            ),
            (Cardinality::Many, Change::Data(value)) => {
                Op::Replace(vec![self.plan_nested(model, field, info.target, value)?])
            }
            (Cardinality::Many, Change::Link(target)) => {
                Op::Add(vec![self.checked_handle(model, field, info, *target)?])
            }
            (Cardinality::Many, Change::Add(targets)) => Op::Add(
                targets
                    .iter()
                    .map(|&t| self.checked_handle(model, field, info, t))
                    .collect::<CoreResult<_>>()?,
            ),
            (Cardinality::Many, Change::Replace(targets)) => Op::Replace(
                targets
                    .iter()
                    .map(|&t| self.checked_handle(model, field, info, t))
                    .collect::<CoreResult<_>>()?,
            ),
            (Cardinality::Many, Change::Unlink(target)) => {
                Op::Remove(vec![self.checked_ref(model, field, info, *target)?])
            }
            (Cardinality::Many, Change::Remove(targets)) => Op::Remove(
                targets
                    .iter()
                    .map(|&t| self.checked_ref(model, field, info, t))
                    .collect::<CoreResult<_>>()?,
            ),
        };
        Ok(vec![op])
    }

    /// Plans the single target of a `one` relation.
    fn plan_single(
        &self,
        model: &Model,
        field: &FieldInfo,
        info: &RelationInfo,
        change: &Change,
    ) -> CoreResult<Target> {
        match change {
            Change::Data(Value::Array(_)) => Err(CoreError::type_mismatch(
                model.name(),
                field.name(),
                "a single record",
                "array",
            )),
            Change::Data(value) => self.plan_nested(model, field, info.target, value),
            Change::Link(target) => self.checked_handle(model, field, info, *target),
            other => Err(CoreError::type_mismatch(
                model.name(),
                field.name(),
                "a single record",
                other.describe(),
            )),
        }
    }

    /// Plans a nested record payload: a map, or a bare key.
    fn plan_nested(&self, model: &Model, field: &FieldInfo, target: ModelId, value: &Value) -> CoreResult<Target> {
        let target_model = self.schema.model(target);
        let changes = match value {
            Value::Map(_) => Changes::from_value(value)?,
            Value::Null | Value::Array(_) => {
                return Err(CoreError::type_mismatch(
                    model.name(),
                    field.name(),
                    target_model.name(),
                    value.type_name(),
                ))
            }
            scalar => identity::bare_changes(target_model, scalar)?,
        };
        Ok(Target::Nested(self.plan_record(target, changes)?))
    }

    /// Resolves a payload naming a record to unlink. Never creates.
    fn plan_ref(&self, model: &Model, field: &FieldInfo, target: ModelId, value: &Value) -> CoreResult<TargetRef> {
        if matches!(value, Value::Null | Value::Array(_)) {
            return Err(CoreError::type_mismatch(
                model.name(),
                field.name(),
                self.schema.model(target).name(),
                value.type_name(),
            ));
        }
        Ok(TargetRef::Key(target, self.payload_key(target, value)?))
    }

    fn plan_commands(
        &self,
        model: &Model,
        field: &FieldInfo,
        info: &RelationInfo,
        items: &[Value],
    ) -> CoreResult<Vec<Op>> {
        let mut ops = Vec::with_capacity(items.len());
        for item in items {
            let parts = item.as_array().unwrap_or_default();
            let malformed = || {
                CoreError::invalid_payload(format!(
                    "malformed command {item} for {}.{}",
                    model.name(),
                    field.name()
                ))
            };
            let (command, args) = parts.split_first().ok_or_else(malformed)?;
            let op = match (command.as_text(), args) {
                (Some(CLEAR), []) => Op::Replace(Vec::new()),
                (Some(ADD), [arg]) => Op::Add(
                    command_args(arg)
                        .iter()
                        .map(|value| self.plan_nested(model, field, info.target, value))
                        .collect::<CoreResult<_>>()?,
                ),
                (Some(DELETE), [arg]) => Op::Remove(
                    command_args(arg)
                        .iter()
                        .map(|value| self.plan_ref(model, field, info.target, value))
                        .collect::<CoreResult<_>>()?,
                ),
                _ => return Err(malformed()),
            };
            ops.push(op);
        }
        Ok(ops)
    }

    fn checked_handle(
        &self,
        model: &Model,
        field: &FieldInfo,
        info: &RelationInfo,
        target: RecordId,
    ) -> CoreResult<Target> {
        self.checked_target(model, field, info.target, target)?;
        Ok(Target::Existing(target))
    }

    /// Handles given for removal may be dead; unlinking them is a no-op.
    fn checked_ref(
        &self,
        model: &Model,
        field: &FieldInfo,
        info: &RelationInfo,
        target: RecordId,
    ) -> CoreResult<TargetRef> {
        if self.contains(target) {
            self.checked_target(model, field, info.target, target)?;
        }
        Ok(TargetRef::Existing(target))
    }

    fn target_key(&self, target: &Target) -> IdentityKey {
        match target {
            Target::Existing(id) => self
                .data(*id)
                .map(|data| data.key.clone())
                .unwrap_or_else(|| IdentityKey::new(Vec::new())),
            Target::Nested(plan) => plan.key.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Applying
    // ------------------------------------------------------------------

    fn apply_plan(&mut self, plan: Plan) -> RecordId {
        let Plan { model, key, ops } = plan;
        let schema = std::sync::Arc::clone(&self.schema);

        let mut resolved = Vec::with_capacity(ops.len());
        for (field, op) in ops {
            let op = match op {
                Op::SetOne(Some(Target::Nested(nested))) if schema.field(model, field).is_identity() => {
                    Op::SetOne(Some(Target::Existing(self.apply_plan(*nested))))
                }
                other => other,
            };
            resolved.push((field, op));
        }

        let id = match self.lookup(model, &key) {
            Some(id) => {
                self.stats.record_update();
                id
            }
            None => self.create_record(model, key),
        };
        for (field, op) in resolved {
            self.apply_op(id, field, op);
        }
        id
    }

    fn apply_op(&mut self, id: RecordId, field: FieldId, op: Op) {
        match op {
            Op::Assign(value) => {
                self.set_attr(id, field, value);
            }
            Op::SetOne(target) => {
                let target = target.map(|t| self.resolve_target(t));
                self.set_one(id, field, target);
            }
            Op::Unlink(target) => self.unlink_ref(id, field, target),
            Op::Add(targets) => {
                for target in targets {
                    let target = self.resolve_target(target);
                    self.relate(id, field, target);
                }
            }
            Op::Remove(targets) => {
                for target in targets {
                    self.unlink_ref(id, field, target);
                }
            }
            Op::Replace(targets) => {
                let targets = targets.into_iter().map(|t| self.resolve_target(t)).collect();
                self.replace_many(id, field, targets);
            }
        }
    }

    fn resolve_target(&mut self, target: Target) -> RecordId {
        match target {
            Target::Existing(id) => id,
            Target::Nested(plan) => self.apply_plan(*plan),
        }
    }

    fn unlink_ref(&mut self, id: RecordId, field: FieldId, target: TargetRef) {
        match target {
            TargetRef::Existing(target) => {
                self.unrelate(id, field, target);
            }
            TargetRef::Key(model, key) => match self.lookup(model, &key) {
                Some(target) => {
                    self.unrelate(id, field, target);
                }
                None => {
                    tracing::debug!(record = %id, %key, "unlink of unknown record ignored");
                    self.stats.record_dangling_unlink();
                }
            },
        }
    }

    /// Runs `after_create` extensions for records created since the last call.
    pub(crate) fn finish_creates(&mut self) {
        let created = std::mem::take(&mut self.created);
        if self.extensions.is_empty() {
            return;
        }
        let extensions = self.extensions.clone();
        for id in created {
            for extension in &extensions {
                let applies = self
                    .data(id)
                    .is_some_and(|data| extension.applies_to(self.schema.model(data.model)));
                if !applies {
                    continue;
                }
                if let Err(err) = extension.after_create(self, id) {
                    tracing::warn!(extension = extension.name(), record = %id, error = %err, "after_create failed");
                    self.stats.record_error();
                    self.deferred_errors.push(CoreError::hook(extension.name(), err));
                }
            }
        }
    }
}

fn is_command_list(items: &[Value]) -> bool {
    !items.is_empty()
        && items.iter().all(|item| {
            matches!(
                item.as_array()
                    .and_then(<[Value]>::first)
                    .and_then(Value::as_text),
                Some(ADD | DELETE | CLEAR)
            )
        })
}

/// `["ADD", x]` takes one record or a list of records.
fn command_args(arg: &Value) -> &[Value] {
    match arg {
        Value::Array(items) => items,
        single => std::slice::from_ref(single),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::extension::StoreExtension;
    use crate::model::{Field, ModelDef, Schema};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn schema() -> Schema {
        Schema::builder()
            .model(
                ModelDef::new("Thread")
                    .identity(["model", "id"])
                    .field(Field::attr("model"))
                    .field(Field::attr("id"))
                    .field(Field::attr("name"))
                    .field(Field::many("messages", "Message").inverse("thread"))
                    .field(
                        Field::attr("total")
                            .compute(|ctx, id| Value::from(ctx.count(id, "messages") as i64)),
                    ),
            )
            .model(
                ModelDef::new("Message")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::attr("body"))
                    .field(Field::one("thread", "Thread"))
                    .field(Field::one("author", "Persona"))
                    .field(Field::many("reactions", "Reaction").inverse("message").owned()),
            )
            .model(
                ModelDef::new("Persona")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::attr("name")),
            )
            .model(
                ModelDef::new("Reaction")
                    .identity(["message", "content"])
                    .field(Field::one("message", "Message"))
                    .field(Field::attr("content"))
                    .field(Field::many("personas", "Persona")),
            )
            .build()
            .unwrap()
    }

    fn obj<const N: usize>(pairs: [(&str, Value); N]) -> Value {
        Value::object(pairs)
    }

    fn message(id: i64, body: &str) -> Value {
        obj([("id", id.into()), ("body", body.into())])
    }

    #[test]
    fn nested_payload_is_inserted_depth_first() {
        let mut store = Store::new(schema());
        let payload = obj([
            ("id", 10.into()),
            ("body", "hello".into()),
            ("thread", obj([("model", "channel".into()), ("id", 1.into())])),
            ("author", obj([("id", 3.into()), ("name", "Ada".into())])),
        ]);
        let id = store.insert("Message", payload).unwrap();

        let record = store.record(id).unwrap();
        let thread = record.related("thread").unwrap();
        assert_eq!(thread.many("messages"), &[id]);
        assert_eq!(thread.attr("total"), Some(&Value::from(1)));
        assert_eq!(
            record.related("author").and_then(|a| a.attr("name").cloned()),
            Some(Value::from("Ada"))
        );
        assert!(store.check_invariants().is_empty());
    }

    #[test]
    fn bare_keys_relate_without_payload() {
        let mut store = Store::new(schema());
        let id = store
            .insert("Message", obj([("id", 10.into()), ("author", 3.into())]))
            .unwrap();
        let author = store.record(id).unwrap().related("author").unwrap();
        assert_eq!(author.key().parts(), &[Value::from(3)]);
        assert_eq!(author.attr("name"), Some(&Value::Null));
    }

    #[test]
    fn missing_nested_identity_aborts_whole_item() {
        let mut store = Store::new(schema());
        let payload = obj([
            ("id", 10.into()),
            ("author", obj([("id", 3.into())])),
            ("thread", obj([("id", 1.into())])),
        ]);
        let err = store.insert("Message", payload).unwrap_err();
        assert!(matches!(
            err,
            CoreError::MissingIdentity { ref model, ref field } if model == "Thread" && field == "model"
        ));
        assert!(store.is_empty());
        assert_eq!(store.stats().errors(), 1);
    }

    #[test]
    fn one_relation_rejects_arrays() {
        let mut store = Store::new(schema());
        let payload = obj([("id", 10.into()), ("author", Value::Array(vec![3.into()]))]);
        let err = store.insert("Message", payload).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn handles_of_wrong_model_are_rejected() {
        let mut store = Store::new(schema());
        let persona = store.insert("Persona", obj([("id", 3.into())])).unwrap();
        let err = store
            .insert_changes("Message", Changes::new().set("id", 10).link("thread", persona))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::TypeMismatch { ref expected, ref found, .. } if expected == "Thread" && found == "Persona"
        ));
        assert_eq!(store.len("Message").unwrap(), 0);
    }

    #[test]
    fn computed_fields_are_readonly() {
        let mut store = Store::new(schema());
        let payload = obj([("model", "chat".into()), ("id", 1.into()), ("total", 9.into())]);
        let err = store.insert("Thread", payload).unwrap_err();
        assert!(matches!(err, CoreError::ReadonlyField { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn command_lists_edit_many_relations() {
        let mut store = Store::new(schema());
        let thread = store
            .insert(
                "Thread",
                obj([
                    ("model", "chat".into()),
                    ("id", 1.into()),
                    ("messages", Value::Array(vec![message(1, "a"), message(2, "b")])),
                ]),
            )
            .unwrap();

        let commands = Value::Array(vec![
            Value::Array(vec![ADD.into(), Value::Array(vec![message(3, "c"), 4.into()])]),
            Value::Array(vec![DELETE.into(), 1.into()]),
        ]);
        store
            .insert(
                "Thread",
                obj([("model", "chat".into()), ("id", 1.into()), ("messages", commands)]),
            )
            .unwrap();

        let keys: Vec<Value> = store
            .record(thread)
            .unwrap()
            .many("messages")
            .iter()
            .map(|&m| store.record(m).unwrap().key().parts()[0].clone())
            .collect();
        assert_eq!(keys, vec![2.into(), 3.into(), 4.into()]);

        let clear = Value::Array(vec![Value::Array(vec![CLEAR.into()])]);
        store
            .insert(
                "Thread",
                obj([("model", "chat".into()), ("id", 1.into()), ("messages", clear)]),
            )
            .unwrap();
        assert!(store.record(thread).unwrap().many("messages").is_empty());
        assert_eq!(store.record(thread).unwrap().attr("total"), Some(&Value::from(0)));
    }

    #[test]
    fn malformed_command_is_invalid_payload() {
        let mut store = Store::new(schema());
        let commands = Value::Array(vec![Value::Array(vec![ADD.into(), 1.into(), 2.into()])]);
        let err = store
            .insert(
                "Thread",
                obj([("model", "chat".into()), ("id", 1.into()), ("messages", commands)]),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayload { .. }));
    }

    #[test]
    fn removing_unknown_member_is_tolerated() {
        let mut store = Store::new(schema());
        let commands = Value::Array(vec![Value::Array(vec![DELETE.into(), 99.into()])]);
        store
            .insert(
                "Thread",
                obj([("model", "chat".into()), ("id", 1.into()), ("messages", commands)]),
            )
            .unwrap();
        assert_eq!(store.stats().dangling_unlinks(), 1);
        assert_eq!(store.len("Message").unwrap(), 0);
    }

    #[test]
    fn update_rejects_identity_changes() {
        let mut store = Store::new(schema());
        let id = store.insert("Persona", obj([("id", 3.into())])).unwrap();

        let err = store.update(id, Changes::new().set("id", 4)).unwrap_err();
        assert!(matches!(err, CoreError::IdentityImmutable { .. }));

        store
            .update(id, Changes::new().set("id", 3).set("name", "Ada"))
            .unwrap();
        assert_eq!(store.record(id).unwrap().attr("name"), Some(&Value::from("Ada")));
    }

    #[test]
    fn update_validates_before_mutating() {
        let mut store = Store::new(schema());
        let id = store.insert("Message", message(1, "a")).unwrap();
        let changes = Changes::new().set("body", "b").set("thread", Value::Array(vec![]));
        assert!(store.update(id, changes).is_err());
        assert_eq!(store.record(id).unwrap().attr("body"), Some(&Value::from("a")));

        let dead = store.insert("Persona", obj([("id", 1.into())])).unwrap();
        store.delete(dead).unwrap();
        assert!(matches!(
            store.update(dead, Changes::new()),
            Err(CoreError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn update_links_handles_and_nested_payloads() {
        let mut store = Store::new(schema());
        let message_id = store.insert("Message", message(1, "a")).unwrap();
        let persona = store.insert("Persona", obj([("id", 3.into())])).unwrap();

        store
            .update(message_id, Changes::new().link("author", persona))
            .unwrap();
        assert_eq!(store.record(message_id).unwrap().one("author"), Some(persona));

        store
            .update(
                message_id,
                Changes::new().set("thread", obj([("model", "chat".into()), ("id", 5.into())])),
            )
            .unwrap();
        let thread = store.record(message_id).unwrap().one("thread").unwrap();
        assert_eq!(store.record(thread).unwrap().many("messages"), &[message_id]);

        store
            .update(message_id, Changes::new().unlink("author", persona))
            .unwrap();
        assert_eq!(store.record(message_id).unwrap().one("author"), None);
    }

    #[test]
    fn unknown_fields_follow_policy() {
        let mut lenient = Store::new(schema());
        lenient
            .insert("Persona", obj([("id", 1.into()), ("avatar", "x".into())]))
            .unwrap();

        let config = StoreConfig::new().unknown_fields(UnknownFieldPolicy::Reject);
        let mut strict = Store::with_config(schema(), config);
        let err = strict
            .insert("Persona", obj([("id", 1.into()), ("avatar", "x".into())]))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownField { .. }));
    }

    #[test]
    fn relation_identity_resolves_through_nested_owner() {
        let mut store = Store::new(schema());
        let payload = obj([
            ("id", 1.into()),
            (
                "reactions",
                Value::Array(vec![obj([
                    ("message", 1.into()),
                    ("content", "+1".into()),
                    ("personas", Value::Array(vec![7.into()])),
                ])]),
            ),
        ]);
        let message_id = store.insert("Message", payload.clone()).unwrap();
        store.insert("Message", payload).unwrap();

        assert_eq!(store.len("Reaction").unwrap(), 1);
        let reaction = store.record(message_id).unwrap().many("reactions")[0];
        assert_eq!(store.record(reaction).unwrap().one("message"), Some(message_id));
        assert!(store.check_invariants().is_empty());
    }

    #[test]
    fn ingest_collects_failures_per_item() {
        let mut store = Store::new(schema());
        let payload = obj([
            ("Persona", Value::Array(vec![obj([("id", 1.into())]), obj([("name", "x".into())])])),
            ("Message", message(5, "hi")),
            ("Ghost", obj([("id", 1.into())])),
        ]);
        let report = store.ingest(&payload).unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].model, "Persona");
        assert_eq!(report.failures[0].index, 1);
        assert!(matches!(report.failures[1].error, CoreError::UnknownModel { .. }));
        assert!(report.flush.as_ref().is_some_and(|f| f.events == 2));
        assert!(!report.is_success());
    }

    #[test]
    fn ingest_cbor_decodes_payload() {
        let mut store = Store::new(schema());
        let payload = obj([("Persona", obj([("id", 1.into()), ("name", "Ada".into())]))]);
        let bytes = livegraph_value::to_cbor(&payload).unwrap();

        let report = store.ingest_cbor(&bytes).unwrap();
        assert!(report.is_success());
        assert!(store.get("Persona", &[Value::from(1)]).is_some());
        assert!(store.ingest_cbor(&[0xff]).is_err());

        // {"Persona": <array of 2^40 items>}, truncated.
        let mut huge = vec![0xa1, 0x67];
        huge.extend_from_slice(b"Persona");
        huge.extend_from_slice(&[0x9b, 0, 0, 1, 0, 0, 0, 0, 0]);
        assert!(matches!(
            store.ingest_cbor(&huge),
            Err(CoreError::Value(livegraph_value::ValueError::DecodingFailed { .. }))
        ));
        assert_eq!(store.len("Persona").unwrap(), 1);
    }

    #[test]
    fn insert_many_is_independent_per_item() {
        let mut store = Store::new(schema());
        let results = store
            .insert_many(
                "Persona",
                &[obj([("id", 1.into())]), obj([("name", "x".into())]), obj([("id", 2.into())])],
            )
            .unwrap();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert_eq!(store.stats().flushes(), 1);
    }

    struct Defaults {
        created: Arc<AtomicUsize>,
    }

    impl StoreExtension for Defaults {
        fn name(&self) -> &str {
            "defaults"
        }

        fn applies_to(&self, model: &Model) -> bool {
            model.name() == "Persona"
        }

        fn before_insert(&self, _model: &Model, changes: &mut Changes) -> CoreResult<()> {
            if changes.get("name").is_none() {
                changes.push("name", Change::Data("anonymous".into()));
            }
            Ok(())
        }

        fn after_create(&self, _store: &mut Store, _record: RecordId) -> CoreResult<()> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn extensions_rewrite_payloads_and_observe_creation() {
        let created = Arc::new(AtomicUsize::new(0));
        let mut store = Store::builder(schema())
            .extension(Defaults {
                created: Arc::clone(&created),
            })
            .build();

        let id = store
            .insert("Message", obj([("id", 1.into()), ("author", 3.into())]))
            .unwrap();
        let author = store.record(id).unwrap().related("author").unwrap();
        assert_eq!(author.attr("name"), Some(&Value::from("anonymous")));

        store.insert("Persona", obj([("id", 3.into())])).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    struct ChatThreads;

    impl StoreExtension for ChatThreads {
        fn name(&self) -> &str {
            "chat-threads"
        }

        fn applies_to(&self, model: &Model) -> bool {
            model.name() == "Thread"
        }

        fn before_insert(&self, _model: &Model, changes: &mut Changes) -> CoreResult<()> {
            if changes.get("model").is_none() {
                changes.push("model", Change::Data("chat".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn resolve_sees_extension_rewrites() {
        let mut store = Store::builder(schema()).extension(ChatThreads).build();
        let payload = obj([("id", 5.into())]);

        assert_eq!(store.find("Thread", &payload).unwrap().map(|r| r.id()), None);
        let id = store.insert("Thread", payload.clone()).unwrap();

        let (key, found) = store.resolve("Thread", &payload).unwrap();
        assert_eq!(found, Some(id));
        assert_eq!(key.parts(), &[Value::from("chat"), Value::from(5)]);
        assert_eq!(store.find("Thread", &payload).unwrap().map(|r| r.id()), Some(id));

        let message = store
            .insert("Message", obj([("id", 1.into()), ("thread", payload)]))
            .unwrap();
        assert_eq!(store.record(message).unwrap().one("thread"), Some(id));
    }

    #[test]
    fn dead_handle_on_identity_relation_is_not_found() {
        let mut store = Store::new(schema());
        let message_id = store.insert("Message", message(1, "a")).unwrap();
        let reaction = store
            .insert_changes("Reaction", Changes::new().link("message", message_id).set("content", "+1"))
            .unwrap();
        let dead = store.insert("Message", message(2, "b")).unwrap();
        store.delete(dead).unwrap();

        let err = store
            .update(reaction, Changes::new().link("message", dead))
            .unwrap_err();
        assert!(matches!(err, CoreError::RecordNotFound { record } if record == dead));

        let other = store.insert("Message", message(3, "c")).unwrap();
        let err = store
            .update(reaction, Changes::new().link("message", other))
            .unwrap_err();
        assert!(matches!(err, CoreError::IdentityImmutable { .. }));
    }
}
