//! The store facade.
//!
//! A [`Store`] owns the record arena, one identity registry per model, the
//! compute engine and the change feed. Mutation entry points live here and
//! in the `insert`, `relation` and `compute` modules; this file holds
//! construction, reads, deletion and the invariant audit.

use crate::change_feed::{ChangeEvent, ChangeFeed, PendingChanges};
use crate::changes::{Change, Changes};
use crate::compute::{ComputeEngine, FlushReport};
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult, StoreWarning};
use crate::extension::StoreExtension;
use crate::identity::{self, IdentityKey};
use crate::model::{FieldInfo, Model, Schema};
use crate::record::{FieldValue, RecordData, RecordMut, RecordRef};
use crate::stats::StoreStats;
use crate::types::{FieldId, ModelId, RecordId, SequenceNumber};
use livegraph_value::Value;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// A store behind a mutex, for callers that share it across threads.
pub type SharedStore = Arc<Mutex<Store>>;

#[derive(Debug)]
struct Slot {
    generation: u32,
    record: Option<RecordData>,
}

/// The reactive relational object store.
///
/// # Example
///
/// ```rust,ignore
/// use livegraph_core::{Field, ModelDef, Schema, Store};
/// use livegraph_value::Value;
///
/// let schema = Schema::builder()
///     .model(ModelDef::new("Persona").identity(["id"]).field(Field::attr("id")).field(Field::attr("name")))
///     .build()?;
/// let mut store = Store::new(schema);
///
/// let id = store.insert("Persona", Value::object([("id", 5.into()), ("name", "x".into())]))?;
/// store.insert("Persona", Value::object([("id", 5.into()), ("email", "y".into())]))?;
/// assert_eq!(store.record(id).unwrap().attr("name"), Some(&Value::from("x")));
/// ```
pub struct Store {
    pub(crate) schema: Arc<Schema>,
    pub(crate) config: StoreConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    registries: Vec<HashMap<IdentityKey, RecordId>>,
    pub(crate) engine: ComputeEngine,
    pub(crate) pending: PendingChanges,
    pub(crate) warnings: Vec<StoreWarning>,
    /// Extension errors raised outside a flush, reported by the next one.
    pub(crate) deferred_errors: Vec<CoreError>,
    /// Records created by the running insert, awaiting `after_create`.
    pub(crate) created: Vec<RecordId>,
    /// Records that lost an identity relation, deleted by `reap_detached`.
    pub(crate) detached: Vec<RecordId>,
    pub(crate) extensions: Vec<Arc<dyn StoreExtension>>,
    pub(crate) feed: ChangeFeed,
    pub(crate) stats: Arc<StoreStats>,
    batch_depth: usize,
    pub(crate) flushing: bool,
    pub(crate) sequence: SequenceNumber,
    last_flush: Option<FlushReport>,
    live: usize,
}

/// Builder for a [`Store`] with configuration and extensions.
pub struct StoreBuilder {
    schema: Schema,
    config: StoreConfig,
    extensions: Vec<Arc<dyn StoreExtension>>,
}

impl StoreBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends an extension. Extensions run in registration order.
    #[must_use]
    pub fn extension(mut self, extension: impl StoreExtension + 'static) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    /// Builds the store.
    pub fn build(self) -> Store {
        let mut store = Store::with_config(self.schema, self.config);
        store.extensions = self.extensions;
        store
    }
}

impl Store {
    /// Creates an empty store with the default configuration.
    pub fn new(schema: Schema) -> Self {
        Self::with_config(schema, StoreConfig::default())
    }

    /// Creates an empty store with a custom configuration.
    pub fn with_config(schema: Schema, config: StoreConfig) -> Self {
        let registries = vec![HashMap::new(); schema.models().len()];
        let feed = ChangeFeed::with_max_history(config.feed_history);
        Self {
            schema: Arc::new(schema),
            config,
            slots: Vec::new(),
            free: Vec::new(),
            registries,
            engine: ComputeEngine::default(),
            pending: PendingChanges::default(),
            warnings: Vec::new(),
            deferred_errors: Vec::new(),
            created: Vec::new(),
            detached: Vec::new(),
            extensions: Vec::new(),
            feed,
            stats: Arc::new(StoreStats::new()),
            batch_depth: 0,
            flushing: false,
            sequence: SequenceNumber::default(),
            last_flush: None,
            live: 0,
        }
    }

    /// Starts building a store with extensions.
    pub fn builder(schema: Schema) -> StoreBuilder {
        StoreBuilder {
            schema,
            config: StoreConfig::default(),
            extensions: Vec::new(),
        }
    }

    /// Wraps the store for shared use.
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the statistics counters.
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Returns a shared handle to the statistics counters.
    pub fn stats_handle(&self) -> Arc<StoreStats> {
        Arc::clone(&self.stats)
    }

    /// Returns the report of the last automatic flush.
    pub fn last_flush(&self) -> Option<&FlushReport> {
        self.last_flush.as_ref()
    }

    /// Returns the sequence number of the last flush that emitted events.
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Resolves a model name.
    ///
    /// # Errors
    ///
    /// `UnknownModel` if the schema does not declare it.
    pub fn model_id(&self, name: &str) -> CoreResult<ModelId> {
        self.schema
            .model_id(name)
            .ok_or_else(|| CoreError::unknown_model(name))
    }

    /// Borrows a live record.
    pub fn record(&self, id: RecordId) -> Option<RecordRef<'_>> {
        self.data(id).map(|data| RecordRef::new(self, id, data))
    }

    /// Borrows a live record for writing.
    pub fn record_mut(&mut self, id: RecordId) -> Option<RecordMut<'_>> {
        if self.contains(id) {
            Some(RecordMut::new(self, id))
        } else {
            None
        }
    }

    /// Returns true if `id` refers to a live record.
    pub fn contains(&self, id: RecordId) -> bool {
        self.data(id).is_some()
    }

    /// Looks up a record by its identity values, in declared order.
    pub fn get(&self, model: &str, key: &[Value]) -> Option<RecordRef<'_>> {
        let model_id = self.schema.model_id(model)?;
        let id = self.lookup(model_id, &IdentityKey::new(key.to_vec()))?;
        self.record(id)
    }

    /// Resolves a payload's identity without changing anything.
    ///
    /// Returns the key and the record it currently names, if any. Extension
    /// `before_insert` rewrites apply first, so the key is the one an insert
    /// of the same payload would use.
    ///
    /// # Errors
    ///
    /// `UnknownModel`, `MissingIdentity`, `InvalidPayload`, `Hook`, or
    /// `TypeMismatch` / `RecordNotFound` for record handles in relation
    /// identity fields.
    pub fn resolve(&self, model: &str, data: &Value) -> CoreResult<(IdentityKey, Option<RecordId>)> {
        let model_id = self.model_id(model)?;
        let key = self.payload_key(model_id, data)?;
        let existing = self.lookup(model_id, &key);
        Ok((key, existing))
    }

    /// Finds the record a payload describes.
    ///
    /// # Errors
    ///
    /// Same as [`Store::resolve`].
    pub fn find(&self, model: &str, data: &Value) -> CoreResult<Option<RecordRef<'_>>> {
        let (_, existing) = self.resolve(model, data)?;
        Ok(existing.and_then(|id| self.record(id)))
    }

    /// Returns the live records of a model, oldest slot first.
    ///
    /// # Errors
    ///
    /// `UnknownModel`.
    pub fn records(&self, model: &str) -> CoreResult<Vec<RecordRef<'_>>> {
        let model_id = self.model_id(model)?;
        let mut ids: Vec<RecordId> = self.registries[model_id.index()].values().copied().collect();
        ids.sort_unstable();
        Ok(ids.into_iter().filter_map(|id| self.record(id)).collect())
    }

    /// Returns the number of live records of a model.
    ///
    /// # Errors
    ///
    /// `UnknownModel`.
    pub fn len(&self, model: &str) -> CoreResult<usize> {
        let model_id = self.model_id(model)?;
        Ok(self.registries[model_id.index()].len())
    }

    /// Returns the number of live records across all models.
    pub fn record_count(&self) -> usize {
        self.live
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    // ------------------------------------------------------------------
    // Change feed
    // ------------------------------------------------------------------

    /// Subscribes to change events of future flushes.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// Returns retained events newer than `cursor`.
    pub fn poll(&self, cursor: SequenceNumber, limit: usize) -> Vec<ChangeEvent> {
        self.feed.poll(cursor, limit)
    }

    // ------------------------------------------------------------------
    // Batching
    // ------------------------------------------------------------------

    /// Runs `f` as one batch: recomputation, hooks and notifications happen
    /// once, when the outermost batch ends (if `auto_flush` is on).
    ///
    /// Every public mutating call is a batch of its own. Mutations that
    /// succeeded inside `f` stay applied even if `f` returns an error.
    ///
    /// # Errors
    ///
    /// The error of `f`, or else the error of the closing flush.
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut Self) -> CoreResult<T>) -> CoreResult<T> {
        self.batch_depth += 1;
        let result = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 && self.config.auto_flush && !self.flushing {
            match self.flush() {
                Ok(report) => self.last_flush = Some(report),
                Err(err) => return result.and(Err(err)),
            }
        }
        result
    }

    pub(crate) fn enter_batch(&mut self) {
        self.batch_depth += 1;
    }

    pub(crate) fn leave_batch(&mut self) -> bool {
        self.batch_depth -= 1;
        self.batch_depth == 0 && self.config.auto_flush && !self.flushing
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Deletes a record, its owned dependents, and records whose identity
    /// points at a deleted record.
    ///
    /// Returns `false` if the record was already gone.
    ///
    /// # Errors
    ///
    /// An error from an extension's `before_delete`, in which case nothing
    /// is deleted.
    pub fn delete(&mut self, id: RecordId) -> CoreResult<bool> {
        if !self.contains(id) {
            return Ok(false);
        }
        self.batch(|store| {
            let doomed = store.cascade_set(id);
            for &record in &doomed {
                store.check_delete(record)?;
            }
            for &record in &doomed {
                store.remove_record(record);
            }
            store.reap_detached();
            tracing::debug!(record = %id, cascaded = doomed.len() - 1, "deleted");
            Ok(true)
        })
    }

    /// Deletes records whose identity relation was unlinked from the other
    /// side, together with their cascades.
    ///
    /// Such a record no longer matches its registered key. `before_delete`
    /// is not consulted: the record cannot be kept.
    pub(crate) fn reap_detached(&mut self) {
        while !self.detached.is_empty() {
            for id in std::mem::take(&mut self.detached) {
                if !self.lost_identity(id) {
                    continue;
                }
                let doomed = self.cascade_set(id);
                for &record in &doomed {
                    self.remove_record(record);
                }
                tracing::debug!(record = %id, cascaded = doomed.len() - 1, "deleted record detached from its identity");
            }
        }
    }

    fn lost_identity(&self, id: RecordId) -> bool {
        self.data(id).is_some_and(|data| {
            self.schema
                .model(data.model)
                .identity()
                .iter()
                .any(|&field| matches!(data.value(field), FieldValue::One(None)))
        })
    }

    /// Collects `root` and everything deleting it takes along, root first.
    fn cascade_set(&self, root: RecordId) -> Vec<RecordId> {
        let mut order = vec![root];
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            let Some(data) = self.data(id) else {
                continue;
            };
            let model = self.schema.model(data.model);
            let owned = model
                .relations()
                .filter(|(_, info)| info.owned)
                .flat_map(|(field, _)| data.value(field.id()).targets().iter().copied());
            let identity_holders = data
                .referrers
                .iter()
                .filter(|(holder, field)| {
                    self.data(*holder)
                        .is_some_and(|h| self.schema.field(h.model, *field).is_identity())
                })
                .map(|(holder, _)| *holder);
            for next in owned.chain(identity_holders).collect::<Vec<_>>() {
                if seen.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }
        order
    }

    fn check_delete(&self, id: RecordId) -> CoreResult<()> {
        let Some(data) = self.data(id) else {
            return Ok(());
        };
        let model = self.schema.model(data.model);
        for extension in &self.extensions {
            if extension.applies_to(model) {
                extension
                    .before_delete(self, id)
                    .map_err(|err| CoreError::hook(extension.name(), err))?;
            }
        }
        Ok(())
    }

    /// Unlinks a record from everything, frees its key and its slot.
    fn remove_record(&mut self, id: RecordId) {
        let Some(data) = self.data(id) else {
            return;
        };
        let schema = Arc::clone(&self.schema);
        let model = schema.model(data.model);

        let outgoing: Vec<(FieldId, Vec<RecordId>)> = model
            .relations()
            .map(|(field, _)| (field.id(), data.value(field.id()).targets().to_vec()))
            .collect();
        for (field, targets) in outgoing {
            for target in targets {
                self.unrelate(id, field, target);
            }
        }

        let incoming: Vec<(RecordId, FieldId)> = self
            .data(id)
            .map(|data| data.referrers.iter().copied().collect())
            .unwrap_or_default();
        for (holder, field) in incoming {
            self.unrelate(holder, field, id);
        }

        let slot = &mut self.slots[id.index() as usize];
        let Some(data) = slot.record.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.registries[data.model.index()].remove(&data.key);
        self.live -= 1;

        self.engine.forget_record(id);
        self.pending.deleted(id, data.model, &data.key);
        self.stats.record_delete();
    }

    // ------------------------------------------------------------------
    // Arena internals
    // ------------------------------------------------------------------

    pub(crate) fn data(&self, id: RecordId) -> Option<&RecordData> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.record.as_ref()
    }

    pub(crate) fn data_mut(&mut self, id: RecordId) -> Option<&mut RecordData> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.record.as_mut()
    }

    pub(crate) fn lookup(&self, model: ModelId, key: &IdentityKey) -> Option<RecordId> {
        self.registries[model.index()].get(key).copied()
    }

    pub(crate) fn field_info(&self, id: RecordId, field: FieldId) -> Option<&FieldInfo> {
        let data = self.data(id)?;
        Some(self.schema.field(data.model, field))
    }

    /// Allocates a record with default values and registers its key.
    pub(crate) fn create_record(&mut self, model_id: ModelId, key: IdentityKey) -> RecordId {
        let schema = Arc::clone(&self.schema);
        let model = schema.model(model_id);
        let data = RecordData::new(model, key.clone());

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.record = Some(data);
                RecordId::new(index, slot.generation)
            }
            None => {
                let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(data),
                });
                RecordId::new(index, 0)
            }
        };

        self.registries[model_id.index()].insert(key.clone(), id);
        self.live += 1;
        for field in model.computed_fields() {
            self.engine.mark_stale((id, field.id()));
        }
        self.pending.created(id, model_id, &key);
        self.created.push(id);
        self.stats.record_create();
        tracing::trace!(model = model.name(), record = %id, %key, "created");
        id
    }

    /// Records that `(id, field)` changed: invalidates dependents, notes the
    /// change for the feed and queues the field's update hook.
    pub(crate) fn touch(&mut self, id: RecordId, field: FieldId) {
        let slot = match self.slots.get(id.index() as usize) {
            Some(slot) if slot.generation == id.generation() => slot,
            _ => return,
        };
        let Some(data) = slot.record.as_ref() else {
            return;
        };
        self.pending.updated(id, data.model, &data.key, field);
        let has_hook = self.schema.field(data.model, field).on_update().is_some();

        self.engine.invalidate((id, field));
        if has_hook {
            self.engine.queue_hook((id, field));
        }
    }

    /// Converts a record payload: a map of fields, or a bare key for a model
    /// with a single attribute identity.
    pub(crate) fn payload_changes(&self, model: ModelId, value: &Value) -> CoreResult<Changes> {
        match value {
            Value::Map(_) => Changes::from_value(value),
            Value::Array(_) | Value::Null => Err(CoreError::invalid_payload(format!(
                "expected a {} record, found {}",
                self.schema.model(model).name(),
                value.type_name()
            ))),
            scalar => identity::bare_changes(self.schema.model(model), scalar),
        }
    }

    /// Pure identity resolution, following nested payloads and handles.
    /// The key an insert of `value` would resolve to, without creating
    /// anything.
    pub(crate) fn payload_key(&self, model_id: ModelId, value: &Value) -> CoreResult<IdentityKey> {
        let mut changes = self.payload_changes(model_id, value)?;
        self.rewrite_for_insert(self.schema.model(model_id), &mut changes)?;
        self.lookup_key(model_id, &changes)
    }

    pub(crate) fn lookup_key(&self, model_id: ModelId, changes: &Changes) -> CoreResult<IdentityKey> {
        let model = self.schema.model(model_id);
        identity::resolve_key(model, changes, |field, info, change| match change {
            Change::Data(value) => self.payload_key(info.target, value),
            Change::Link(target) => Ok(self
                .checked_target(model, field, info.target, *target)?
                .key
                .clone()),
            other => Err(CoreError::type_mismatch(
                model.name(),
                field.name(),
                "a single record",
                other.describe(),
            )),
        })
    }

    /// Validates a record handle given for a relation.
    pub(crate) fn checked_target(
        &self,
        model: &Model,
        field: &FieldInfo,
        target_model: ModelId,
        target: RecordId,
    ) -> CoreResult<&RecordData> {
        let data = self
            .data(target)
            .ok_or(CoreError::RecordNotFound { record: target })?;
        if data.model != target_model {
            return Err(CoreError::type_mismatch(
                model.name(),
                field.name(),
                self.schema.model(target_model).name(),
                self.schema.model(data.model).name(),
            ));
        }
        Ok(data)
    }

    pub(crate) fn describe_node(&self, id: RecordId, field: FieldId) -> String {
        match self.data(id) {
            Some(data) => {
                let model = self.schema.model(data.model);
                format!("{}{}.{}", model.name(), data.key, model.field(field).name())
            }
            None => format!("{id}.{}", field.as_u32()),
        }
    }

    // ------------------------------------------------------------------
    // Audit
    // ------------------------------------------------------------------

    /// Checks identity, symmetry, back-reference and cascade invariants over
    /// the whole store. Returns every violation found.
    pub fn check_invariants(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut registered = 0;

        for (index, slot) in self.slots.iter().enumerate() {
            let Some(data) = &slot.record else {
                continue;
            };
            let id = RecordId::new(u32::try_from(index).unwrap_or(u32::MAX), slot.generation);
            let model = self.schema.model(data.model);
            registered += 1;

            if self.lookup(data.model, &data.key) != Some(id) {
                violations.push(Violation::UnregisteredRecord {
                    record: id,
                    model: model.name().to_string(),
                    key: data.key.clone(),
                });
            }

            for (field, info) in model.relations() {
                let name = || format!("{}.{}", model.name(), field.name());
                let targets = data.value(field.id()).targets();
                let mut seen = HashSet::new();
                for &target in targets {
                    if !seen.insert(target) {
                        violations.push(Violation::DuplicateMember {
                            record: id,
                            field: name(),
                            target,
                        });
                    }
                    let Some(target_data) = self.data(target) else {
                        violations.push(Violation::DanglingLink {
                            record: id,
                            field: name(),
                            target,
                        });
                        continue;
                    };
                    if !target_data.referrers.contains(&(id, field.id())) {
                        violations.push(Violation::MissingReferrer {
                            record: id,
                            field: name(),
                            target,
                        });
                    }
                    if let Some(inverse) = info.inverse {
                        if !target_data.value(inverse).holds(id) {
                            violations.push(Violation::AsymmetricRelation {
                                record: id,
                                field: name(),
                                target,
                            });
                        }
                    }
                }

                if field.is_identity() {
                    let component = model
                        .identity()
                        .iter()
                        .position(|&f| f == field.id())
                        .and_then(|pos| data.key.parts().get(pos));
                    let linked_key = match data.value(field.id()) {
                        FieldValue::One(Some(target)) => self.data(*target).map(|t| t.key.to_value()),
                        _ => None,
                    };
                    if linked_key.is_none() || linked_key.as_ref() != component {
                        violations.push(Violation::BrokenIdentity {
                            record: id,
                            field: name(),
                        });
                    }
                }
            }

            for &(holder, field) in &data.referrers {
                let holds = self
                    .data(holder)
                    .is_some_and(|h| h.value(field).holds(id));
                if !holds {
                    violations.push(Violation::StaleReferrer {
                        record: id,
                        holder,
                        field: field.as_u32(),
                    });
                }
            }
        }

        let indexed: usize = self.registries.iter().map(HashMap::len).sum();
        if indexed != registered {
            violations.push(Violation::RegistrySize {
                registered: indexed,
                live: registered,
            });
        }
        violations
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("models", &self.schema.models().len())
            .field("records", &self.live)
            .field("sequence", &self.sequence)
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}

/// An invariant violation found by [`Store::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A live record is not the registry entry for its own key.
    UnregisteredRecord {
        /// The record.
        record: RecordId,
        /// Its model.
        model: String,
        /// Its key.
        key: IdentityKey,
    },
    /// Registries and arena disagree on the number of live records.
    RegistrySize {
        /// Registry entries.
        registered: usize,
        /// Live arena slots.
        live: usize,
    },
    /// A relation holds the same record twice.
    DuplicateMember {
        /// Holder.
        record: RecordId,
        /// Relation, as `Model.field`.
        field: String,
        /// Repeated target.
        target: RecordId,
    },
    /// A relation holds a deleted record.
    DanglingLink {
        /// Holder.
        record: RecordId,
        /// Relation, as `Model.field`.
        field: String,
        /// Dead target.
        target: RecordId,
    },
    /// A relation's inverse does not hold the holder.
    AsymmetricRelation {
        /// Holder.
        record: RecordId,
        /// Relation, as `Model.field`.
        field: String,
        /// Target missing the reciprocal link.
        target: RecordId,
    },
    /// A target does not list the holder among its referrers.
    MissingReferrer {
        /// Holder.
        record: RecordId,
        /// Relation, as `Model.field`.
        field: String,
        /// Target.
        target: RecordId,
    },
    /// A referrer entry names a slot that no longer holds the record.
    StaleReferrer {
        /// The referenced record.
        record: RecordId,
        /// The claimed holder.
        holder: RecordId,
        /// Field index on the holder.
        field: u32,
    },
    /// A relation identity field does not point at the record its key names.
    BrokenIdentity {
        /// The record.
        record: RecordId,
        /// Identity relation, as `Model.field`.
        field: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::UnregisteredRecord { record, model, key } => {
                write!(f, "{model}{key} ({record}) is not registered under its key")
            }
            Violation::RegistrySize { registered, live } => {
                write!(f, "registries hold {registered} keys for {live} live records")
            }
            Violation::DuplicateMember {
                record,
                field,
                target,
            } => write!(f, "{field} of {record} holds {target} twice"),
            Violation::DanglingLink {
                record,
                field,
                target,
            } => write!(f, "{field} of {record} holds deleted {target}"),
            Violation::AsymmetricRelation {
                record,
                field,
                target,
            } => write!(f, "{field} of {record} holds {target} but the inverse does not"),
            Violation::MissingReferrer {
                record,
                field,
                target,
            } => write!(f, "{field} of {record} holds {target} without a back-reference"),
            Violation::StaleReferrer {
                record,
                holder,
                field,
            } => write!(f, "{record} lists {holder} field {field} as referrer but is not held"),
            Violation::BrokenIdentity { record, field } => {
                write!(f, "identity relation {field} of {record} does not match its key")
            }
        }
    }
}
