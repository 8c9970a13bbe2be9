//! Computed fields and the flush loop.
//!
//! Computed fields declare their dependencies implicitly: every field a
//! compute function reads through its [`ComputeCtx`] becomes an edge of the
//! dependency graph. A committed change to `(record, field)` marks the
//! direct dependents stale; a recomputation that changes a value marks the
//! next layer stale, and so on. Nothing is recomputed until the store
//! flushes.
//!
//! Invalidation also marks everything further downstream as needing a
//! check. During a flush a checked node first settles its inputs and is only
//! recomputed if one of them actually changed, so each node is recomputed at
//! most once per flush. If an evaluation reads a dirty computed node, that
//! node is settled first and the evaluation is retried; results never observe
//! stale inputs. A node reached again while it is being settled is a cycle:
//! the nodes on the cycle keep their last value and become fresh, and the
//! cycle is reported.

use crate::config::CyclePolicy;
use crate::error::{CoreError, CoreResult, StoreWarning};
use crate::identity::IdentityKey;
use crate::model::{Cardinality, Compute, FieldInfo};
use crate::record::{FieldValue, RecordData};
use crate::store::Store;
use crate::types::{FieldId, RecordId, SequenceNumber};
use livegraph_value::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

/// A field of a specific record: the unit of invalidation.
pub(crate) type Node = (RecordId, FieldId);

static NULL: Value = Value::Null;

/// Read access handed to compute functions.
///
/// Every read is recorded as a dependency of the field being computed.
///
/// ```rust,ignore
/// Field::attr("message_count").compute(|ctx, thread| {
///     Value::from(ctx.count(thread, "messages") as i64)
/// });
/// Field::attr("author_name").compute(|ctx, message| {
///     ctx.one(message, "author")
///         .map(|author| ctx.attr(author, "name").clone())
///         .unwrap_or_default()
/// });
/// ```
pub struct ComputeCtx<'a> {
    store: &'a Store,
    node: Node,
    reads: RefCell<Vec<Node>>,
    blocked: Cell<Option<Node>>,
}

impl<'a> ComputeCtx<'a> {
    fn new(store: &'a Store, node: Node) -> Self {
        Self {
            store,
            node,
            reads: RefCell::new(Vec::new()),
            blocked: Cell::new(None),
        }
    }

    fn observe(&self, id: RecordId, name: &str) -> Option<&'a FieldValue> {
        let data: &'a RecordData = self.store.data(id)?;
        let Some(field) = self.store.schema.model(data.model).field_id(name) else {
            tracing::debug!(record = %id, field = name, "compute read of undeclared field");
            return None;
        };
        let node = (id, field);
        self.reads.borrow_mut().push(node);
        if self.blocked.get().is_none() && self.store.engine.is_dirty(node) {
            self.blocked.set(Some(node));
        }
        Some(data.value(field))
    }

    /// Returns the record whose field is being computed.
    pub fn record(&self) -> RecordId {
        self.node.0
    }

    /// Returns true if `id` is a live record. Not tracked.
    pub fn is_alive(&self, id: RecordId) -> bool {
        self.store.contains(id)
    }

    /// Returns a record's identity key. Keys never change, so this is not
    /// tracked.
    pub fn key(&self, id: RecordId) -> Option<&'a IdentityKey> {
        self.store.data(id).map(|data| &data.key)
    }

    /// Returns the model name of a record. Not tracked.
    pub fn model_name(&self, id: RecordId) -> Option<&'a str> {
        let data = self.store.data(id)?;
        Some(self.store.schema.model(data.model).name())
    }

    /// Reads a field's value.
    pub fn get(&self, id: RecordId, field: &str) -> Option<&'a FieldValue> {
        self.observe(id, field)
    }

    /// Reads an attribute. Missing records, fields and relations read as `Null`.
    pub fn attr(&self, id: RecordId, field: &str) -> &'a Value {
        self.observe(id, field)
            .and_then(FieldValue::as_attr)
            .unwrap_or(&NULL)
    }

    /// Reads a `one` relation.
    pub fn one(&self, id: RecordId, field: &str) -> Option<RecordId> {
        match self.observe(id, field)? {
            FieldValue::One(target) => *target,
            _ => None,
        }
    }

    /// Reads the members of a relation.
    pub fn many(&self, id: RecordId, field: &str) -> &'a [RecordId] {
        self.observe(id, field)
            .map(FieldValue::targets)
            .unwrap_or(&[])
    }

    /// Counts the members of a relation.
    pub fn count(&self, id: RecordId, field: &str) -> usize {
        self.many(id, field).len()
    }
}

enum Output {
    Value(Value),
    Records(Vec<RecordId>),
    Nothing,
}

struct Evaluation {
    output: Output,
    reads: Vec<Node>,
    blocked: Option<Node>,
}

enum Settle {
    Done,
    Cycle(Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dirty {
    /// An upstream node is dirty; recompute only if a direct input changes.
    Check,
    /// A direct input changed.
    Stale,
}

/// Dependency graph, dirty set and pending update hooks.
///
/// A node whose direct input changed is `Stale`; everything downstream of
/// it is `Check`. Dependents of a dirty node are always dirty themselves, so
/// a fresh node never reads a value that is about to change.
#[derive(Debug, Default)]
pub(crate) struct ComputeEngine {
    queue: VecDeque<Node>,
    dirty: HashMap<Node, Dirty>,
    deps: HashMap<Node, Vec<Node>>,
    dependents: HashMap<Node, HashSet<Node>>,
    /// Fields of each record that appear in the graph, for cleanup on delete.
    nodes_by_record: HashMap<RecordId, HashSet<FieldId>>,
    hooks: Vec<Node>,
    hook_set: HashSet<Node>,
}

impl ComputeEngine {
    pub(crate) fn mark_stale(&mut self, node: Node) {
        match self.dirty.insert(node, Dirty::Stale) {
            None => {
                self.queue.push_back(node);
                self.mark_checks(node);
            }
            Some(Dirty::Check | Dirty::Stale) => {}
        }
    }

    fn mark_checks(&mut self, from: Node) {
        let mut pending = vec![from];
        while let Some(node) = pending.pop() {
            let Some(dependents) = self.dependents.get(&node) else {
                continue;
            };
            for &dependent in dependents {
                if !self.dirty.contains_key(&dependent) {
                    self.dirty.insert(dependent, Dirty::Check);
                    self.queue.push_back(dependent);
                    pending.push(dependent);
                }
            }
        }
    }

    fn state(&self, node: Node) -> Option<Dirty> {
        self.dirty.get(&node).copied()
    }

    pub(crate) fn is_dirty(&self, node: Node) -> bool {
        self.dirty.contains_key(&node)
    }

    fn clear(&mut self, node: Node) {
        self.dirty.remove(&node);
    }

    fn next_dirty(&mut self) -> Option<Node> {
        while let Some(&node) = self.queue.front() {
            if self.dirty.contains_key(&node) {
                return Some(node);
            }
            self.queue.pop_front();
        }
        None
    }

    /// Marks the direct dependents of `source` stale.
    pub(crate) fn invalidate(&mut self, source: Node) {
        let Some(dependents) = self.dependents.get(&source) else {
            return;
        };
        let dependents: Vec<Node> = dependents.iter().copied().collect();
        for node in dependents {
            self.mark_stale(node);
        }
    }

    fn deps_of(&self, node: Node) -> Vec<Node> {
        self.deps.get(&node).cloned().unwrap_or_default()
    }

    fn set_deps(&mut self, node: Node, reads: Vec<Node>) {
        self.drop_deps(node);
        let mut seen = HashSet::with_capacity(reads.len());
        let reads: Vec<Node> = reads.into_iter().filter(|n| seen.insert(*n)).collect();
        for &dep in &reads {
            self.dependents.entry(dep).or_default().insert(node);
            self.nodes_by_record.entry(dep.0).or_default().insert(dep.1);
        }
        self.nodes_by_record.entry(node.0).or_default().insert(node.1);
        self.deps.insert(node, reads);
    }

    fn drop_deps(&mut self, node: Node) {
        let Some(old) = self.deps.remove(&node) else {
            return;
        };
        for dep in old {
            if let Some(set) = self.dependents.get_mut(&dep) {
                set.remove(&node);
                if set.is_empty() {
                    self.dependents.remove(&dep);
                }
            }
        }
    }

    /// Drops a deleted record from the graph. Computed fields of other
    /// records that read it become stale.
    pub(crate) fn forget_record(&mut self, id: RecordId) {
        let Some(fields) = self.nodes_by_record.remove(&id) else {
            return;
        };
        for field in fields {
            let node = (id, field);
            self.drop_deps(node);
            if let Some(dependents) = self.dependents.remove(&node) {
                for dependent in dependents {
                    if dependent.0 != id {
                        self.mark_stale(dependent);
                    }
                }
            }
        }
    }

    pub(crate) fn queue_hook(&mut self, node: Node) {
        if self.hook_set.insert(node) {
            self.hooks.push(node);
        }
    }

    fn take_hooks(&mut self) -> Vec<Node> {
        self.hook_set.clear();
        std::mem::take(&mut self.hooks)
    }

    /// Number of dirty nodes.
    pub(crate) fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Number of dependency edges.
    pub(crate) fn edge_count(&self) -> usize {
        self.deps.values().map(Vec::len).sum()
    }
}

/// Outcome of a flush.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Sequence number of the emitted events, if any were emitted.
    pub sequence: Option<SequenceNumber>,
    /// Computed fields recomputed.
    pub recomputed: usize,
    /// Update hooks run.
    pub hooks_run: usize,
    /// Change events emitted.
    pub events: usize,
    /// Non-fatal conditions observed since the previous flush.
    pub warnings: Vec<StoreWarning>,
    /// Hook failures and, under [`CyclePolicy::Degrade`], compute cycles.
    pub errors: Vec<CoreError>,
}

impl FlushReport {
    /// Returns true if nothing went wrong.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// Iterates over the reported compute cycles.
    pub fn cycles(&self) -> impl Iterator<Item = &[String]> {
        self.errors.iter().filter_map(|err| match err {
            CoreError::ComputeCycle { path } => Some(path.as_slice()),
            _ => None,
        })
    }
}

impl Store {
    /// Recomputes stale fields, runs update hooks until no work remains and
    /// emits the change events of everything since the previous flush.
    ///
    /// Calling `flush` from inside an update hook is a no-op; the running
    /// flush picks the new work up.
    ///
    /// # Errors
    ///
    /// `FlushLimitExceeded` if hooks keep producing work for more than
    /// `max_flush_rounds` rounds; `ComputeCycle` under
    /// [`CyclePolicy::Fail`]. In both cases the store is left settled and
    /// events are still emitted.
    pub fn flush(&mut self) -> CoreResult<FlushReport> {
        if self.flushing {
            return Ok(FlushReport::default());
        }
        self.flushing = true;
        let mut report = FlushReport::default();
        let outcome = self.run_flush(&mut report);
        self.flushing = false;

        report.warnings.append(&mut self.warnings);
        let next = self.sequence.next();
        let events = self.pending.drain(next, &self.schema);
        if !events.is_empty() {
            self.sequence = next;
            report.sequence = Some(next);
            report.events = events.len();
            self.feed.emit_batch(events);
        }
        self.stats.record_flush();
        tracing::debug!(
            sequence = %self.sequence,
            recomputed = report.recomputed,
            hooks = report.hooks_run,
            events = report.events,
            errors = report.errors.len(),
            "flushed"
        );

        outcome?;
        if self.config.cycle_policy == CyclePolicy::Fail {
            if let Some(pos) = report
                .errors
                .iter()
                .position(|err| matches!(err, CoreError::ComputeCycle { .. }))
            {
                return Err(report.errors.remove(pos));
            }
        }
        Ok(report)
    }

    fn run_flush(&mut self, report: &mut FlushReport) -> CoreResult<()> {
        report.errors.append(&mut self.deferred_errors);
        let limit = self.config.max_flush_rounds;
        let mut rounds = 0;
        loop {
            while let Some(node) = self.engine.next_dirty() {
                let mut stack = Vec::new();
                self.settle(node, &mut stack, report);
            }

            let hooks = self.engine.take_hooks();
            if hooks.is_empty() {
                return Ok(());
            }
            rounds += 1;
            if rounds > limit {
                self.stats.record_error();
                tracing::warn!(rounds = limit, "update hooks did not settle");
                return Err(CoreError::FlushLimitExceeded { rounds: limit });
            }

            for (id, field) in hooks {
                let Some(hook) = self.field_info(id, field).and_then(|f| f.on_update().cloned()) else {
                    continue;
                };
                self.stats.record_hook_run();
                report.hooks_run += 1;
                if let Err(err) = hook(self, id) {
                    let name = self.describe_node(id, field);
                    tracing::warn!(hook = %name, error = %err, "update hook failed");
                    self.stats.record_error();
                    report.errors.push(CoreError::hook(name, err));
                }
            }
            report.errors.append(&mut self.deferred_errors);
        }
    }

    fn settle(&mut self, node: Node, stack: &mut Vec<Node>, report: &mut FlushReport) -> Settle {
        if let Some(pos) = stack.iter().position(|&n| n == node) {
            return Settle::Cycle(stack[pos..].to_vec());
        }
        let Some(state) = self.engine.state(node) else {
            return Settle::Done;
        };
        if !self.contains(node.0) {
            self.engine.clear(node);
            return Settle::Done;
        }

        stack.push(node);
        let outcome = self.settle_dirty(node, state, stack, report);
        stack.pop();
        outcome
    }

    fn settle_dirty(
        &mut self,
        node: Node,
        state: Dirty,
        stack: &mut Vec<Node>,
        report: &mut FlushReport,
    ) -> Settle {
        if state == Dirty::Check {
            for dep in self.engine.deps_of(node) {
                if let Settle::Cycle(path) = self.settle(dep, stack, report) {
                    return self.break_cycle(node, path, report);
                }
                if self.engine.state(node) == Some(Dirty::Stale) {
                    break;
                }
            }
            if self.engine.state(node) != Some(Dirty::Stale) {
                // Every input settled without changing.
                self.engine.clear(node);
                return Settle::Done;
            }
        }

        loop {
            let evaluation = self.evaluate(node);
            let Some(dep) = evaluation.blocked else {
                self.commit(node, evaluation.output, evaluation.reads, report);
                return Settle::Done;
            };
            if let Settle::Cycle(path) = self.settle(dep, stack, report) {
                self.engine.set_deps(node, evaluation.reads);
                return self.break_cycle(node, path, report);
            }
        }
    }

    /// Marks a node on a cycle fresh with its last value. The node that
    /// closes the cycle reports it; the others pass it up.
    fn break_cycle(&mut self, node: Node, path: Vec<Node>, report: &mut FlushReport) -> Settle {
        self.engine.clear(node);
        if path.first() == Some(&node) {
            self.report_cycle(&path, report);
            Settle::Done
        } else {
            Settle::Cycle(path)
        }
    }

    fn evaluate(&self, node: Node) -> Evaluation {
        let ctx = ComputeCtx::new(self, node);
        let output = match self.field_info(node.0, node.1).and_then(FieldInfo::compute) {
            Some(Compute::Attr(f)) => Output::Value(f(&ctx, node.0)),
            Some(Compute::Records(f)) => Output::Records(f(&ctx, node.0)),
            None => Output::Nothing,
        };
        Evaluation {
            output,
            reads: ctx.reads.into_inner(),
            blocked: ctx.blocked.get(),
        }
    }

    fn commit(&mut self, node: Node, output: Output, reads: Vec<Node>, report: &mut FlushReport) {
        self.engine.set_deps(node, reads);
        self.engine.clear(node);
        let (id, field) = node;
        match output {
            Output::Nothing => return,
            Output::Value(value) => {
                self.set_attr(id, field, value);
            }
            Output::Records(records) => {
                let Some(info) = self.field_info(id, field).and_then(|f| f.relation().copied()) else {
                    return;
                };
                let records: Vec<RecordId> = records
                    .into_iter()
                    .filter(|&target| match self.data(target) {
                        Some(data) if data.model == info.target => true,
                        Some(_) => {
                            tracing::warn!(
                                field = %self.describe_node(id, field),
                                %target,
                                "computed relation returned a record of the wrong model"
                            );
                            false
                        }
                        None => false,
                    })
                    .collect();
                match info.cardinality {
                    Cardinality::One => self.set_one(id, field, records.first().copied()),
                    Cardinality::Many => self.replace_many(id, field, records),
                }
            }
        }
        self.stats.record_recompute();
        report.recomputed += 1;
    }

    fn report_cycle(&mut self, path: &[Node], report: &mut FlushReport) {
        let names: Vec<String> = path
            .iter()
            .chain(path.first())
            .map(|&(id, field)| self.describe_node(id, field))
            .collect();
        let err = CoreError::ComputeCycle { path: names };
        self.stats.record_cycle();
        match self.config.cycle_policy {
            CyclePolicy::Degrade => tracing::error!(error = %err, "keeping last computed values"),
            CyclePolicy::Fail => tracing::debug!(error = %err, "compute cycle"),
        }
        report.errors.push(err);
    }

    /// Returns the number of computed fields waiting for a flush.
    pub fn stale_count(&self) -> usize {
        self.engine.dirty_len()
    }

    /// Returns the number of edges in the dependency graph.
    pub fn dependency_count(&self) -> usize {
        self.engine.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::Changes;
    use crate::config::StoreConfig;
    use crate::model::{Field, ModelDef, Schema};

    fn counting_schema() -> Schema {
        Schema::builder()
            .model(
                ModelDef::new("Thread")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::many("messages", "Message").inverse("thread"))
                    .field(
                        Field::attr("total")
                            .compute(|ctx, id| Value::from(ctx.count(id, "messages") as i64)),
                    )
                    .field(Field::attr("label").compute(|ctx, id| {
                        let total = ctx.attr(id, "total").as_integer().unwrap_or(0);
                        Value::from(format!("{total} messages"))
                    })),
            )
            .model(
                ModelDef::new("Message")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::one("thread", "Thread")),
            )
            .build()
            .unwrap()
    }

    fn thread_with(ids: &[i64]) -> Value {
        Value::object([
            ("id", Value::from(1)),
            (
                "messages",
                Value::Array(ids.iter().map(|&i| Value::from(i)).collect()),
            ),
        ])
    }

    #[test]
    fn engine_marks_direct_dependents_stale_and_the_rest_checked() {
        let a = (RecordId::new(0, 0), FieldId(0));
        let b = (RecordId::new(1, 0), FieldId(1));
        let c = (RecordId::new(1, 0), FieldId(2));

        let mut engine = ComputeEngine::default();
        engine.set_deps(b, vec![a, a]);
        engine.set_deps(c, vec![b]);
        assert_eq!(engine.edge_count(), 2);

        engine.invalidate(a);
        assert_eq!(engine.state(b), Some(Dirty::Stale));
        assert_eq!(engine.state(c), Some(Dirty::Check));

        engine.invalidate(b);
        assert_eq!(engine.state(c), Some(Dirty::Stale));

        engine.set_deps(b, vec![]);
        engine.clear(b);
        engine.clear(c);
        engine.invalidate(a);
        assert!(!engine.is_dirty(b));
        assert!(!engine.is_dirty(c));
    }

    #[test]
    fn forget_record_stales_foreign_dependents() {
        let a = (RecordId::new(0, 0), FieldId(0));
        let b = (RecordId::new(1, 0), FieldId(1));

        let mut engine = ComputeEngine::default();
        engine.set_deps(b, vec![a]);
        engine.forget_record(a.0);
        assert_eq!(engine.state(b), Some(Dirty::Stale));
        assert!(!engine.dependents.contains_key(&a));
    }

    #[test]
    fn dirty_queue_skips_settled_nodes() {
        let a = (RecordId::new(0, 0), FieldId(0));
        let b = (RecordId::new(0, 0), FieldId(1));
        let mut engine = ComputeEngine::default();
        engine.mark_stale(a);
        engine.mark_stale(b);
        engine.clear(a);
        assert_eq!(engine.next_dirty(), Some(b));
        assert_eq!(engine.dirty_len(), 1);
    }

    #[test]
    fn unchanged_intermediate_stops_propagation() {
        let schema = Schema::builder()
            .model(
                ModelDef::new("Thread")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::many("messages", "Message").inverse("thread"))
                    .field(
                        Field::attr("total")
                            .compute(|ctx, id| Value::from(ctx.count(id, "messages") as i64)),
                    )
                    .field(Field::attr("busy").compute(|ctx, id| {
                        Value::from(ctx.attr(id, "total").as_integer().unwrap_or(0) > 0)
                    }))
                    .field(Field::attr("badge").compute(|ctx, id| {
                        let busy = ctx.attr(id, "busy").as_bool().unwrap_or(false);
                        Value::from(if busy { "busy" } else { "idle" })
                    })),
            )
            .model(
                ModelDef::new("Message")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::one("thread", "Thread")),
            )
            .build()
            .unwrap();
        let mut store = Store::new(schema);
        let thread = store.insert("Thread", thread_with(&[1])).unwrap();
        assert_eq!(
            store.record(thread).unwrap().attr("badge"),
            Some(&Value::from("busy"))
        );

        let before = store.stats().recomputes();
        store
            .insert("Message", Value::object([("id", 2.into()), ("thread", 1.into())]))
            .unwrap();
        // total changes, busy is recomputed to the same value, badge is not touched.
        assert_eq!(store.stats().recomputes() - before, 2);
        assert_eq!(store.record(thread).unwrap().attr("total"), Some(&Value::from(2)));
    }

    #[test]
    fn cycle_through_one_changed_member_terminates() {
        let config = StoreConfig::new().cycle_policy(CyclePolicy::Degrade);
        let mut store = Store::with_config(cyclic_schema(), config);
        let node = store
            .insert("Node", Value::object([("id", 1.into()), ("seed", 4.into())]))
            .unwrap();

        store.update(node, Changes::new().set("seed", 5)).unwrap();
        assert_eq!(store.last_flush().unwrap().cycles().count(), 1);
        assert_eq!(store.stale_count(), 0);
        assert_eq!(
            store.record(node).unwrap().attr("c"),
            Some(&Value::from(10))
        );
    }

    #[test]
    fn chained_fields_recompute_in_dependency_order() {
        let mut store = Store::new(counting_schema());
        let thread = store.insert("Thread", thread_with(&[1, 2, 3])).unwrap();

        let record = store.record(thread).unwrap();
        assert_eq!(record.attr("total"), Some(&Value::from(3)));
        assert_eq!(record.attr("label"), Some(&Value::from("3 messages")));
        assert_eq!(store.stale_count(), 0);
    }

    #[test]
    fn reads_inside_batch_see_last_fresh_value() {
        let mut store = Store::new(counting_schema());
        let thread = store.insert("Thread", thread_with(&[1])).unwrap();

        store
            .batch(|store| {
                store.insert("Message", Value::object([("id", 2.into()), ("thread", 1.into())]))?;
                let total = store.record(thread).and_then(|r| r.attr("total").cloned());
                assert_eq!(total, Some(Value::from(1)));
                assert!(store.stale_count() > 0);
                Ok(())
            })
            .unwrap();

        let total = store.record(thread).and_then(|r| r.attr("total").cloned());
        assert_eq!(total, Some(Value::from(2)));
    }

    #[test]
    fn unchanged_inputs_do_not_recompute() {
        let mut store = Store::new(counting_schema());
        store.insert("Thread", thread_with(&[1, 2])).unwrap();
        let before = store.stats().recomputes();

        store.insert("Thread", thread_with(&[1, 2])).unwrap();
        assert_eq!(store.stats().recomputes(), before);
    }

    fn cyclic_schema() -> Schema {
        Schema::builder()
            .model(
                ModelDef::new("Node")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::attr("seed"))
                    .field(Field::attr("a").compute(|ctx, id| {
                        let b = ctx.attr(id, "b").as_integer().unwrap_or(0);
                        Value::from(b + 1)
                    }))
                    .field(Field::attr("b").compute(|ctx, id| {
                        let a = ctx.attr(id, "a").as_integer().unwrap_or(0);
                        let seed = ctx.attr(id, "seed").as_integer().unwrap_or(0);
                        Value::from(a + seed)
                    }))
                    .field(Field::attr("c").compute(|ctx, id| {
                        Value::from(ctx.attr(id, "seed").as_integer().unwrap_or(0) * 2)
                    })),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn cycle_degrades_and_keeps_values() {
        let config = StoreConfig::new().cycle_policy(CyclePolicy::Degrade);
        let mut store = Store::with_config(cyclic_schema(), config);
        let node = store
            .insert("Node", Value::object([("id", 1.into()), ("seed", 4.into())]))
            .unwrap();

        let report = store.last_flush().unwrap();
        let cycles: Vec<_> = report.cycles().collect();
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].iter().any(|n| n.ends_with(".a")));
        assert!(cycles[0].iter().any(|n| n.ends_with(".b")));

        let record = store.record(node).unwrap();
        assert_eq!(record.attr("c"), Some(&Value::from(8)));
        assert_eq!(store.stale_count(), 0);
        assert_eq!(store.stats().cycles(), 1);
    }

    #[test]
    fn cycle_fails_under_fail_policy() {
        let config = StoreConfig::new().cycle_policy(CyclePolicy::Fail);
        let mut store = Store::with_config(cyclic_schema(), config);
        let err = store
            .insert("Node", Value::object([("id", 1.into()), ("seed", 4.into())]))
            .unwrap_err();
        assert!(matches!(err, CoreError::ComputeCycle { .. }));

        // The record exists and the store has settled.
        assert_eq!(store.len("Node").unwrap(), 1);
        assert_eq!(store.stale_count(), 0);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let schema = Schema::builder()
            .model(
                ModelDef::new("Node")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::attr("loop").compute(|ctx, id| ctx.attr(id, "loop").clone())),
            )
            .build()
            .unwrap();
        let config = StoreConfig::new().cycle_policy(CyclePolicy::Degrade);
        let mut store = Store::with_config(schema, config);
        store
            .insert("Node", Value::object([("id", 1.into())]))
            .unwrap();
        assert_eq!(store.last_flush().unwrap().cycles().count(), 1);
    }

    #[test]
    fn hooks_fire_on_change_and_may_insert() {
        let schema = Schema::builder()
            .model(
                ModelDef::new("Call")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::attr("state").on_update(|store, call| {
                        let state = store
                            .record(call)
                            .and_then(|r| r.attr("state").cloned())
                            .unwrap_or_default();
                        let id = store.record(call).map(|r| r.key().clone());
                        if state == Value::from("ended") {
                            if let Some(key) = id {
                                store.insert(
                                    "Notice",
                                    Value::object([
                                        ("id", key.to_value()),
                                        ("text", Value::from("call ended")),
                                    ]),
                                )?;
                            }
                        }
                        Ok(())
                    })),
            )
            .model(
                ModelDef::new("Notice")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::attr("text")),
            )
            .build()
            .unwrap();
        let mut store = Store::new(schema);

        let call = store
            .insert("Call", Value::object([("id", 1.into()), ("state", "ringing".into())]))
            .unwrap();
        assert_eq!(store.len("Notice").unwrap(), 0);

        store.update(call, Changes::new().set("state", "ended")).unwrap();
        assert_eq!(store.len("Notice").unwrap(), 1);
        assert_eq!(store.last_flush().unwrap().hooks_run, 1);

        store.update(call, Changes::new().set("state", "ended")).unwrap();
        assert_eq!(store.stats().hook_runs(), 2);
    }

    #[test]
    fn hook_errors_are_reported() {
        let schema = Schema::builder()
            .model(
                ModelDef::new("Call")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(
                        Field::attr("state")
                            .on_update(|store, _| store.insert("Ghost", Value::Null).map(|_| ())),
                    ),
            )
            .build()
            .unwrap();
        let mut store = Store::new(schema);
        store
            .insert("Call", Value::object([("id", 1.into()), ("state", "x".into())]))
            .unwrap();

        let report = store.last_flush().unwrap();
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].to_string().contains("Call(1).state"));
    }

    #[test]
    fn runaway_hooks_hit_round_limit() {
        let schema = Schema::builder()
            .model(
                ModelDef::new("Counter")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::attr("n").default(0).on_update(|store, id| {
                        let n = store
                            .record(id)
                            .and_then(|r| r.attr("n").and_then(Value::as_integer))
                            .unwrap_or(0);
                        store.update(id, Changes::new().set("n", n + 1))
                    })),
            )
            .build()
            .unwrap();
        let mut store = Store::with_config(schema, StoreConfig::new().max_flush_rounds(5));
        let err = store
            .insert("Counter", Value::object([("id", 1.into()), ("n", 1.into())]))
            .unwrap_err();
        assert!(matches!(err, CoreError::FlushLimitExceeded { rounds: 5 }));
    }

    #[test]
    fn computed_relation_maintains_inverse() {
        let schema = Schema::builder()
            .model(
                ModelDef::new("Thread")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::many("messages", "Message").inverse("thread"))
                    .field(
                        Field::many("starred", "Message")
                            .inverse("starred_in")
                            .compute_records(|ctx, id| {
                                ctx.many(id, "messages")
                                    .iter()
                                    .copied()
                                    .filter(|&m| ctx.attr(m, "starred") == &Value::from(true))
                                    .collect()
                            }),
                    ),
            )
            .model(
                ModelDef::new("Message")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::attr("starred").default(false))
                    .field(Field::one("thread", "Thread"))
                    .field(Field::one("starred_in", "Thread")),
            )
            .build()
            .unwrap();
        let mut store = Store::new(schema);
        let thread = store.insert("Thread", thread_with(&[1, 2])).unwrap();
        let first = store.get("Message", &[Value::from(1)]).unwrap().id();

        assert!(store.record(thread).unwrap().many("starred").is_empty());

        store.update(first, Changes::new().set("starred", true)).unwrap();
        assert_eq!(store.record(thread).unwrap().many("starred"), &[first]);
        assert_eq!(store.record(first).unwrap().one("starred_in"), Some(thread));

        let err = store
            .update(first, Changes::new().set("starred_in", Value::Null))
            .unwrap_err();
        assert!(matches!(err, CoreError::ReadonlyField { .. }));
        assert!(store.check_invariants().is_empty());
    }

    #[test]
    fn deleting_a_dependency_restales_readers() {
        let schema = Schema::builder()
            .model(
                ModelDef::new("Message")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::one("author", "Persona"))
                    .field(Field::attr("author_name").compute(|ctx, id| {
                        ctx.one(id, "author")
                            .map(|a| ctx.attr(a, "name").clone())
                            .unwrap_or_default()
                    })),
            )
            .model(
                ModelDef::new("Persona")
                    .identity(["id"])
                    .field(Field::attr("id"))
                    .field(Field::attr("name")),
            )
            .build()
            .unwrap();
        let mut store = Store::new(schema);
        let message = store
            .insert(
                "Message",
                Value::object([
                    ("id", 1.into()),
                    ("author", Value::object([("id", 7.into()), ("name", "Ada".into())])),
                ]),
            )
            .unwrap();
        assert_eq!(
            store.record(message).unwrap().attr("author_name"),
            Some(&Value::from("Ada"))
        );

        let persona = store.get("Persona", &[Value::from(7)]).unwrap().id();
        store
            .update(persona, Changes::new().set("name", "Grace"))
            .unwrap();
        assert_eq!(
            store.record(message).unwrap().attr("author_name"),
            Some(&Value::from("Grace"))
        );

        store.delete(persona).unwrap();
        assert_eq!(
            store.record(message).unwrap().attr("author_name"),
            Some(&Value::Null)
        );
    }
}
