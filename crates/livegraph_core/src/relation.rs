//! Relation primitives.
//!
//! `relate` and `unrelate` are the only code paths that write relation
//! slots. Each updates the holder's slot, the inverse slot on the target
//! when the relation declares one, and the target's back-references, so the
//! two sides of an inverse pair cannot drift apart.
//!
//! Unlinking a record's identity relation queues the record for deletion;
//! see `Store::reap_detached`.

use crate::error::StoreWarning;
use crate::model::{Cardinality, RelationInfo};
use crate::record::FieldValue;
use crate::store::Store;
use crate::types::{FieldId, RecordId};
use livegraph_value::Value;
use std::collections::HashSet;

impl Store {
    fn relation_info(&self, id: RecordId, field: FieldId) -> Option<RelationInfo> {
        self.field_info(id, field)?.relation().copied()
    }

    /// Returns true if `id.field` currently holds `target`.
    pub(crate) fn holds(&self, id: RecordId, field: FieldId, target: RecordId) -> bool {
        self.data(id)
            .is_some_and(|data| data.value(field).holds(target))
    }

    fn one_target(&self, id: RecordId, field: FieldId) -> Option<RecordId> {
        match self.data(id)?.value(field) {
            FieldValue::One(target) => *target,
            _ => None,
        }
    }

    /// Links `a.field` to `b`, and `b.inverse` back to `a`.
    ///
    /// A `one` slot on either side first drops its previous target. Linking
    /// an existing member is a no-op. Returns true if anything changed.
    pub(crate) fn relate(&mut self, a: RecordId, field: FieldId, b: RecordId) -> bool {
        let Some(info) = self.relation_info(a, field) else {
            return false;
        };
        if !self.contains(b) {
            return false;
        }

        let mut changed = false;
        if !self.holds(a, field, b) {
            if info.cardinality == Cardinality::One {
                if let Some(previous) = self.one_target(a, field) {
                    self.unrelate(a, field, previous);
                }
            }
            self.attach(a, field, b);
            changed = true;
        }

        if let Some(inverse) = info.inverse {
            if !self.holds(b, inverse, a) {
                if let Some(previous) = self.one_target(b, inverse) {
                    self.unrelate(b, inverse, previous);
                }
                self.attach(b, inverse, a);
                changed = true;
            }
        }
        changed
    }

    /// Removes `b` from `a.field` and `a` from `b.inverse`.
    ///
    /// Unlinking something that is not linked is tolerated: it records a
    /// dangling reference warning and returns false.
    pub(crate) fn unrelate(&mut self, a: RecordId, field: FieldId, b: RecordId) -> bool {
        if !self.holds(a, field, b) {
            let name = self
                .data(a)
                .map(|data| {
                    let model = self.schema.model(data.model);
                    format!("{}.{}", model.name(), model.field(field).name())
                })
                .unwrap_or_else(|| format!("{a}.{}", field.as_u32()));
            tracing::debug!(record = %a, field = %name, target = %b, "unrelate found nothing to unlink");
            self.stats.record_dangling_unlink();
            self.warnings.push(StoreWarning::DanglingReference {
                record: a,
                field: name,
                target: b,
            });
            return false;
        }

        self.detach(a, field, b);
        if let Some(inverse) = self.relation_info(a, field).and_then(|info| info.inverse) {
            if self.holds(b, inverse, a) {
                self.detach(b, inverse, a);
            }
        }
        true
    }

    fn attach(&mut self, a: RecordId, field: FieldId, b: RecordId) {
        let Some(data) = self.data_mut(a) else {
            return;
        };
        match data.value_mut(field) {
            FieldValue::One(slot) => *slot = Some(b),
            FieldValue::Many(members) => members.push(b),
            FieldValue::Attr(_) => return,
        }
        if let Some(target) = self.data_mut(b) {
            target.referrers.insert((a, field));
        }
        self.stats.record_link();
        tracing::trace!(record = %a, field = field.as_u32(), target = %b, "relate");
        self.touch(a, field);
    }

    fn detach(&mut self, a: RecordId, field: FieldId, b: RecordId) {
        let Some(data) = self.data_mut(a) else {
            return;
        };
        let model = data.model;
        match data.value_mut(field) {
            FieldValue::One(slot) => *slot = None,
            FieldValue::Many(members) => members.retain(|&m| m != b),
            FieldValue::Attr(_) => return,
        }
        if self.schema.field(model, field).is_identity() {
            self.detached.push(a);
        }
        if let Some(target) = self.data_mut(b) {
            target.referrers.remove(&(a, field));
        }
        self.stats.record_unlink();
        tracing::trace!(record = %a, field = field.as_u32(), target = %b, "unrelate");
        self.touch(a, field);
    }

    /// Points a `one` relation at `target`, or clears it.
    pub(crate) fn set_one(&mut self, id: RecordId, field: FieldId, target: Option<RecordId>) {
        match target {
            Some(target) => {
                self.relate(id, field, target);
            }
            None => {
                if let Some(previous) = self.one_target(id, field) {
                    self.unrelate(id, field, previous);
                }
            }
        }
    }

    /// Replaces the members of a `many` relation, keeping `targets` order.
    ///
    /// Members not in `targets` are unrelated, new ones related; records
    /// that are not live and repeated entries are skipped.
    pub(crate) fn replace_many(&mut self, id: RecordId, field: FieldId, targets: Vec<RecordId>) {
        let mut seen = HashSet::with_capacity(targets.len());
        let targets: Vec<RecordId> = targets
            .into_iter()
            .filter(|&t| self.contains(t) && seen.insert(t))
            .collect();

        let current: Vec<RecordId> = self
            .data(id)
            .map(|data| data.value(field).targets().to_vec())
            .unwrap_or_default();
        for &member in &current {
            if !seen.contains(&member) {
                self.unrelate(id, field, member);
            }
        }
        for &target in &targets {
            self.relate(id, field, target);
        }

        let held: Vec<RecordId> = targets
            .into_iter()
            .filter(|&t| self.holds(id, field, t))
            .collect();
        let reordered = match self.data_mut(id).map(|data| data.value_mut(field)) {
            Some(FieldValue::Many(members)) if *members != held => {
                *members = held;
                true
            }
            _ => false,
        };
        if reordered {
            self.touch(id, field);
        }
    }

    /// Assigns an attribute. Returns true if the value changed.
    pub(crate) fn set_attr(&mut self, id: RecordId, field: FieldId, value: Value) -> bool {
        let changed = match self.data_mut(id).map(|data| data.value_mut(field)) {
            Some(FieldValue::Attr(current)) if *current != value => {
                *current = value;
                true
            }
            _ => false,
        };
        if changed {
            self.touch(id, field);
        }
        changed
    }
}
