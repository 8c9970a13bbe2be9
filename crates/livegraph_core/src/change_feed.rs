//! Change feed for observing flushed mutations.
//!
//! Every flush that changed something emits one event per touched record,
//! all tagged with the flush's sequence number. Consumers either subscribe
//! to a channel or poll the bounded history with a cursor.
//!
//! # Usage
//!
//! ```rust,ignore
//! let receiver = store.subscribe();
//!
//! store.insert("Thread", json_value)?;
//!
//! while let Ok(event) = receiver.try_recv() {
//!     println!("{:?} {}{}", event.change_type, event.model, event.key);
//! }
//! ```

use crate::identity::IdentityKey;
use crate::model::Schema;
use crate::types::{FieldId, ModelId, RecordId, SequenceNumber};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

/// Type of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Record was created during the flushed batch.
    Insert,
    /// Existing record had fields change.
    Update,
    /// Record was deleted.
    Delete,
}

/// A single change event from the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Sequence number of the flush.
    pub sequence: SequenceNumber,
    /// The record handle (stale for deletes).
    pub record: RecordId,
    /// Model name.
    pub model: String,
    /// Identity key of the record.
    pub key: IdentityKey,
    /// Type of change.
    pub change_type: ChangeType,
    /// Fields whose value changed, in declaration order. Empty for deletes.
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingState {
    Created,
    Updated,
    Deleted,
    // Created and deleted within the same batch: nothing to report.
    Transient,
}

#[derive(Debug)]
struct Pending {
    model: ModelId,
    key: IdentityKey,
    state: PendingState,
    fields: Vec<FieldId>,
}

/// Changes accumulated since the last flush, folded per record.
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    order: Vec<RecordId>,
    entries: HashMap<RecordId, Pending>,
}

impl PendingChanges {
    pub(crate) fn created(&mut self, record: RecordId, model: ModelId, key: &IdentityKey) {
        self.order.push(record);
        self.entries.insert(
            record,
            Pending {
                model,
                key: key.clone(),
                state: PendingState::Created,
                fields: Vec::new(),
            },
        );
    }

    pub(crate) fn updated(
        &mut self,
        record: RecordId,
        model: ModelId,
        key: &IdentityKey,
        field: FieldId,
    ) {
        let entry = self.entries.entry(record).or_insert_with(|| {
            self.order.push(record);
            Pending {
                model,
                key: key.clone(),
                state: PendingState::Updated,
                fields: Vec::new(),
            }
        });
        if !entry.fields.contains(&field) {
            entry.fields.push(field);
        }
    }

    pub(crate) fn deleted(&mut self, record: RecordId, model: ModelId, key: &IdentityKey) {
        match self.entries.get_mut(&record) {
            Some(entry) => {
                entry.state = match entry.state {
                    PendingState::Created | PendingState::Transient => PendingState::Transient,
                    PendingState::Updated | PendingState::Deleted => PendingState::Deleted,
                };
                entry.fields.clear();
            }
            None => {
                self.order.push(record);
                self.entries.insert(
                    record,
                    Pending {
                        model,
                        key: key.clone(),
                        state: PendingState::Deleted,
                        fields: Vec::new(),
                    },
                );
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Turns the accumulated changes into events stamped with `sequence`.
    pub(crate) fn drain(&mut self, sequence: SequenceNumber, schema: &Schema) -> Vec<ChangeEvent> {
        let mut entries = std::mem::take(&mut self.entries);
        let mut events = Vec::with_capacity(self.order.len());
        for record in self.order.drain(..) {
            let Some(mut pending) = entries.remove(&record) else {
                continue;
            };
            let change_type = match pending.state {
                PendingState::Created => ChangeType::Insert,
                PendingState::Updated => ChangeType::Update,
                PendingState::Deleted => ChangeType::Delete,
                PendingState::Transient => continue,
            };
            let model = schema.model(pending.model);
            pending.fields.sort();
            events.push(ChangeEvent {
                sequence,
                record,
                model: model.name().to_string(),
                key: pending.key,
                change_type,
                fields: pending
                    .fields
                    .iter()
                    .map(|&f| model.field(f).name().to_string())
                    .collect(),
            });
        }
        events
    }
}

/// Distributes change events to subscribers and keeps a bounded history.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    history: RwLock<Vec<ChangeEvent>>,
    max_history: usize,
}

impl ChangeFeed {
    /// Creates a change feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
        }
    }

    /// Subscribes to the change feed.
    ///
    /// The receiver gets every event emitted after this call. Dropped
    /// receivers are pruned on the next emit.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits the events of one flush.
    pub fn emit_batch(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        {
            let mut history = self.history.write();
            history.extend(events.iter().cloned());
            if history.len() > self.max_history {
                let to_remove = history.len() - self.max_history;
                history.drain(0..to_remove);
            }
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| events.iter().all(|event| tx.send(event.clone()).is_ok()));
    }

    /// Returns events with sequence greater than `cursor`, up to `limit`.
    pub fn poll(&self, cursor: SequenceNumber, limit: usize) -> Vec<ChangeEvent> {
        let history = self.history.read();
        history
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest sequence number in history.
    pub fn latest_sequence(&self) -> SequenceNumber {
        self.history
            .read()
            .last()
            .map(|e| e.sequence)
            .unwrap_or_default()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::with_max_history(10_000)
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("subscribers", &self.subscriber_count())
            .field("history", &self.history_len())
            .field("max_history", &self.max_history)
            .finish()
    }
}
