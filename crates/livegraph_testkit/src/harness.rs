//! A reference-model harness.
//!
//! [`ReferenceHarness`] applies [`StoreOperation`]s to a messaging store and
//! to a plain in-memory model of what the store should contain, then checks
//! that the two agree.

use crate::fixtures::{messaging_store, persona_payload, thread_payload, THREAD_MODEL};
use crate::generators::StoreOperation;
use crate::invariants::assert_invariants;
use livegraph_core::{Changes, CoreError, CoreResult, RecordId, Store};
use livegraph_value::Value;
use std::collections::{BTreeMap, BTreeSet};

type PersonaKey = (&'static str, i64);

/// A messaging store plus the expected state of it.
pub struct ReferenceHarness {
    /// The store under test.
    pub store: Store,
    /// Message id to expected thread id.
    messages: BTreeMap<i64, Option<i64>>,
    threads: BTreeSet<i64>,
    personas: BTreeSet<PersonaKey>,
    members: BTreeSet<(i64, PersonaKey)>,
    reactions: BTreeSet<(i64, &'static str)>,
}

impl ReferenceHarness {
    /// Creates a harness over an empty messaging store.
    pub fn new() -> Self {
        Self::with_store(messaging_store())
    }

    /// Creates a harness over an empty store built by the caller.
    pub fn with_store(store: Store) -> Self {
        Self {
            store,
            messages: BTreeMap::new(),
            threads: BTreeSet::new(),
            personas: BTreeSet::new(),
            members: BTreeSet::new(),
            reactions: BTreeSet::new(),
        }
    }

    fn thread(&self, id: i64) -> Option<RecordId> {
        self.store
            .get("Thread", &[THREAD_MODEL.into(), id.into()])
            .map(|r| r.id())
    }

    fn message(&self, id: i64) -> Option<RecordId> {
        self.store.get("Message", &[id.into()]).map(|r| r.id())
    }

    fn reaction(&self, message: i64, content: &str) -> Option<RecordId> {
        self.store
            .get("Reaction", &[Value::Array(vec![message.into()]), content.into()])
            .map(|r| r.id())
    }

    fn persona(&self, (kind, id): PersonaKey) -> Option<RecordId> {
        self.store
            .get("Persona", &[kind.into(), id.into()])
            .map(|r| r.id())
    }

    /// Applies one operation to the store and to the model.
    ///
    /// # Errors
    ///
    /// Whatever the store returns; generated operations are all valid, so
    /// any error is a bug. The one expected refusal, re-pointing a reaction
    /// at another message, is checked here.
    ///
    /// # Panics
    ///
    /// If the store accepts that re-pointing.
    pub fn apply(&mut self, op: &StoreOperation) -> CoreResult<()> {
        match op {
            StoreOperation::PostMessage {
                id,
                thread,
                author,
                body,
            } => {
                let mut entries = vec![
                    ("id", Value::from(*id)),
                    ("body", body.as_str().into()),
                    ("thread", thread_payload(*thread)),
                ];
                if let Some((kind, pid)) = author {
                    entries.push(("author", persona_payload(kind, *pid)));
                    self.personas.insert((*kind, *pid));
                }
                self.store.insert("Message", Value::object(entries))?;
                self.messages.insert(*id, Some(*thread));
                self.threads.insert(*thread);
            }
            StoreOperation::UpsertPersona { key, name } => {
                let payload = Value::object([
                    ("type", key.0.into()),
                    ("id", key.1.into()),
                    ("name", name.as_str().into()),
                ]);
                self.store.insert("Persona", payload)?;
                self.personas.insert(*key);
            }
            StoreOperation::Join { thread, persona } => {
                let payload = Value::object([
                    ("thread", thread_payload(*thread)),
                    ("persona", persona_payload(persona.0, persona.1)),
                ]);
                self.store.insert("Member", payload)?;
                self.threads.insert(*thread);
                self.personas.insert(*persona);
                self.members.insert((*thread, *persona));
            }
            StoreOperation::React { message, content } => {
                let payload = Value::object([
                    ("message", Value::from(*message)),
                    ("content", (*content).into()),
                ]);
                self.store.insert("Reaction", payload)?;
                self.messages.entry(*message).or_insert(None);
                self.reactions.insert((*message, *content));
            }
            StoreOperation::ClearReactions { message } => {
                if let Some(record) = self.message(*message) {
                    self.store.update(record, Changes::new().clear("reactions"))?;
                    self.reactions.retain(|(m, _)| m != message);
                }
            }
            StoreOperation::AdoptReaction {
                message,
                from,
                content,
            } => {
                if let (Some(record), Some(reaction)) =
                    (self.message(*message), self.reaction(*from, content))
                {
                    let result = self
                        .store
                        .update(record, Changes::new().add("reactions", [reaction]));
                    if message == from {
                        result?;
                    } else {
                        assert!(
                            matches!(result, Err(CoreError::IdentityImmutable { .. })),
                            "reaction of message {from} moved to message {message}: {result:?}"
                        );
                    }
                }
            }
            StoreOperation::ReplaceMembers { thread, persona } => {
                if let Some(record) = self.thread(*thread) {
                    let member = Value::object([
                        ("thread", thread_payload(*thread)),
                        ("persona", persona_payload(persona.0, persona.1)),
                    ]);
                    self.store
                        .update(record, Changes::new().set("members", Value::Array(vec![member])))?;
                    self.members.retain(|(t, _)| t != thread);
                    self.members.insert((*thread, *persona));
                    self.personas.insert(*persona);
                }
            }
            StoreOperation::MoveMessage { id, thread } => {
                if let Some(record) = self.message(*id) {
                    self.store
                        .update(record, Changes::new().set("thread", thread_payload(*thread)))?;
                    self.messages.insert(*id, Some(*thread));
                    self.threads.insert(*thread);
                }
            }
            StoreOperation::DeleteMessage { id } => {
                if let Some(record) = self.message(*id) {
                    self.store.delete(record)?;
                    self.messages.remove(id);
                    self.reactions.retain(|(m, _)| m != id);
                }
            }
            StoreOperation::DeleteThread { id } => {
                if let Some(record) = self.thread(*id) {
                    self.store.delete(record)?;
                    self.threads.remove(id);
                    self.members.retain(|(t, _)| t != id);
                    for thread in self.messages.values_mut() {
                        if *thread == Some(*id) {
                            *thread = None;
                        }
                    }
                }
            }
            StoreOperation::DeletePersona { key } => {
                if let Some(record) = self.persona(*key) {
                    self.store.delete(record)?;
                    self.personas.remove(key);
                    self.members.retain(|(_, p)| p != key);
                }
            }
        }
        Ok(())
    }

    /// Asserts that the store matches the model and holds its invariants.
    ///
    /// # Panics
    ///
    /// On the first disagreement.
    pub fn verify(&self) {
        assert_invariants(&self.store);
        let len = |model: &str| self.store.len(model).unwrap_or_default();
        assert_eq!(len("Message"), self.messages.len(), "message count");
        assert_eq!(len("Thread"), self.threads.len(), "thread count");
        assert_eq!(len("Persona"), self.personas.len(), "persona count");
        assert_eq!(len("Member"), self.members.len(), "member count");
        assert_eq!(len("Reaction"), self.reactions.len(), "reaction count");

        for (&id, &expected) in &self.messages {
            let record = self
                .message(id)
                .and_then(|m| self.store.record(m))
                .unwrap_or_else(|| panic!("message {id} missing"));
            let actual = record.one("thread");
            assert_eq!(actual, expected.and_then(|t| self.thread(t)), "thread of message {id}");
        }

        for &id in &self.threads {
            let thread = self
                .thread(id)
                .and_then(|t| self.store.record(t))
                .unwrap_or_else(|| panic!("thread {id} missing"));
            let expected = self.messages.values().filter(|&&t| t == Some(id)).count();
            assert_eq!(thread.many("messages").len(), expected, "messages of thread {id}");
            assert_eq!(
                thread.attr("message_count"),
                Some(&Value::from(expected as i64)),
                "message_count of thread {id}"
            );
            assert_eq!(
                thread.one("last_message"),
                thread.many("messages").last().copied(),
                "last_message of thread {id}"
            );
        }
    }

    /// Applies every operation, then verifies.
    ///
    /// # Panics
    ///
    /// If an operation fails or verification does.
    pub fn run(&mut self, ops: &[StoreOperation]) {
        for op in ops {
            if let Err(err) = self.apply(op) {
                panic!("{op:?} failed: {err}");
            }
        }
        self.verify();
    }
}

impl Default for ReferenceHarness {
    fn default() -> Self {
        Self::new()
    }
}
