//! Property-based test generators using proptest.
//!
//! Identifiers are drawn from small ranges so generated sequences keep
//! hitting the same records: merges, moves and cascades are the
//! interesting cases, not fresh inserts.

use proptest::prelude::*;

/// Persona kinds used by the generators.
pub const PERSONA_KINDS: [&str; 2] = ["partner", "guest"];

/// Strategy for message ids.
pub fn message_id_strategy() -> impl Strategy<Value = i64> {
    0i64..8
}

/// Strategy for thread ids.
pub fn thread_id_strategy() -> impl Strategy<Value = i64> {
    0i64..4
}

/// Strategy for persona keys `(kind, id)`.
pub fn persona_key_strategy() -> impl Strategy<Value = (&'static str, i64)> {
    (prop::sample::select(PERSONA_KINDS.to_vec()), 0i64..3)
}

/// Strategy for short message bodies.
pub fn body_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z ]{0,12}").expect("Invalid regex")
}

/// One mutation of the messaging store.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Insert or merge a message into a thread.
    PostMessage {
        /// Message id
        id: i64,
        /// Thread id
        thread: i64,
        /// Author key, if any
        author: Option<(&'static str, i64)>,
        /// Message body
        body: String,
    },
    /// Insert or merge a persona.
    UpsertPersona {
        /// Persona key
        key: (&'static str, i64),
        /// Display name
        name: String,
    },
    /// Add a persona to a thread.
    Join {
        /// Thread id
        thread: i64,
        /// Persona key
        persona: (&'static str, i64),
    },
    /// React to a message, creating the message if unknown.
    React {
        /// Message id
        message: i64,
        /// Reaction content
        content: &'static str,
    },
    /// Remove every reaction of a message through `Message.reactions`.
    ClearReactions {
        /// Message id
        message: i64,
    },
    /// Link another message's reaction through `Message.reactions`. Only
    /// a no-op relink of a reaction to its own message may succeed.
    AdoptReaction {
        /// Message id
        message: i64,
        /// Id of the message the reaction belongs to
        from: i64,
        /// Reaction content
        content: &'static str,
    },
    /// Replace the members of a thread with a single persona, through
    /// `Thread.members`.
    ReplaceMembers {
        /// Thread id
        thread: i64,
        /// The remaining member
        persona: (&'static str, i64),
    },
    /// Move an existing message to another thread.
    MoveMessage {
        /// Message id
        id: i64,
        /// Destination thread id
        thread: i64,
    },
    /// Delete a message.
    DeleteMessage {
        /// Message id
        id: i64,
    },
    /// Delete a thread.
    DeleteThread {
        /// Thread id
        id: i64,
    },
    /// Delete a persona.
    DeletePersona {
        /// Persona key
        key: (&'static str, i64),
    },
}

/// Strategy for store operations.
pub fn store_operation_strategy() -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        4 => (
            message_id_strategy(),
            thread_id_strategy(),
            prop::option::of(persona_key_strategy()),
            body_strategy(),
        )
            .prop_map(|(id, thread, author, body)| StoreOperation::PostMessage {
                id,
                thread,
                author,
                body,
            }),
        2 => (persona_key_strategy(), body_strategy())
            .prop_map(|(key, name)| StoreOperation::UpsertPersona { key, name }),
        2 => (thread_id_strategy(), persona_key_strategy())
            .prop_map(|(thread, persona)| StoreOperation::Join { thread, persona }),
        2 => (message_id_strategy(), prop::sample::select(vec!["+1", "heart", "eyes"]))
            .prop_map(|(message, content)| StoreOperation::React { message, content }),
        1 => message_id_strategy().prop_map(|message| StoreOperation::ClearReactions { message }),
        1 => (
            message_id_strategy(),
            message_id_strategy(),
            prop::sample::select(vec!["+1", "heart", "eyes"]),
        )
            .prop_map(|(message, from, content)| StoreOperation::AdoptReaction {
                message,
                from,
                content,
            }),
        1 => (thread_id_strategy(), persona_key_strategy())
            .prop_map(|(thread, persona)| StoreOperation::ReplaceMembers { thread, persona }),
        2 => (message_id_strategy(), thread_id_strategy())
            .prop_map(|(id, thread)| StoreOperation::MoveMessage { id, thread }),
        1 => message_id_strategy().prop_map(|id| StoreOperation::DeleteMessage { id }),
        1 => thread_id_strategy().prop_map(|id| StoreOperation::DeleteThread { id }),
        1 => persona_key_strategy().prop_map(|key| StoreOperation::DeletePersona { key }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
