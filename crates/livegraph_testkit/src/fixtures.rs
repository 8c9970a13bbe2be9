//! Test fixtures and store helpers.
//!
//! Provides a messaging schema exercising every relation shape the store
//! supports, and payload builders for it.

use livegraph_core::{Field, ModelDef, Schema, Store, StoreConfig};
use livegraph_value::Value;

/// Model name of the `model` component of every thread key.
pub const THREAD_MODEL: &str = "discuss.channel";

/// Builds the messaging schema.
///
/// - `Thread` `(model, id)`: `messages` (inverse `Message.thread`), owned
///   `members`, computed `message_count` and `last_message`.
/// - `Message` `(id)`: `thread`, `author`, owned `reactions`, computed
///   `author_name`.
/// - `Persona` `(type, id)`: a composite attribute identity.
/// - `Member` `(thread, persona)`: an identity made of two relations.
/// - `Reaction` `(message, content)`: relation plus attribute identity.
pub fn messaging_schema() -> Schema {
    let built = Schema::builder()
        .model(
            ModelDef::new("Thread")
                .identity(["model", "id"])
                .field(Field::attr("model"))
                .field(Field::attr("id"))
                .field(Field::attr("name"))
                .field(Field::many("messages", "Message").inverse("thread"))
                .field(Field::many("members", "Member").inverse("thread").owned())
                .field(
                    Field::attr("message_count")
                        .compute(|ctx, id| Value::from(ctx.count(id, "messages") as i64)),
                )
                .field(
                    Field::one("last_message", "Message")
                        .compute_records(|ctx, id| ctx.many(id, "messages").last().copied().into_iter().collect()),
                ),
        )
        .model(
            ModelDef::new("Message")
                .identity(["id"])
                .field(Field::attr("id"))
                .field(Field::attr("body"))
                .field(Field::one("thread", "Thread"))
                .field(Field::one("author", "Persona"))
                .field(Field::many("reactions", "Reaction").inverse("message").owned())
                .field(Field::attr("author_name").compute(|ctx, id| {
                    ctx.one(id, "author")
                        .map(|author| ctx.attr(author, "name").clone())
                        .unwrap_or_default()
                })),
        )
        .model(
            ModelDef::new("Persona")
                .identity(["type", "id"])
                .field(Field::attr("type"))
                .field(Field::attr("id"))
                .field(Field::attr("name"))
                .field(Field::attr("email")),
        )
        .model(
            ModelDef::new("Member")
                .identity(["thread", "persona"])
                .field(Field::one("thread", "Thread"))
                .field(Field::one("persona", "Persona"))
                .field(Field::attr("role").default("member")),
        )
        .model(
            ModelDef::new("Reaction")
                .identity(["message", "content"])
                .field(Field::one("message", "Message"))
                .field(Field::attr("content"))
                .field(Field::many("personas", "Persona")),
        )
        .build();
    built.expect("messaging schema is valid")
}

/// Creates an empty store over [`messaging_schema`].
pub fn messaging_store() -> Store {
    Store::new(messaging_schema())
}

/// Creates a store over [`messaging_schema`] with a custom configuration.
pub fn messaging_store_with(config: StoreConfig) -> Store {
    Store::with_config(messaging_schema(), config)
}

/// Runs a test with a fresh messaging store.
pub fn with_messaging_store<F, R>(f: F) -> R
where
    F: FnOnce(&mut Store) -> R,
{
    let mut store = messaging_store();
    f(&mut store)
}

/// Payload of a thread key.
pub fn thread_payload(id: i64) -> Value {
    Value::object([("model", THREAD_MODEL.into()), ("id", id.into())])
}

/// Payload of a persona key.
pub fn persona_payload(kind: &str, id: i64) -> Value {
    Value::object([("type", kind.into()), ("id", id.into())])
}

/// Payload of a message posted in a thread.
pub fn message_payload(id: i64, thread: i64, body: &str) -> Value {
    Value::object([
        ("id", id.into()),
        ("body", body.into()),
        ("thread", thread_payload(thread)),
    ])
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a store holding `threads` threads of `messages` messages
    /// each, authored round-robin by three personas.
    pub fn populated_store(threads: i64, messages: i64) -> Store {
        let mut store = messaging_store();
        store
            .batch(|store| {
                for t in 0..threads {
                    for m in 0..messages {
                        let id = t * messages + m;
                        let mut payload = message_payload(id, t, &format!("message {id}"));
                        if let Value::Map(entries) = &mut payload {
                            entries.push(("author".into(), persona_payload("partner", id % 3)));
                        }
                        store.insert("Message", payload)?;
                    }
                }
                Ok(())
            })
            .expect("populating the messaging store");
        store
    }
}
