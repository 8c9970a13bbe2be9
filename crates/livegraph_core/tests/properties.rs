//! Integration tests for the store's core guarantees: idempotent insert,
//! relational symmetry, partial merge, cascade delete, computed-field
//! consistency and composite identity.

use livegraph_core::{
    ChangeType, Changes, CoreError, Field, ModelDef, RecordId, Schema, Store,
};
use livegraph_value::Value;

fn messaging_schema() -> Schema {
    Schema::builder()
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
                .field(Field::attr("preview").compute(|ctx, id| {
                    ctx.many(id, "messages")
                        .last()
                        .map(|&m| ctx.attr(m, "body").clone())
                        .unwrap_or_default()
                })),
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
                .field(Field::attr("content")),
        )
        .build()
        .unwrap()
}

fn obj<const N: usize>(pairs: [(&str, Value); N]) -> Value {
    Value::object(pairs)
}

fn thread(id: i64) -> Value {
    obj([("model", "discuss.channel".into()), ("id", id.into())])
}

fn persona(kind: &str, id: i64) -> Value {
    obj([("type", kind.into()), ("id", id.into())])
}

fn message(id: i64, thread_id: i64, body: &str) -> Value {
    obj([
        ("id", id.into()),
        ("body", body.into()),
        ("thread", thread(thread_id)),
    ])
}

fn thread_id(store: &Store, id: i64) -> RecordId {
    store
        .get("Thread", &["discuss.channel".into(), id.into()])
        .map(|r| r.id())
        .unwrap()
}

#[test]
fn idempotent_insert() {
    let mut store = Store::new(messaging_schema());
    let payload = obj([
        ("id", 1.into()),
        ("body", "hi".into()),
        ("thread", thread(7)),
        ("author", persona("partner", 3)),
    ]);

    let first = store.insert("Message", payload.clone()).unwrap();
    let created = store.last_flush().unwrap().events;
    let second = store.insert("Message", payload).unwrap();

    assert_eq!(first, second);
    assert_eq!(created, 3);
    assert_eq!(store.len("Message").unwrap(), 1);
    assert_eq!(store.len("Thread").unwrap(), 1);
    assert_eq!(store.len("Persona").unwrap(), 1);
    assert_eq!(store.last_flush().unwrap().events, 0);
    assert!(store.check_invariants().is_empty());
}

#[test]
fn relational_symmetry() {
    let mut store = Store::new(messaging_schema());
    let m = store.insert("Message", message(1, 10, "a")).unwrap();
    let t10 = thread_id(&store, 10);
    assert_eq!(store.record(t10).unwrap().many("messages"), &[m]);

    // Moving the message from the `one` side leaves the old thread.
    store
        .update(m, Changes::new().set("thread", thread(11)))
        .unwrap();
    let t11 = thread_id(&store, 11);
    assert!(store.record(t10).unwrap().many("messages").is_empty());
    assert_eq!(store.record(t11).unwrap().many("messages"), &[m]);

    // Editing the `many` side updates the `one` side.
    store.update(t11, Changes::new().remove("messages", [m])).unwrap();
    assert_eq!(store.record(m).unwrap().one("thread"), None);
    store.update(t10, Changes::new().add("messages", [m])).unwrap();
    assert_eq!(store.record(m).unwrap().one("thread"), Some(t10));

    assert!(store.check_invariants().is_empty());
}

#[test]
fn partial_merge() {
    let mut store = Store::new(messaging_schema());
    let a = store
        .insert("Persona", obj([("type", "partner".into()), ("id", 5.into()), ("name", "x".into())]))
        .unwrap();
    let b = store
        .insert("Persona", obj([("type", "partner".into()), ("id", 5.into()), ("email", "y".into())]))
        .unwrap();

    assert_eq!(a, b);
    let record = store.record(a).unwrap();
    assert_eq!(record.attr("name"), Some(&Value::from("x")));
    assert_eq!(record.attr("email"), Some(&Value::from("y")));

    // Last write wins per field.
    store
        .insert("Persona", obj([("type", "partner".into()), ("id", 5.into()), ("name", "z".into())]))
        .unwrap();
    assert_eq!(store.record(a).unwrap().attr("name"), Some(&Value::from("z")));
}

#[test]
fn cascade_delete_follows_ownership() {
    let mut store = Store::new(messaging_schema());
    let m = store
        .insert(
            "Message",
            obj([
                ("id", 1.into()),
                ("thread", thread(1)),
                (
                    "reactions",
                    Value::Array(vec![
                        obj([("message", 1.into()), ("content", "+1".into())]),
                        obj([("message", 1.into()), ("content", "heart".into())]),
                    ]),
                ),
            ]),
        )
        .unwrap();
    let reactions = store.record(m).unwrap().many("reactions").to_vec();
    assert_eq!(reactions.len(), 2);

    assert!(store.delete(m).unwrap());

    assert!(reactions.iter().all(|&r| !store.contains(r)));
    assert_eq!(store.len("Reaction").unwrap(), 0);
    let t = thread_id(&store, 1);
    assert!(store.record(t).unwrap().many("messages").is_empty());
    assert!(!store.delete(m).unwrap());
    assert!(store.check_invariants().is_empty());
}

#[test]
fn cascade_delete_follows_relation_identity() {
    let mut store = Store::new(messaging_schema());
    let member = store
        .insert(
            "Member",
            obj([("thread", thread(1)), ("persona", persona("guest", 9))]),
        )
        .unwrap();
    let guest = store.get("Persona", &["guest".into(), 9.into()]).unwrap().id();
    assert_eq!(store.record(member).unwrap().attr("role"), Some(&Value::from("member")));

    store.delete(guest).unwrap();

    assert!(!store.contains(member));
    let t = thread_id(&store, 1);
    assert!(store.contains(t));
    assert!(store.record(t).unwrap().many("members").is_empty());
    assert!(store.check_invariants().is_empty());
}

#[test]
fn owner_delete_removes_owned_members() {
    let mut store = Store::new(messaging_schema());
    let member = store
        .insert(
            "Member",
            obj([("thread", thread(1)), ("persona", persona("partner", 2))]),
        )
        .unwrap();
    let t = thread_id(&store, 1);
    assert_eq!(store.record(t).unwrap().many("members"), &[member]);

    store.delete(t).unwrap();

    assert!(!store.contains(member));
    assert_eq!(store.len("Persona").unwrap(), 1);
}

#[test]
fn identity_owner_cannot_change_through_inverse() {
    let mut store = Store::new(messaging_schema());
    let m1 = store
        .insert(
            "Message",
            obj([
                ("id", 1.into()),
                (
                    "reactions",
                    Value::Array(vec![obj([("message", 1.into()), ("content", "+1".into())])]),
                ),
            ]),
        )
        .unwrap();
    let m2 = store.insert("Message", obj([("id", 2.into())])).unwrap();
    let reaction = store.record(m1).unwrap().many("reactions")[0];

    let err = store
        .update(m2, Changes::new().add("reactions", [reaction]))
        .unwrap_err();
    assert!(matches!(err, CoreError::IdentityImmutable { ref field, .. } if field == "message"));
    let err = store
        .update(m2, Changes::new().replace("reactions", [reaction]))
        .unwrap_err();
    assert!(matches!(err, CoreError::IdentityImmutable { .. }));
    let err = store
        .insert(
            "Message",
            obj([
                ("id", 2.into()),
                (
                    "reactions",
                    Value::Array(vec![obj([("message", 1.into()), ("content", "+1".into())])]),
                ),
            ]),
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::IdentityImmutable { .. }));

    assert_eq!(store.record(reaction).unwrap().one("message"), Some(m1));
    assert!(store.record(m2).unwrap().many("reactions").is_empty());
    assert!(store.check_invariants().is_empty());

    store
        .update(m1, Changes::new().add("reactions", [reaction]))
        .unwrap();
    store
        .insert(
            "Message",
            obj([
                ("id", 2.into()),
                (
                    "reactions",
                    Value::Array(vec![obj([("message", 2.into()), ("content", "+1".into())])]),
                ),
            ]),
        )
        .unwrap();
    assert_eq!(store.len("Reaction").unwrap(), 2);
    assert_eq!(store.record(reaction).unwrap().one("message"), Some(m1));
    assert!(store.check_invariants().is_empty());
}

#[test]
fn unlinking_identity_inverse_deletes_holders() {
    let mut store = Store::new(messaging_schema());
    let m = store
        .insert(
            "Message",
            obj([
                ("id", 1.into()),
                (
                    "reactions",
                    Value::Array(vec![
                        obj([("message", 1.into()), ("content", "+1".into())]),
                        obj([("message", 1.into()), ("content", "heart".into())]),
                    ]),
                ),
            ]),
        )
        .unwrap();
    let reactions = store.record(m).unwrap().many("reactions").to_vec();

    store
        .update(m, Changes::new().set("reactions", Value::Array(vec![])))
        .unwrap();

    assert!(reactions.iter().all(|&r| !store.contains(r)));
    assert_eq!(store.len("Reaction").unwrap(), 0);
    assert!(store.contains(m));
    assert!(store.check_invariants().is_empty());

    let partner = store
        .insert("Member", obj([("thread", thread(1)), ("persona", persona("partner", 1))]))
        .unwrap();
    let guest = store
        .insert("Member", obj([("thread", thread(1)), ("persona", persona("guest", 2))]))
        .unwrap();
    let t = thread_id(&store, 1);

    store
        .update(
            t,
            Changes::new().set(
                "members",
                Value::Array(vec![obj([
                    ("thread", thread(1)),
                    ("persona", persona("partner", 1)),
                ])]),
            ),
        )
        .unwrap();
    assert_eq!(store.record(t).unwrap().many("members"), &[partner]);
    assert!(!store.contains(guest));
    assert_eq!(store.len("Persona").unwrap(), 2);

    store
        .update(t, Changes::new().unlink("members", partner))
        .unwrap();
    assert!(!store.contains(partner));
    assert_eq!(store.len("Member").unwrap(), 0);
    assert!(store.check_invariants().is_empty());
}

#[test]
fn computed_field_consistency() {
    let mut store = Store::new(messaging_schema());
    store.insert("Message", message(1, 1, "first")).unwrap();
    let t = thread_id(&store, 1);
    assert_eq!(store.record(t).unwrap().attr("message_count"), Some(&Value::from(1)));

    store
        .batch(|s| {
            s.insert("Message", message(2, 1, "second"))?;
            s.insert("Message", message(3, 1, "third"))?;
            // Not flushed yet: reads see the last fresh value.
            assert_eq!(s.record(t).unwrap().attr("message_count"), Some(&Value::from(1)));
            Ok(())
        })
        .unwrap();

    let record = store.record(t).unwrap();
    assert_eq!(record.attr("message_count"), Some(&Value::from(3)));
    assert_eq!(record.attr("preview"), Some(&Value::from("third")));

    let third = store.get("Message", &[3.into()]).unwrap().id();
    store.delete(third).unwrap();
    let record = store.record(t).unwrap();
    assert_eq!(record.attr("message_count"), Some(&Value::from(2)));
    assert_eq!(record.attr("preview"), Some(&Value::from("second")));
}

#[test]
fn computed_field_follows_related_record() {
    let mut store = Store::new(messaging_schema());
    let m = store
        .insert(
            "Message",
            obj([("id", 1.into()), ("author", persona("partner", 3))]),
        )
        .unwrap();
    assert_eq!(store.record(m).unwrap().attr("author_name"), Some(&Value::Null));

    store
        .insert(
            "Persona",
            obj([("type", "partner".into()), ("id", 3.into()), ("name", "Ada".into())]),
        )
        .unwrap();
    assert_eq!(store.record(m).unwrap().attr("author_name"), Some(&Value::from("Ada")));

    let err = store
        .update(m, Changes::new().set("author_name", "forged"))
        .unwrap_err();
    assert!(matches!(err, CoreError::ReadonlyField { .. }));
}

#[test]
fn composite_identity() {
    let mut store = Store::new(messaging_schema());
    let partner = store.insert("Persona", persona("partner", 1)).unwrap();
    let guest = store.insert("Persona", persona("guest", 1)).unwrap();

    assert_ne!(partner, guest);
    assert_eq!(store.get("Persona", &["partner".into(), 1.into()]).unwrap().id(), partner);
    assert_eq!(store.get("Persona", &["guest".into(), 1.into()]).unwrap().id(), guest);

    let err = store
        .insert("Persona", obj([("id", 1.into())]))
        .unwrap_err();
    assert!(matches!(err, CoreError::MissingIdentity { ref field, .. } if field == "type"));
    assert_eq!(store.len("Persona").unwrap(), 2);
}

#[test]
fn identity_may_include_relations() {
    let mut store = Store::new(messaging_schema());
    let m = store.insert("Message", obj([("id", 4.into())])).unwrap();

    let by_payload = store
        .insert("Reaction", obj([("message", 4.into()), ("content", "+1".into())]))
        .unwrap();
    let by_handle = store
        .insert_changes("Reaction", Changes::new().link("message", m).set("content", "+1"))
        .unwrap();

    assert_eq!(by_payload, by_handle);
    assert_eq!(store.record(m).unwrap().many("reactions"), &[by_payload]);
    let (key, found) = store
        .resolve("Reaction", &obj([("message", 4.into()), ("content", "+1".into())]))
        .unwrap();
    assert_eq!(found, Some(by_payload));
    assert_eq!(key.parts()[1], Value::from("+1"));
}

#[test]
fn stale_handles_never_alias() {
    let mut store = Store::new(messaging_schema());
    let old = store.insert("Persona", persona("partner", 1)).unwrap();
    store.delete(old).unwrap();
    let new = store.insert("Persona", persona("partner", 1)).unwrap();

    assert_eq!(old.index(), new.index());
    assert_ne!(old, new);
    assert!(store.record(old).is_none());
    assert!(matches!(
        store.update(old, Changes::new().set("name", "x")),
        Err(CoreError::RecordNotFound { .. })
    ));
}

#[test]
fn change_feed_reports_each_flush_once() {
    let mut store = Store::new(messaging_schema());
    let events = store.subscribe();

    store
        .batch(|s| {
            s.insert("Message", message(1, 1, "a"))?;
            s.insert("Message", message(2, 1, "b"))?;
            let scratch = s.insert("Persona", persona("guest", 5))?;
            s.delete(scratch)?;
            Ok(())
        })
        .unwrap();

    let batch: Vec<_> = events.try_iter().collect();
    assert_eq!(batch.len(), 3);
    assert!(batch.iter().all(|e| e.change_type == ChangeType::Insert));
    assert!(batch.iter().all(|e| e.sequence == batch[0].sequence));
    assert!(batch.iter().all(|e| e.model != "Persona"));

    let m2 = store.get("Message", &[2.into()]).unwrap().id();
    store.update(m2, Changes::new().set("body", "edited")).unwrap();
    let update: Vec<_> = events.try_iter().collect();
    assert_eq!(update.len(), 2);
    let edited = update.iter().find(|e| e.record == m2).unwrap();
    assert_eq!(edited.change_type, ChangeType::Update);
    assert_eq!(edited.fields, vec!["body".to_string()]);
    let thread = update.iter().find(|e| e.model == "Thread").unwrap();
    assert_eq!(thread.fields, vec!["preview".to_string()]);

    let polled = store.poll(batch[0].sequence, 10);
    assert_eq!(polled, update);
}
