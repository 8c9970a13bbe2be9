//! Benchmark utilities.

use livegraph_testkit::fixtures::{message_payload, persona_payload, THREAD_MODEL};
use livegraph_value::Value;

/// A multi-model payload with `threads` threads of `messages` nested
/// messages each, the shape a server response usually has.
pub fn thread_batch(threads: i64, messages: i64) -> Value {
    let items = (0..threads)
        .map(|t| {
            let nested = (0..messages)
                .map(|m| {
                    let id = t * messages + m;
                    Value::object([
                        ("id", id.into()),
                        ("body", format!("message {id}").into()),
                        ("author", persona_payload("partner", id % 5)),
                    ])
                })
                .collect::<Vec<_>>();
            Value::object([
                ("model", THREAD_MODEL.into()),
                ("id", t.into()),
                ("name", format!("thread {t}").into()),
                ("messages", Value::Array(nested)),
            ])
        })
        .collect::<Vec<_>>();
    Value::object([("Thread", Value::Array(items))])
}

/// Flat message payloads spread over `threads` threads.
pub fn message_payloads(count: i64, threads: i64) -> Vec<Value> {
    (0..count)
        .map(|id| message_payload(id, id % threads.max(1), "hello"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use livegraph_testkit::fixtures::messaging_store;

    #[test]
    fn thread_batch_ingests_cleanly() {
        let mut store = messaging_store();
        let report = store.ingest(&thread_batch(3, 4)).unwrap();
        assert!(report.is_success());
        assert_eq!(store.len("Thread").unwrap(), 3);
        assert_eq!(store.len("Message").unwrap(), 12);
        assert_eq!(store.len("Persona").unwrap(), 5);
    }

    #[test]
    fn message_payloads_spread_over_threads() {
        let mut store = messaging_store();
        let results = store.insert_many("Message", &message_payloads(10, 4)).unwrap();
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(store.len("Thread").unwrap(), 4);
    }
}
