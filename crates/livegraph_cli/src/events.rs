//! JSON Lines event streams.
//!
//! One event per line; blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! {"ingest": {"Thread": [{"id": 1, "messages": [{"id": 10}]}]}}
//! {"update": {"model": "Message", "key": [10], "changes": {"body": "edited"}}}
//! {"delete": {"model": "Thread", "key": 1}}
//! "flush"
//! ```

use crate::error::{CliError, CliResult};
use livegraph_value::Value;
use serde::Deserialize;

/// One replayable event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// A multi-model payload, `{model: record | [record]}`.
    Ingest(Value),
    /// Changes applied to the record with the given key.
    Update {
        /// Model name.
        model: String,
        /// Identity key, an array or a single scalar.
        key: Value,
        /// Changes in payload form.
        changes: Value,
    },
    /// Deletion of the record with the given key.
    Delete {
        /// Model name.
        model: String,
        /// Identity key, an array or a single scalar.
        key: Value,
    },
    /// An explicit flush.
    Flush,
}

impl Event {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Ingest(_) => "ingest",
            Event::Update { .. } => "update",
            Event::Delete { .. } => "delete",
            Event::Flush => "flush",
        }
    }
}

/// Identity key parts from the `key` member of an event.
pub fn key_parts(key: &Value) -> Vec<Value> {
    match key.as_array() {
        Some(parts) => parts.to_vec(),
        None => vec![key.clone()],
    }
}

/// Parses an event stream into `(line number, event)` pairs.
///
/// # Errors
///
/// [`CliError::Event`] for the first line that does not parse.
pub fn parse_events(text: &str) -> CliResult<Vec<(usize, Event)>> {
    let mut events = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(trimmed).map_err(|err| CliError::Event {
            line: index + 1,
            message: err.to_string(),
        })?;
        events.push((index + 1, event));
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_event_kind() {
        let text = r#"
# seed
{"ingest": {"Thread": {"id": 1}}}
{"update": {"model": "Thread", "key": [1], "changes": {"name": "x"}}}

{"delete": {"model": "Thread", "key": 1}}
"flush"
"#;
        let events = parse_events(text).unwrap();
        let names: Vec<_> = events.iter().map(|(_, e)| e.name()).collect();
        assert_eq!(names, ["ingest", "update", "delete", "flush"]);
        assert_eq!(events[0].0, 3);
        assert_eq!(events[3].0, 7);
    }

    #[test]
    fn errors_name_the_line() {
        let err = parse_events("\"flush\"\n{\"upsert\": {}}\n").unwrap_err();
        assert!(matches!(err, CliError::Event { line: 2, .. }));
    }

    #[test]
    fn scalar_keys_become_single_part_keys() {
        assert_eq!(key_parts(&Value::from(7)), vec![Value::from(7)]);
        let composite = Value::Array(vec!["partner".into(), 3.into()]);
        assert_eq!(key_parts(&composite).len(), 2);
    }
}
