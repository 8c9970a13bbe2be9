//! Invariant assertions.

use livegraph_core::{Store, Violation};

/// Panics with every violation if the store breaks an invariant.
///
/// # Panics
///
/// If [`Store::check_invariants`] reports anything, or if the store still
/// has stale computed fields while auto-flush is on.
pub fn assert_invariants(store: &Store) {
    let violations = store.check_invariants();
    assert!(
        violations.is_empty(),
        "store invariants violated:\n{}",
        describe(&violations)
    );
    if store.config().auto_flush {
        assert_eq!(store.stale_count(), 0, "stale computed fields after flush");
    }
}

/// Formats violations one per line.
pub fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{message_payload, messaging_store};

    #[test]
    fn test_fresh_store_is_consistent() {
        let mut store = messaging_store();
        store.insert("Message", message_payload(1, 1, "hi")).unwrap();
        assert_invariants(&store);
    }

    #[test]
    fn test_describe_is_empty_without_violations() {
        assert_eq!(describe(&[]), "");
    }
}
