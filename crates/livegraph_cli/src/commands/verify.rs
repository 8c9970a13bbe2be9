//! Verify command implementation.

use super::replay::{load_and_replay, Replay};
use crate::error::{CliError, CliResult};
use livegraph_core::{Store, Violation};
use std::path::Path;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of live records checked.
    pub records_checked: usize,
    /// Events or items that failed during replay.
    pub failed_events: usize,
    /// Invariant violations found.
    pub violations: Vec<Violation>,
    /// Computed fields still stale after the final flush.
    pub stale: usize,
}

impl VerifyResult {
    /// Checks a replayed store.
    pub fn check(store: &Store, failed_events: usize) -> Self {
        Self {
            records_checked: store.record_count(),
            failed_events,
            violations: store.check_invariants(),
            stale: store.stale_count(),
        }
    }

    fn is_ok(&self) -> bool {
        self.violations.is_empty() && self.stale == 0
    }
}

/// Runs the verify command.
pub fn run(schema_path: &Path, events_path: &Path) -> CliResult<()> {
    println!("Replaying {:?} against {:?}", events_path, schema_path);
    println!();

    let Replay { store, summary } = load_and_replay(schema_path, events_path, false)?;
    let result = VerifyResult::check(&store, summary.failures.len());
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err(CliError::Verification {
            count: result.violations.len() + result.stale,
        })
    }
}

fn print_result(result: &VerifyResult) {
    println!("  Records checked: {}", result.records_checked);
    println!("  Failed events:   {}", result.failed_events);
    println!("  Stale fields:    {}", result.stale);
    println!("  Violations:      {}", result.violations.len());
    for violation in result.violations.iter().take(10) {
        println!("    - {violation}");
    }
    if result.violations.len() > 10 {
        println!("    ... and {} more", result.violations.len() - 10);
    }
}
