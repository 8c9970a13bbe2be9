//! Store statistics.
//!
//! Counters for monitoring how much work ingestion and flushing perform.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = store.stats().snapshot();
//! println!("created: {}", stats.creates);
//! println!("recomputes: {}", stats.recomputes);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Store statistics.
///
/// All counters are atomic so a shared handle can be read from another
/// thread while the owning thread mutates the store.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Top-level insert items processed.
    inserts: AtomicU64,
    /// Records created.
    creates: AtomicU64,
    /// Existing records merged into or updated.
    updates: AtomicU64,
    /// Records deleted (including cascades).
    deletes: AtomicU64,
    /// Relation sides attached.
    links: AtomicU64,
    /// Relation sides detached.
    unlinks: AtomicU64,
    /// Unrelate calls that found nothing to unlink.
    dangling_unlinks: AtomicU64,
    /// Computed fields recomputed.
    recomputes: AtomicU64,
    /// Flushes performed.
    flushes: AtomicU64,
    /// Update hooks executed.
    hook_runs: AtomicU64,
    /// Compute cycles detected.
    cycles: AtomicU64,
    /// Failed operations.
    errors: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_create(&self) {
        self.creates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_link(&self) {
        self.links.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unlink(&self) {
        self.unlinks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dangling_unlink(&self) {
        self.dangling_unlinks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recompute(&self) {
        self.recomputes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hook_run(&self) {
        self.hook_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of top-level insert items processed.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Returns the number of records created.
    pub fn creates(&self) -> u64 {
        self.creates.load(Ordering::Relaxed)
    }

    /// Returns the number of merges into existing records.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Returns the number of deleted records.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the number of relation sides attached.
    pub fn links(&self) -> u64 {
        self.links.load(Ordering::Relaxed)
    }

    /// Returns the number of relation sides detached.
    pub fn unlinks(&self) -> u64 {
        self.unlinks.load(Ordering::Relaxed)
    }

    /// Returns the number of unrelate calls that had nothing to unlink.
    pub fn dangling_unlinks(&self) -> u64 {
        self.dangling_unlinks.load(Ordering::Relaxed)
    }

    /// Returns the number of computed field recomputations.
    ///
    /// Only committed recomputations count; an evaluation retried because it
    /// read a stale dependency is not counted twice.
    pub fn recomputes(&self) -> u64 {
        self.recomputes.load(Ordering::Relaxed)
    }

    /// Returns the number of flushes.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Returns the number of update hook runs.
    pub fn hook_runs(&self) -> u64 {
        self.hook_runs.load(Ordering::Relaxed)
    }

    /// Returns the number of compute cycles detected.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Returns the number of failed operations.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            inserts: self.inserts(),
            creates: self.creates(),
            updates: self.updates(),
            deletes: self.deletes(),
            links: self.links(),
            unlinks: self.unlinks(),
            dangling_unlinks: self.dangling_unlinks(),
            recomputes: self.recomputes(),
            flushes: self.flushes(),
            hook_runs: self.hook_runs(),
            cycles: self.cycles(),
            errors: self.errors(),
        }
    }
}

/// A point-in-time snapshot of store statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Top-level insert items processed.
    pub inserts: u64,
    /// Records created.
    pub creates: u64,
    /// Merges into existing records.
    pub updates: u64,
    /// Records deleted.
    pub deletes: u64,
    /// Relation sides attached.
    pub links: u64,
    /// Relation sides detached.
    pub unlinks: u64,
    /// Unrelate calls with nothing to unlink.
    pub dangling_unlinks: u64,
    /// Computed field recomputations.
    pub recomputes: u64,
    /// Flushes.
    pub flushes: u64,
    /// Update hook runs.
    pub hook_runs: u64,
    /// Compute cycles.
    pub cycles: u64,
    /// Failed operations.
    pub errors: u64,
}
