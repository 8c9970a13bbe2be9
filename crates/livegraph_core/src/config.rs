//! Store configuration.

/// What a flush does when it finds a compute cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Return `ComputeCycle` from the flush (development builds).
    Fail,
    /// Keep the last value, log the cycle and report it in the flush report.
    Degrade,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Fail
        } else {
            Self::Degrade
        }
    }
}

/// How payload keys that name no declared field are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFieldPolicy {
    /// Skip them silently (server payloads often carry extra keys).
    #[default]
    Ignore,
    /// Fail the item with `UnknownField`.
    Reject,
}

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Flush at the end of every public mutating call made outside a batch.
    pub auto_flush: bool,

    /// Behaviour on compute cycles.
    pub cycle_policy: CyclePolicy,

    /// Behaviour on unknown payload keys.
    pub unknown_fields: UnknownFieldPolicy,

    /// Maximum recompute/hook rounds in one flush.
    pub max_flush_rounds: usize,

    /// Number of change events kept for polling.
    pub feed_history: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            auto_flush: true,
            cycle_policy: CyclePolicy::default(),
            unknown_fields: UnknownFieldPolicy::Ignore,
            max_flush_rounds: 64,
            feed_history: 10_000,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether mutating calls flush automatically.
    #[must_use]
    pub const fn auto_flush(mut self, value: bool) -> Self {
        self.auto_flush = value;
        self
    }

    /// Sets the compute cycle policy.
    #[must_use]
    pub const fn cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    /// Sets the unknown field policy.
    #[must_use]
    pub const fn unknown_fields(mut self, policy: UnknownFieldPolicy) -> Self {
        self.unknown_fields = policy;
        self
    }

    /// Sets the flush round limit.
    #[must_use]
    pub const fn max_flush_rounds(mut self, rounds: usize) -> Self {
        self.max_flush_rounds = rounds;
        self
    }

    /// Sets the change feed history size.
    #[must_use]
    pub const fn feed_history(mut self, events: usize) -> Self {
        self.feed_history = events;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert!(config.auto_flush);
        assert_eq!(config.unknown_fields, UnknownFieldPolicy::Ignore);
        assert_eq!(config.max_flush_rounds, 64);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .auto_flush(false)
            .cycle_policy(CyclePolicy::Degrade)
            .unknown_fields(UnknownFieldPolicy::Reject)
            .max_flush_rounds(4);

        assert!(!config.auto_flush);
        assert_eq!(config.cycle_policy, CyclePolicy::Degrade);
        assert_eq!(config.unknown_fields, UnknownFieldPolicy::Reject);
        assert_eq!(config.max_flush_rounds, 4);
    }
}
