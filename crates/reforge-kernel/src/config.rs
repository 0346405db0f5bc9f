//! Reload configuration
//!
//! Configuration is passed explicitly to the engine components that need it,
//! never read from ambient state.

use std::time::Duration;

/// When the engine reacts to a change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReloadStrategy {
    /// Reload as soon as a change is observed.
    Immediate,
    /// Coalesce changes for the given window before reloading.
    Debounced(Duration),
    /// Never reload automatically; changes are only applied through an
    /// explicit `request_reload`.
    Manual,
}

impl Default for ReloadStrategy {
    fn default() -> Self {
        Self::Debounced(Duration::from_millis(500))
    }
}

/// Engine-wide reload configuration.
#[derive(Debug, Clone)]
pub struct ReloadConfig {
    /// How change notifications are turned into reload requests.
    pub strategy: ReloadStrategy,
    /// Default for [`ReloadOptions::allow_cycle_fallback`]. Off by default:
    /// an ambiguous load order inside a cycle is a user-visible condition,
    /// not something to paper over automatically.
    pub allow_cycle_fallback: bool,
    /// Capacity of the reload event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            strategy: ReloadStrategy::default(),
            allow_cycle_fallback: false,
            event_channel_capacity: 1024,
        }
    }
}

impl ReloadConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reload strategy.
    pub fn with_strategy(mut self, strategy: ReloadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Allow or forbid unordered best-effort reloads of cyclic groups by
    /// default.
    pub fn with_cycle_fallback(mut self, enabled: bool) -> Self {
        self.allow_cycle_fallback = enabled;
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }
}

/// Per-request options for a single reload transaction.
#[derive(Debug, Clone, Default)]
pub struct ReloadOptions {
    /// Explicitly opt in to an unordered best-effort reload when the impact
    /// set contains a dependency cycle. Without this the transaction fails
    /// with `CyclicDependency` before any host call is made.
    pub allow_cycle_fallback: bool,
}

impl ReloadOptions {
    /// Options with the cycle fallback enabled.
    pub fn cycle_fallback() -> Self {
        Self {
            allow_cycle_fallback: true,
        }
    }
}
