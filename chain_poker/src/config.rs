//! Sync session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for every table session a store opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How long a local action may wait for remote confirmation before the
    /// optimistic table is reverted (default: 30 s)
    pub action_timeout: Duration,

    /// Bounded queue between the change feed and the session (default: 256)
    pub feed_capacity: usize,

    /// Command inbox of each session (default: 32)
    pub inbox_capacity: usize,

    /// Per-subscriber notification queue (default: 64)
    pub notification_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(30),
            feed_capacity: 256,
            inbox_capacity: 32,
            notification_capacity: 64,
        }
    }
}

impl SyncConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.action_timeout.is_zero() {
            return Err("Action timeout must be positive".to_string());
        }

        if self.action_timeout > Duration::from_secs(600) {
            return Err("Action timeout must be at most 10 minutes".to_string());
        }

        for (name, capacity) in [
            ("Feed", self.feed_capacity),
            ("Inbox", self.inbox_capacity),
            ("Notification", self.notification_capacity),
        ] {
            if capacity == 0 {
                return Err(format!("{name} capacity must be at least 1"));
            }
        }

        Ok(())
    }

    /// Same settings with a different confirmation deadline.
    #[must_use]
    pub fn with_action_timeout(mut self, action_timeout: Duration) -> Self {
        self.action_timeout = action_timeout;
        self
    }
}
