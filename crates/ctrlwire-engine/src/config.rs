//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for the connection engine.
///
/// All durations are integer milliseconds so the struct maps one to one
/// onto a JSON config file. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a request may wait for its reply.
    ///
    /// Default: 2000. A timeout is treated as a dead connection.
    pub request_timeout_ms: u64,

    /// How much the reconnect delay grows after each failed attempt.
    ///
    /// Default: 500.
    pub reconnect_step_ms: u64,

    /// Upper bound for the reconnect delay.
    ///
    /// Default: 5000.
    pub reconnect_max_delay_ms: u64,

    /// Polling interval while waiting for a detached socket to finish
    /// connecting so it can be closed.
    ///
    /// Default: 500.
    pub close_poll_interval_ms: u64,

    /// How many times a detached, still-connecting socket is polled before
    /// it is abandoned.
    ///
    /// Default: 20.
    pub close_poll_attempts: u32,

    /// The two bytes every outgoing frame starts with.
    ///
    /// Default: `[0xBA, 0xDA]`.
    pub signature: [u8; 2],

    /// Capacity of the notification broadcast channel. Slow subscribers
    /// that fall further behind than this lose the oldest frames.
    ///
    /// Default: 256.
    pub notification_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 2_000,
            reconnect_step_ms: 500,
            reconnect_max_delay_ms: 5_000,
            close_poll_interval_ms: 500,
            close_poll_attempts: 20,
            signature: [0xba, 0xda],
            notification_buffer: 256,
        }
    }
}

impl EngineConfig {
    /// Fixes values the engine cannot run with.
    ///
    /// Called by [`spawn_engine`](crate::spawn_engine). Rules:
    /// - zero timeouts and intervals become 1 ms;
    /// - `close_poll_attempts` and `notification_buffer` are at least 1;
    /// - `reconnect_step_ms` is capped at `reconnect_max_delay_ms`.
    pub fn validated(mut self) -> Self {
        if self.request_timeout_ms == 0 {
            warn!("request_timeout_ms is 0 — using 1");
            self.request_timeout_ms = 1;
        }
        if self.close_poll_interval_ms == 0 {
            warn!("close_poll_interval_ms is 0 — using 1");
            self.close_poll_interval_ms = 1;
        }
        if self.close_poll_attempts == 0 {
            warn!("close_poll_attempts is 0 — using 1");
            self.close_poll_attempts = 1;
        }
        if self.notification_buffer == 0 {
            warn!("notification_buffer is 0 — using 1");
            self.notification_buffer = 1;
        }
        if self.reconnect_step_ms > self.reconnect_max_delay_ms {
            warn!(
                step = self.reconnect_step_ms,
                max = self.reconnect_max_delay_ms,
                "reconnect step exceeds max delay — clamping"
            );
            self.reconnect_step_ms = self.reconnect_max_delay_ms;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_step(&self) -> Duration {
        Duration::from_millis(self.reconnect_step_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub fn close_poll_interval(&self) -> Duration {
        Duration::from_millis(self.close_poll_interval_ms)
    }
}
