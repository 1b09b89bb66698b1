//! Per-key throttle scheduler for ctrlwire.
//!
//! Each key (a property, in practice) owns a small state machine. The first
//! value offered fires immediately and opens a window of one interval.
//! Values offered while the window is open are queued, each replacing or
//! merging with the previous one, and the latest fires when the window
//! closes. A value offered after the window should already have closed
//! fires at once, even if the timer has not been serviced yet.
//!
//! | state | event | action | next |
//! |---|---|---|---|
//! | Idle | offer(v) | fire v | Pending(now) |
//! | Pending(t) / Cooling(t, _) | offer(v), now − t ≥ I | fire v | Pending(now) |
//! | Pending(t) / Cooling(t, _) | offer(v), now − t < I | queue v | Cooling(t, v) |
//! | Pending(t) | timer t + I | — | Idle |
//! | Cooling(t, q) | timer t + I | fire q | Pending(now) |
//!
//! # Integration
//!
//! The scheduler holds no task of its own. It sits inside an actor's
//! `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some((key, value)) = rx.recv() => {
//!             if let Some(v) = throttle.offer(key.clone(), value) { fire(key, v) }
//!         }
//!         due = throttle.wait_expired() => {
//!             for (key, v) in due { fire(key, v) }
//!         }
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`Throttle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Minimum spacing between two fires for the same key, in microseconds.
    /// Default: 16 667 (one frame at 60 Hz).
    pub interval_us: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            interval_us: 16_667,
        }
    }
}

impl ThrottleConfig {
    /// Longest accepted interval (one minute).
    pub const MAX_INTERVAL_US: u64 = 60_000_000;

    /// Caps the interval at [`Self::MAX_INTERVAL_US`].
    pub fn validated(mut self) -> Self {
        if self.interval_us > Self::MAX_INTERVAL_US {
            warn!(
                interval_us = self.interval_us,
                max = Self::MAX_INTERVAL_US,
                "throttle interval exceeds maximum — clamping"
            );
            self.interval_us = Self::MAX_INTERVAL_US;
        }
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_us)
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Counters kept by a [`Throttle`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleMetrics {
    /// Values passed to `offer`.
    pub offered: u64,
    /// Values fired directly from `offer`.
    pub fired_leading: u64,
    /// Queued values fired when a window closed.
    pub fired_trailing: u64,
    /// Queued values that were merged into a later one instead of firing.
    pub coalesced: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Observable state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No window open.
    Idle,
    /// A window is open and nothing is queued.
    Pending,
    /// A window is open and a value waits for it to close.
    Cooling,
}

enum Slot<V> {
    Pending { window_start: Instant },
    Cooling { window_start: Instant, queued: V },
}

impl<V> Slot<V> {
    fn window_start(&self) -> Instant {
        match self {
            Self::Pending { window_start } | Self::Cooling { window_start, .. } => {
                *window_start
            }
        }
    }
}

/// A per-key trailing-edge throttle.
pub struct Throttle<K, V> {
    interval: Duration,
    slots: HashMap<K, Slot<V>>,
    metrics: ThrottleMetrics,
}

impl<K, V> Throttle<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(config: ThrottleConfig) -> Self {
        let config = config.validated();
        Self {
            interval: config.interval(),
            slots: HashMap::new(),
            metrics: ThrottleMetrics::default(),
        }
    }

    /// The window length.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Offers a value for `key`; a queued value is replaced.
    ///
    /// Returns `Some(value)` when it should fire now, `None` when it was
    /// queued for the end of the current window.
    pub fn offer(&mut self, key: K, value: V) -> Option<V> {
        self.offer_with(key, value, |_queued, latest| latest)
    }

    /// Like [`offer`](Self::offer), but combines a queued value with the
    /// new one through `merge(queued, latest)`.
    pub fn offer_with(
        &mut self,
        key: K,
        value: V,
        merge: impl FnOnce(V, V) -> V,
    ) -> Option<V> {
        self.metrics.offered += 1;
        let now = Instant::now();

        let Some(slot) = self.slots.remove(&key) else {
            self.slots.insert(key, Slot::Pending { window_start: now });
            self.metrics.fired_leading += 1;
            trace!("throttle: idle key fired");
            return Some(value);
        };

        let window_start = slot.window_start();
        let value = match slot {
            Slot::Pending { .. } => value,
            Slot::Cooling { queued, .. } => {
                self.metrics.coalesced += 1;
                merge(queued, value)
            }
        };

        if now.saturating_duration_since(window_start) >= self.interval {
            // The window should already have closed; fire without waiting
            // for the timer.
            self.slots.insert(key, Slot::Pending { window_start: now });
            self.metrics.fired_leading += 1;
            trace!("throttle: overdue window fired immediately");
            Some(value)
        } else {
            self.slots.insert(
                key,
                Slot::Cooling {
                    window_start,
                    queued: value,
                },
            );
            None
        }
    }

    /// Earliest instant at which some window closes.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .values()
            .map(|slot| slot.window_start() + self.interval)
            .min()
    }

    /// Closes every window that has ended by `now`.
    ///
    /// Returns the queued values that fire as a result. Their keys start a
    /// fresh window at `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<(K, V)> {
        let due: Vec<K> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.window_start() + self.interval <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut fired = Vec::new();
        for key in due {
            if let Some(Slot::Cooling { queued, .. }) = self.slots.remove(&key) {
                self.slots
                    .insert(key.clone(), Slot::Pending { window_start: now });
                self.metrics.fired_trailing += 1;
                fired.push((key, queued));
            }
        }
        if !fired.is_empty() {
            trace!(count = fired.len(), "throttle: trailing values fired");
        }
        fired
    }

    /// Waits for the next window to close, then expires it.
    ///
    /// Pends forever while no window is open. Cancel safe: state only
    /// changes after the sleep completes.
    pub async fn wait_expired(&mut self) -> Vec<(K, V)> {
        match self.next_deadline() {
            Some(deadline) => {
                time::sleep_until(deadline).await;
                self.expire(Instant::now())
            }
            None => std::future::pending().await,
        }
    }

    /// Current state of `key`.
    pub fn state(&self, key: &K) -> SlotState {
        match self.slots.get(key) {
            None => SlotState::Idle,
            Some(Slot::Pending { .. }) => SlotState::Pending,
            Some(Slot::Cooling { .. }) => SlotState::Cooling,
        }
    }

    /// The value queued for `key`, if its window holds one.
    pub fn queued_mut(&mut self, key: &K) -> Option<&mut V> {
        match self.slots.get_mut(key)? {
            Slot::Pending { .. } => None,
            Slot::Cooling { queued, .. } => Some(queued),
        }
    }

    /// Drops `key`'s window, returning its queued value, if any.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        match self.slots.remove(key)? {
            Slot::Pending { .. } => None,
            Slot::Cooling { queued, .. } => Some(queued),
        }
    }

    /// Number of keys with an open window.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn metrics(&self) -> &ThrottleMetrics {
        &self.metrics
    }
}
