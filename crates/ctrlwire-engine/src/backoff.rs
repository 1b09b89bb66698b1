//! Reconnect delay bookkeeping.

use std::time::Duration;

/// Linear reconnect backoff.
///
/// The first reconnect after a healthy connection happens immediately;
/// each further failure adds one step, up to the cap.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    current: Duration,
    step: Duration,
    max: Duration,
}

impl Backoff {
    pub(crate) fn new(step: Duration, max: Duration) -> Self {
        Self {
            current: Duration::ZERO,
            step,
            max,
        }
    }

    /// Returns the delay for this attempt and grows it for the next one.
    pub(crate) fn advance(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current + self.step).min(self.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = Duration::ZERO;
    }
}
