//! Geometric backoff for spin protection
//!
//! Used by the persistent loop when a timer-driven pass makes no progress:
//! each consecutive unproductive pass doubles the pause, up to a ceiling,
//! and a productive pass resets it to the floor.

use std::time::Duration;
use tracing::trace;

/// Doubling backoff between a floor and a ceiling
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff; a ceiling below the floor is raised to the floor.
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// Return the pause to take now and double the following one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        trace!(
            delay_secs = delay.as_secs(),
            following_secs = self.current.as_secs(),
            "Backoff advanced"
        );
        delay
    }

    /// Drop back to the floor
    pub fn reset(&mut self) {
        if self.current != self.floor {
            trace!(floor_secs = self.floor.as_secs(), "Backoff reset");
        }
        self.current = self.floor;
    }

    /// The pause [`next_delay`](Self::next_delay) would return
    pub fn peek(&self) -> Duration {
        self.current
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}
