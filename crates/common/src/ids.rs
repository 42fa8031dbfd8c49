//! Identifier types for the OCSP renewer.
//!
//! Action IDs tag every log line belonging to one certificate's renewal
//! attempt, so interleaved output from a sweep can be pulled apart again.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Upper bound (exclusive) for the random seed of a fresh sequence.
const SEED_RANGE: u64 = 2 << 20;

/// Identifier for one renewal attempt of one certificate.
///
/// Values come from an [`ActionIdSequence`] and are unique within a
/// process; the random seed keeps them from repeating across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(u64);

impl ActionId {
    /// Wrap a raw value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Monotonically increasing source of [`ActionId`]s.
///
/// Lock-free; safe to share between the scheduler and any other task.
#[derive(Debug)]
pub struct ActionIdSequence {
    last: AtomicU64,
}

impl ActionIdSequence {
    /// Create a sequence seeded from the operating system's CSPRNG
    pub fn new() -> Self {
        let seed = OsRng.gen_range(0..SEED_RANGE);
        trace!(seed = seed, "Seeded action ID sequence");
        Self::starting_at(seed)
    }

    /// Create a sequence whose first issued ID is `seed + 1`
    pub fn starting_at(seed: u64) -> Self {
        Self {
            last: AtomicU64::new(seed),
        }
    }

    /// Issue the next ID
    pub fn next_id(&self) -> ActionId {
        ActionId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl Default for ActionIdSequence {
    fn default() -> Self {
        Self::new()
    }
}
