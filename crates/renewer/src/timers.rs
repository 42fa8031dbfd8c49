//! Timer registry
//!
//! Process-wide record of when each certificate should next be checked,
//! together with the coalesced forced-sweep request. The persistent
//! scheduler sleeps until [`TimerRegistry::earliest`].
//!
//! Everything sits behind one mutex and callers only ever get copies out.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::trace;

/// A pending out-of-band sweep request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForcedSweep {
    /// When the (latest) request was made
    pub at: DateTime<Utc>,
    /// Treat every certificate as due
    pub full: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    checks: HashMap<PathBuf, DateTime<Utc>>,
    earliest: Option<DateTime<Utc>>,
    active: bool,
    forced: Option<ForcedSweep>,
}

/// Next-check times per certificate path, plus forced-sweep coalescing
#[derive(Debug, Default)]
pub struct TimerRegistry {
    state: Mutex<RegistryState>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make [`register_future_check`](Self::register_future_check) effective
    pub fn enable_timers(&self) {
        self.state.lock().active = true;
        trace!("Timer registry enabled");
    }

    pub fn timers_enabled(&self) -> bool {
        self.state.lock().active
    }

    /// Record when `path` should next be checked
    ///
    /// An earlier pending time is kept; an already elapsed one is always
    /// replaced. Returns whether the entry changed.
    pub fn register_future_check(&self, path: &Path, at: DateTime<Utc>) -> bool {
        self.register_future_check_at(path, at, Utc::now())
    }

    pub(crate) fn register_future_check_at(
        &self,
        path: &Path,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut state = self.state.lock();
        if !state.active {
            return false;
        }

        let previous = state.checks.get(path).copied();
        if let Some(existing) = previous {
            if existing > now && existing <= at {
                trace!(path = %path.display(), existing = %existing, proposed = %at, "Keeping earlier check");
                return false;
            }
        }

        state.checks.insert(path.to_path_buf(), at);
        state.earliest = match (previous, state.earliest) {
            // The replaced entry may have been the minimum
            (Some(old), Some(earliest)) if old == earliest && at > old => {
                state.checks.values().min().copied()
            }
            (_, Some(earliest)) if earliest <= at => Some(earliest),
            _ => Some(at),
        };

        trace!(path = %path.display(), at = %at, earliest = ?state.earliest, "Registered future check");
        true
    }

    /// Remove and return the check registered for `path`
    ///
    /// A renewal takes its entry before deciding; whatever it concludes is
    /// registered afresh, and an attempt that ends without a next check
    /// leaves nothing behind.
    pub fn take_check(&self, path: &Path) -> Option<DateTime<Utc>> {
        let mut state = self.state.lock();
        let taken = state.checks.remove(path)?;
        if state.earliest == Some(taken) {
            state.earliest = state.checks.values().min().copied();
        }
        trace!(path = %path.display(), at = %taken, earliest = ?state.earliest, "Took registered check");
        Some(taken)
    }

    /// Drop every entry due at or before `cutoff`; returns how many went
    pub fn forget_elapsed(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.state.lock();
        let before = state.checks.len();
        state.checks.retain(|_, at| *at > cutoff);
        let removed = before - state.checks.len();
        if removed > 0 {
            state.earliest = state.checks.values().min().copied();
            trace!(removed = removed, earliest = ?state.earliest, "Forgot elapsed checks");
        }
        removed
    }

    /// Earliest registered check time, if any
    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.state.lock().earliest
    }

    /// Point-in-time copy of every registered (path, time) pair
    pub fn snapshot_all(&self) -> Vec<(PathBuf, DateTime<Utc>)> {
        self.state
            .lock()
            .checks
            .iter()
            .map(|(path, at)| (path.clone(), *at))
            .collect()
    }

    /// Scheduled time for one path
    pub fn check_for(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.state.lock().checks.get(path).copied()
    }

    /// Coalesce a forced-sweep request: latest time wins, `full` is sticky
    pub fn record_forced(&self, request: ForcedSweep) {
        let mut state = self.state.lock();
        let merged = match state.forced {
            Some(pending) => ForcedSweep {
                at: pending.at.max(request.at),
                full: pending.full || request.full,
            },
            None => request,
        };
        state.forced = Some(merged);
        trace!(at = %merged.at, full = merged.full, "Recorded forced sweep request");
    }

    /// Pending forced sweep, left in place
    pub fn check_forced_sweep(&self) -> Option<ForcedSweep> {
        self.state.lock().forced
    }

    /// Clear the pending request unless a newer one arrived after `at`
    pub fn clear_forced_sweep_if_at_or_before(&self, at: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        match state.forced {
            Some(pending) if pending.at <= at => {
                state.forced = None;
                trace!(at = %pending.at, "Cleared forced sweep request");
                true
            }
            _ => false,
        }
    }
}
