//! Persistent renewal loop
//!
//! Runs sweeps forever. Between sweeps it waits for the earliest registered
//! check time or a forced-sweep request, whichever comes first. Passes that
//! leave an already elapsed timer behind, or that fail, are followed by a
//! safety pause whose length doubles up to an hour so a broken certificate
//! cannot make the loop spin.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ocsprenewer_common::Backoff;

use crate::error::RenewError;
use crate::renewer::Renewer;
use crate::timers::ForcedSweep;

/// First safety pause after an unclean timer sweep
pub const SPIN_BACKOFF_FLOOR: Duration = Duration::from_secs(30);

/// Longest safety pause
pub const SPIN_BACKOFF_CEILING: Duration = Duration::from_secs(3600);

/// How long to wait when no timer is registered
pub const IDLE_FALLBACK: Duration = Duration::from_secs(3600);

/// Scheduler states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Deciding what to do next
    Idle,
    /// Run a sweep for this request, then clear it
    ForcedSweepPending(ForcedSweep),
    /// A registered check time has arrived
    TimerSweep,
    /// Wait before looking at timers again
    SafetyPause(Duration),
}

/// What the idle state decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePlan {
    Forced(ForcedSweep),
    SweepNow,
    /// Sleep this long unless a request arrives
    Wait(Duration),
}

/// Plan from the registry's view at `now`
pub fn plan_idle(
    now: DateTime<Utc>,
    earliest: Option<DateTime<Utc>>,
    forced: Option<ForcedSweep>,
) -> IdlePlan {
    if let Some(request) = forced {
        return IdlePlan::Forced(request);
    }
    match earliest {
        None => IdlePlan::Wait(IDLE_FALLBACK),
        Some(at) if at <= now => IdlePlan::SweepNow,
        Some(at) => IdlePlan::Wait((at - now).to_std().unwrap_or(Duration::ZERO)),
    }
}

/// A timer sweep is clean when it succeeded and left no elapsed timer
pub fn timer_sweep_is_clean(
    sweep_ok: bool,
    earliest_after: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    sweep_ok && earliest_after.map_or(true, |at| at > now)
}

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Elapsed,
    Requested,
}

/// Background scheduler driving [`Renewer::one_shot`]
pub struct Scheduler {
    renewer: Arc<Renewer>,
    requests: mpsc::Receiver<ForcedSweep>,
    backoff: Backoff,
}

impl Scheduler {
    /// Create the scheduler; only one may exist per renewer
    pub fn new(renewer: Arc<Renewer>) -> Result<Self, RenewError> {
        let requests = renewer.take_force_receiver()?;
        Ok(Self {
            renewer,
            requests,
            backoff: Backoff::new(SPIN_BACKOFF_FLOOR, SPIN_BACKOFF_CEILING),
        })
    }

    /// Run forever
    ///
    /// Enables timers, runs the start-up sweep with the configured
    /// `immediate` flag, then steps the state machine.
    pub async fn run(mut self) {
        let immediate = self.renewer.config().immediate;
        info!(immediate = immediate, "Starting persistent renewal loop");

        self.renewer.enable_timers();
        if let Err(e) = self.renewer.one_shot(immediate).await {
            warn!(error = %e, "Start-up sweep failed");
        }

        let mut state = SchedulerState::Idle;
        loop {
            state = self.step(state).await;
        }
    }

    /// Perform one state's entry behaviour and return the next state
    pub async fn step(&mut self, state: SchedulerState) -> SchedulerState {
        match state {
            SchedulerState::Idle => {
                let registry = self.renewer.registry();
                let plan = plan_idle(
                    Utc::now(),
                    registry.earliest(),
                    registry.check_forced_sweep(),
                );
                match plan {
                    IdlePlan::Forced(request) => SchedulerState::ForcedSweepPending(request),
                    IdlePlan::SweepNow => SchedulerState::TimerSweep,
                    IdlePlan::Wait(duration) => {
                        debug!(wait_secs = duration.as_secs(), "Waiting for next check");
                        match self.wait(duration).await {
                            Wake::Elapsed => SchedulerState::TimerSweep,
                            Wake::Requested => SchedulerState::Idle,
                        }
                    }
                }
            }
            SchedulerState::ForcedSweepPending(request) => {
                info!(full = request.full, requested_at = %request.at, "Running forced sweep");
                if let Err(e) = self.renewer.one_shot(request.full).await {
                    warn!(error = %e, "Forced sweep failed");
                }
                self.renewer
                    .registry()
                    .clear_forced_sweep_if_at_or_before(request.at);
                SchedulerState::Idle
            }
            SchedulerState::TimerSweep => {
                debug!("Running timer sweep");
                let result = self.renewer.one_shot(false).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Timer sweep failed");
                }

                let clean = timer_sweep_is_clean(
                    result.is_ok(),
                    self.renewer.registry().earliest(),
                    Utc::now(),
                );
                if clean {
                    self.backoff.reset();
                    SchedulerState::Idle
                } else {
                    SchedulerState::SafetyPause(self.backoff.next_delay())
                }
            }
            SchedulerState::SafetyPause(duration) => {
                warn!(pause_secs = duration.as_secs(), "Pausing before next timer sweep");
                self.wait(duration).await;
                SchedulerState::Idle
            }
        }
    }

    /// Sleep for `duration` or until a forced-sweep request arrives
    async fn wait(&mut self, duration: Duration) -> Wake {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Wake::Elapsed,
            Some(request) = self.requests.recv() => {
                debug!(full = request.full, "Woken by forced sweep request");
                Wake::Requested
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("backoff", &self.backoff)
            .finish()
    }
}
