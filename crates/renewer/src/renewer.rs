//! Process-wide renewer state
//!
//! One [`Renewer`] exists per process. It owns the validated configuration,
//! the dry-run permits, the action ID sequence, the timer registry and the
//! forced-sweep queue, and is shared by reference (usually behind an `Arc`)
//! between the scheduler and the signal forwarder.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use ocsprenewer_common::{ActionId, ActionIdSequence};
use ocsprenewer_config::Config;

use crate::error::RenewError;
use crate::fetch::OcspFetcher;
use crate::issuer::{IssuerChain, IssuerLookup};
use crate::store::StapleStore;
use crate::timers::{ForcedSweep, TimerRegistry};

/// Capacity of the forced-sweep queue
pub const FORCE_QUEUE_CAPACITY: usize = 8;

/// Shared renewer context
pub struct Renewer {
    config: Config,
    globs: Vec<String>,
    permit_remote: AtomicBool,
    permit_writes: AtomicBool,
    action_ids: ActionIdSequence,
    registry: TimerRegistry,
    store: StapleStore,
    issuers: Box<dyn IssuerLookup>,
    fetcher: OcspFetcher,
    force_tx: mpsc::Sender<ForcedSweep>,
    force_rx: Mutex<Option<mpsc::Receiver<ForcedSweep>>>,
}

impl Renewer {
    /// Build a renewer from a validated configuration
    pub fn new(config: Config) -> Result<Self, RenewError> {
        let globs = config.cert_globs();
        let (force_tx, force_rx) = mpsc::channel(FORCE_QUEUE_CAPACITY);

        let renewer = Self {
            globs,
            permit_remote: AtomicBool::new(true),
            permit_writes: AtomicBool::new(true),
            action_ids: ActionIdSequence::new(),
            registry: TimerRegistry::new(),
            store: StapleStore::new(&config),
            issuers: Box::new(IssuerChain::from_config(&config)),
            fetcher: OcspFetcher::new(&config.http_user_agent)?,
            force_tx,
            force_rx: Mutex::new(Some(force_rx)),
            config,
        };

        debug!(
            inputs = renewer.config.input_paths.len(),
            globs = ?renewer.globs,
            output_dir = %renewer.config.output_dir.display(),
            "Created renewer"
        );
        Ok(renewer)
    }

    /// Replace the issuer lookup
    pub fn with_issuer_lookup(mut self, lookup: impl IssuerLookup + 'static) -> Self {
        self.issuers = Box::new(lookup);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Glob patterns used when scanning directories
    pub fn globs(&self) -> &[String] {
        &self.globs
    }

    pub fn registry(&self) -> &TimerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &StapleStore {
        &self.store
    }

    pub(crate) fn issuers(&self) -> &dyn IssuerLookup {
        self.issuers.as_ref()
    }

    pub(crate) fn fetcher(&self) -> &OcspFetcher {
        &self.fetcher
    }

    pub fn next_action_id(&self) -> ActionId {
        self.action_ids.next_id()
    }

    /// Allow or forbid OCSP requests
    pub fn set_permit_remote(&self, permit: bool) {
        self.permit_remote.store(permit, Ordering::Relaxed);
    }

    /// Allow or forbid staple writes
    pub fn set_permit_writes(&self, permit: bool) {
        self.permit_writes.store(permit, Ordering::Relaxed);
    }

    /// Dry run: neither fetch nor write
    pub fn set_not_really(&self, not_really: bool) {
        self.set_permit_remote(!not_really);
        self.set_permit_writes(!not_really);
        if not_really {
            info!("Dry run: no OCSP requests will be made and no staples written");
        }
    }

    pub fn permit_remote(&self) -> bool {
        self.permit_remote.load(Ordering::Relaxed)
    }

    pub fn permit_writes(&self) -> bool {
        self.permit_writes.load(Ordering::Relaxed)
    }

    /// Start registering next-check times; only the persistent loop needs them
    pub fn enable_timers(&self) {
        self.registry.enable_timers();
    }

    /// Ask for an out-of-band sweep, `full` treating every certificate as due
    ///
    /// Never blocks. The request is coalesced in the registry first, so a
    /// full queue only drops a redundant wake-up.
    pub fn force_sweep(&self, full: bool) {
        let request = ForcedSweep {
            at: Utc::now(),
            full,
        };
        self.registry.record_forced(request);

        match self.force_tx.try_send(request) {
            Ok(()) => trace!(full = full, "Queued forced sweep"),
            Err(e) => trace!(full = full, error = %e, "Forced sweep queue full; request coalesced"),
        }
    }

    /// Hand the forced-sweep receiver to the one scheduler that may run
    pub(crate) fn take_force_receiver(&self) -> Result<mpsc::Receiver<ForcedSweep>, RenewError> {
        self.force_rx
            .lock()
            .take()
            .ok_or(RenewError::SchedulerAlreadyRunning)
    }

    /// Start-up checks: the output directory must be writable
    pub fn basic_checks(&self) -> Result<(), RenewError> {
        let dir = &self.config.output_dir;
        let probe = NamedTempFile::new_in(dir).map_err(|source| RenewError::OutputNotWritable {
            dir: dir.clone(),
            source,
        })?;
        probe.close().map_err(|source| RenewError::OutputNotWritable {
            dir: dir.clone(),
            source,
        })?;

        debug!(output_dir = %dir.display(), "Output directory is writable");
        Ok(())
    }
}

impl std::fmt::Debug for Renewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renewer")
            .field("config", &self.config)
            .field("permit_remote", &self.permit_remote())
            .field("permit_writes", &self.permit_writes())
            .finish()
    }
}
