//! Signal handling for forced sweeps and shutdown.
//!
//! Bridges OS signals into [`Renewer::force_sweep`] from a dedicated thread:
//! SIGHUP and SIGUSR1 request a normal sweep, SIGUSR2 a full one, and
//! SIGTERM/SIGINT exit the process.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use tracing::{debug, info};

use crate::renewer::Renewer;

/// Pause after forwarding a request, so a signal storm cannot flood the queue
pub const FORWARD_PAUSE: Duration = Duration::from_millis(100);

/// What a received signal asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Forced sweep; `full` renews every certificate
    Sweep { full: bool },
    Shutdown,
    Ignore,
}

/// Map a signal number to its action
pub fn action_for(signal: i32) -> SignalAction {
    match signal {
        SIGHUP | SIGUSR1 => SignalAction::Sweep { full: false },
        SIGUSR2 => SignalAction::Sweep { full: true },
        SIGTERM | SIGINT => SignalAction::Shutdown,
        _ => SignalAction::Ignore,
    }
}

/// Start the thread forwarding signals to `renewer`
pub fn spawn_signal_forwarder(renewer: Arc<Renewer>) -> std::io::Result<thread::JoinHandle<()>> {
    let mut signals = Signals::new([SIGHUP, SIGUSR1, SIGUSR2, SIGTERM, SIGINT])?;
    debug!("Registered signal handlers");

    thread::Builder::new()
        .name("signal-forwarder".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                match action_for(signal) {
                    SignalAction::Sweep { full } => {
                        info!(signal = signal, full = full, "Signal received, forcing sweep");
                        renewer.force_sweep(full);
                        thread::sleep(FORWARD_PAUSE);
                    }
                    SignalAction::Shutdown => {
                        info!(signal = signal, "Received shutdown signal, exiting");
                        std::process::exit(0);
                    }
                    SignalAction::Ignore => {}
                }
            }
        })
}
