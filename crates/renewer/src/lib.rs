//! OCSP staple renewer
//!
//! Keeps OCSP staples for a set of certificates fresh, either in a single
//! pass ([`Renewer::one_shot`]) or forever ([`Scheduler::run`]).
//!
//! # Architecture
//!
//! - [`cert`]: certificate files and the fields the renewer needs
//! - [`ocsp`]: OCSP request and response encoding
//! - [`issuer`]: finding the issuing certificate
//! - [`store`]: staple paths and atomic writes
//! - [`timers`]: next-check times and forced-sweep coalescing
//! - [`timing`]: when a staple is stale enough to renew
//! - [`fetch`]: talking to OCSP responders
//! - [`renewal`]: one certificate's renewal
//! - [`sweep`]: one pass over every input
//! - [`scheduler`]: the persistent loop
//! - [`signals`]: OS signals to forced sweeps

pub mod cert;
pub mod error;
pub mod fetch;
pub mod issuer;
pub mod ocsp;
pub mod renewal;
pub mod renewer;
pub mod scheduler;
pub mod signals;
pub mod store;
pub mod sweep;
pub mod timers;
pub mod timing;

pub use error::RenewError;
pub use renewal::{CertRenewal, RenewalOutcome};
pub use renewer::Renewer;
pub use scheduler::{Scheduler, SchedulerState};
pub use sweep::SweepSummary;
pub use timers::{ForcedSweep, TimerRegistry};

pub use ocsprenewer_config::Config;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod testutil;
