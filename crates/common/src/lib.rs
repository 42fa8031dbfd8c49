//! Shared building blocks for the OCSP renewer crates.

pub mod backoff;
pub mod ids;

pub use backoff::Backoff;
pub use ids::{ActionId, ActionIdSequence};
