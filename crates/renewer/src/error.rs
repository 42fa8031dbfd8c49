//! Error types for renewal and sweeps

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cert::CertError;
use crate::ocsp::OcspError;
use crate::store::StorageError;

/// Errors raised while renewing a certificate's staple or sweeping inputs
#[derive(Error, Debug)]
pub enum RenewError {
    #[error("certificate {path} is flagged with a .noocsp file")]
    NoOcspFlagFile { path: PathBuf },

    #[error("certificate {label} carries no OCSP responder URL")]
    NoOcspInCert { label: String },

    #[error("certificate {label} expired at {not_after}")]
    CertExpired {
        label: String,
        not_after: DateTime<Utc>,
    },

    #[error("no issuer certificate found for {label}")]
    NoIssuer { label: String },

    #[error(transparent)]
    Cert(#[from] CertError),

    #[error(transparent)]
    Ocsp(#[from] OcspError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to inspect {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("OCSP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OCSP responder {url} answered HTTP {status}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Raw response body, kept for diagnostics
        body: Vec<u8>,
    },

    #[error("certificate {label} was revoked at {revoked_at}")]
    Revoked {
        label: String,
        revoked_at: DateTime<Utc>,
    },

    #[error("OCSP responder {url} does not know certificate {label}")]
    UnknownAtResponder { label: String, url: String },

    #[error("OCSP responder {url} asked us to try later")]
    TryLater { url: String },

    #[error("OCSP problem: {0}")]
    OcspProblem(String),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("no certificates found in directory {dir}")]
    NoCertsFound { dir: PathBuf },

    #[error("{path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("{path} is not a regular file")]
    NotARegularFile { path: PathBuf },

    #[error("output directory {dir} is not writable: {source}")]
    OutputNotWritable {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{failed} certificate source(s) failed during the sweep")]
    SweepFailed { failed: usize },

    #[error("the persistent scheduler is already running")]
    SchedulerAlreadyRunning,
}

impl RenewError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
