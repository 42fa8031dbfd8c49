//! Issuer resolution
//!
//! An OCSP request names the certificate by its issuer's name and key, so
//! every renewal needs the issuing certificate. It is taken from PEM data
//! trailing the leaf in its own file when present, otherwise from an
//! [`IssuerLookup`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use ocsprenewer_config::Config;

use crate::cert::{load_certificate_file, CertInfo, MAX_CERT_FILE_SIZE};

/// Finds the issuer of a certificate loaded from `cert_path`
pub trait IssuerLookup: Send + Sync {
    fn find_issuer(&self, cert_path: &Path, cert: &CertInfo) -> Option<CertInfo>;
}

/// Issuer from the PEM data following the leaf in its file
///
/// The hint is only trusted if its subject is the leaf's issuer name.
pub fn issuer_from_hint(rest: &[u8], cert: &CertInfo) -> Option<CertInfo> {
    if rest.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    match CertInfo::from_pem(rest) {
        Ok(candidate) if cert.is_issued_by(&candidate) => {
            trace!(label = %cert.label(), issuer = %candidate.label(), "Issuer taken from trailing PEM");
            Some(candidate)
        }
        Ok(candidate) => {
            debug!(
                label = %cert.label(),
                candidate = %candidate.label(),
                expected = %cert.issuer_dn(),
                "Trailing certificate is not the issuer, ignoring it"
            );
            None
        }
        Err(e) => {
            debug!(label = %cert.label(), error = %e, "Ignoring unparsable trailing PEM data");
            None
        }
    }
}

/// Sidecar files next to the certificate: `<stem><suffix>`
///
/// `www.crt` with suffix `.issuer.pem` looks for `www.issuer.pem`. These are
/// the same suffixes directory scans exclude.
#[derive(Debug, Clone)]
pub struct SidecarIssuers {
    cert_extensions: Vec<String>,
    suffixes: Vec<String>,
}

impl SidecarIssuers {
    pub fn new(config: &Config) -> Self {
        Self {
            cert_extensions: config.cert_extension_list().map(str::to_string).collect(),
            suffixes: config
                .exclude_suffixes
                .iter()
                .filter(|suffix| !suffix.is_empty())
                .cloned()
                .collect(),
        }
    }

    fn candidates(&self, cert_path: &Path) -> Vec<PathBuf> {
        let Some(file_name) = cert_path.file_name().and_then(|name| name.to_str()) else {
            return Vec::new();
        };

        let stem = self
            .cert_extensions
            .iter()
            .find_map(|ext| file_name.strip_suffix(ext.as_str()))
            .filter(|stem| !stem.is_empty())
            .unwrap_or(file_name);

        self.suffixes
            .iter()
            .map(|suffix| cert_path.with_file_name(format!("{}{}", stem, suffix)))
            .filter(|candidate| candidate != cert_path)
            .collect()
    }
}

impl IssuerLookup for SidecarIssuers {
    fn find_issuer(&self, cert_path: &Path, cert: &CertInfo) -> Option<CertInfo> {
        for candidate in self.candidates(cert_path) {
            if !candidate.is_file() {
                continue;
            }
            match load_certificate_file(&candidate) {
                Ok(loaded) if cert.is_issued_by(&loaded.cert) => {
                    debug!(
                        label = %cert.label(),
                        issuer_file = %candidate.display(),
                        "Using issuer sidecar file"
                    );
                    return Some(loaded.cert);
                }
                Ok(_) => {
                    warn!(
                        label = %cert.label(),
                        issuer_file = %candidate.display(),
                        "Sidecar certificate is not this certificate's issuer"
                    );
                }
                Err(e) => {
                    warn!(
                        label = %cert.label(),
                        issuer_file = %candidate.display(),
                        error = %e,
                        "Failed to load issuer sidecar file"
                    );
                }
            }
        }
        None
    }
}

/// Issuer certificates loaded once from a set of directories
#[derive(Debug, Default)]
pub struct IssuerDirectory {
    by_subject: HashMap<Vec<u8>, CertInfo>,
}

impl IssuerDirectory {
    /// Load every PEM certificate found directly inside `dirs`
    ///
    /// Unreadable entries are logged and skipped.
    pub fn load(dirs: &[PathBuf]) -> Self {
        let mut directory = Self::default();
        for dir in dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Cannot read issuer directory");
                    continue;
                }
            };
            for entry in entries.filter_map(Result::ok) {
                directory.load_file(&entry.path());
            }
        }
        debug!(issuers = directory.len(), "Loaded issuer directory");
        directory
    }

    fn load_file(&mut self, path: &Path) {
        let Ok(meta) = fs::metadata(path) else {
            return;
        };
        if !meta.is_file() || meta.len() > MAX_CERT_FILE_SIZE {
            trace!(path = %path.display(), "Skipping issuer directory entry");
            return;
        }

        let blocks = match fs::read(path).map(|data| pem::parse_many(data)) {
            Ok(Ok(blocks)) => blocks,
            _ => {
                trace!(path = %path.display(), "Not a PEM file");
                return;
            }
        };

        for block in blocks.into_iter().filter(|b| b.tag() == "CERTIFICATE") {
            match CertInfo::from_der(block.into_contents()) {
                Ok(info) => self.insert(info),
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping bad issuer certificate"),
            }
        }
    }

    pub fn insert(&mut self, issuer: CertInfo) {
        trace!(issuer = %issuer.label(), "Indexed issuer certificate");
        self.by_subject.insert(issuer.subject_raw().to_vec(), issuer);
    }

    pub fn len(&self) -> usize {
        self.by_subject.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_subject.is_empty()
    }
}

impl IssuerLookup for IssuerDirectory {
    fn find_issuer(&self, _cert_path: &Path, cert: &CertInfo) -> Option<CertInfo> {
        let issuer = self.by_subject.get(cert.issuer_raw())?;
        debug!(label = %cert.label(), issuer = %issuer.label(), "Using issuer from issuer directory");
        Some(issuer.clone())
    }
}

/// Lookups tried in order until one finds the issuer
#[derive(Default)]
pub struct IssuerChain {
    lookups: Vec<Box<dyn IssuerLookup>>,
}

impl IssuerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sidecar files first, then the configured issuer directories
    pub fn from_config(config: &Config) -> Self {
        let mut chain = Self::new().with(SidecarIssuers::new(config));
        if !config.issuer_dirs.is_empty() {
            chain = chain.with(IssuerDirectory::load(&config.issuer_dirs));
        }
        chain
    }

    pub fn with(mut self, lookup: impl IssuerLookup + 'static) -> Self {
        self.lookups.push(Box::new(lookup));
        self
    }
}

impl IssuerLookup for IssuerChain {
    fn find_issuer(&self, cert_path: &Path, cert: &CertInfo) -> Option<CertInfo> {
        self.lookups
            .iter()
            .find_map(|lookup| lookup.find_issuer(cert_path, cert))
            .filter(|issuer| cert.is_issued_by(issuer))
    }
}

impl std::fmt::Debug for IssuerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerChain")
            .field("lookups", &self.lookups.len())
            .finish()
    }
}
