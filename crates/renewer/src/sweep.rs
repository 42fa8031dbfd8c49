//! One pass over every configured input
//!
//! Direct files are renewed as given. Directories are expanded through the
//! certificate globs; `.noocsp` flag files and excluded suffixes drop
//! candidates before they count as tried. Failures are logged with full
//! detail as they happen and only their number is returned.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use ocsprenewer_common::ActionId;

use crate::cert::load_certificate_file;
use crate::error::RenewError;
use crate::renewal::{CertRenewal, RenewalOutcome};
use crate::renewer::Renewer;

/// Extension of the flag file that suppresses a certificate
pub const NO_OCSP_FLAG_EXTENSION: &str = ".noocsp";

/// Tally of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Fresh staples fetched
    pub renewed: usize,
    /// Existing staples still fresh
    pub not_due: usize,
    /// Candidates skipped by flag file, suffix or missing OCSP information
    pub skipped: usize,
    /// Renewals stopped by the dry-run permits
    pub dry_run: usize,
    /// Certificates or inputs that failed
    pub failed: usize,
}

impl SweepSummary {
    fn record(&mut self, outcome: &RenewalOutcome) {
        match outcome {
            RenewalOutcome::NotDue { .. } => self.not_due += 1,
            RenewalOutcome::DryRun | RenewalOutcome::Renewed { written: false, .. } => {
                self.dry_run += 1
            }
            RenewalOutcome::Renewed { written: true, .. } => self.renewed += 1,
        }
    }
}

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    File,
    Directory,
}

/// The `.noocsp` flag file for a certificate
pub fn no_ocsp_flag_path(cert_path: &Path) -> PathBuf {
    let mut flag = cert_path.as_os_str().to_os_string();
    flag.push(NO_OCSP_FLAG_EXTENSION);
    PathBuf::from(flag)
}

impl Renewer {
    /// Sweep every input once
    ///
    /// `immediate` renews regardless of existing staples. Returns an error
    /// carrying the failure count if anything failed.
    pub async fn one_shot(&self, immediate: bool) -> Result<SweepSummary, RenewError> {
        let mut summary = SweepSummary::default();
        let directories = self.config().directories;
        let started = Utc::now();

        info!(
            inputs = self.config().input_paths.len(),
            immediate = immediate,
            "Starting sweep"
        );

        for input in &self.config().input_paths {
            let result = if directories {
                self.sweep_directory(input, immediate, &mut summary).await
            } else {
                self.sweep_candidate(input, Source::File, immediate, &mut summary)
                    .await;
                Ok(())
            };

            if let Err(e) = result {
                warn!(path = %input.display(), error = %e, "Input failed");
                summary.failed += 1;
            }
        }

        // Whatever was due before the pass and is still registered belongs
        // to a certificate the pass no longer reached
        let forgotten = self.registry().forget_elapsed(started);
        if forgotten > 0 {
            debug!(forgotten = forgotten, "Dropped checks for certificates no longer swept");
        }

        if summary.failed > 0 {
            error!(
                failed = summary.failed,
                renewed = summary.renewed,
                not_due = summary.not_due,
                skipped = summary.skipped,
                "Sweep finished with failures"
            );
            return Err(RenewError::SweepFailed {
                failed: summary.failed,
            });
        }

        info!(
            renewed = summary.renewed,
            not_due = summary.not_due,
            skipped = summary.skipped,
            dry_run = summary.dry_run,
            "Sweep finished"
        );
        Ok(summary)
    }

    async fn sweep_directory(
        &self,
        dir: &Path,
        immediate: bool,
        summary: &mut SweepSummary,
    ) -> Result<(), RenewError> {
        let meta = fs::metadata(dir).map_err(|e| RenewError::io(dir, e))?;
        if !meta.is_dir() {
            return Err(RenewError::NotADirectory {
                path: dir.to_path_buf(),
            });
        }

        let mut tried = 0usize;
        for candidate in self.expand_directory(dir)? {
            let Some(file_name) = candidate.file_name().and_then(|name| name.to_str()) else {
                continue;
            };

            if self.config().is_excluded(file_name) {
                debug!(path = %candidate.display(), "Excluded by suffix");
                summary.skipped += 1;
                continue;
            }
            if no_ocsp_flag_path(&candidate).exists() {
                debug!(path = %candidate.display(), "Skipping certificate flagged .noocsp");
                summary.skipped += 1;
                continue;
            }

            tried += 1;
            self.sweep_candidate(&candidate, Source::Directory, immediate, summary)
                .await;
        }

        if tried == 0 {
            return Err(RenewError::NoCertsFound {
                dir: dir.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Regular files in `dir` matching any certificate glob, sorted
    fn expand_directory(&self, dir: &Path) -> Result<BTreeSet<PathBuf>, RenewError> {
        let escaped = glob::Pattern::escape(&dir.to_string_lossy());
        let mut found = BTreeSet::new();

        for pattern in self.globs() {
            let full = format!("{}/{}", escaped.trim_end_matches('/'), pattern);
            for entry in glob::glob(&full)? {
                match entry {
                    Ok(path) if path.is_file() => {
                        found.insert(path);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(pattern = %full, error = %e, "Unreadable glob match"),
                }
            }
        }

        debug!(dir = %dir.display(), candidates = found.len(), "Expanded directory");
        Ok(found)
    }

    /// Load and renew one candidate, recording the result
    async fn sweep_candidate(
        &self,
        path: &Path,
        source: Source,
        immediate: bool,
        summary: &mut SweepSummary,
    ) {
        let action_id = self.next_action_id();

        match self.renew_path(action_id, path, source, immediate).await {
            Ok(Some(outcome)) => summary.record(&outcome),
            Ok(None) => summary.skipped += 1,
            Err(e) => {
                warn!(
                    action_id = %action_id,
                    path = %path.display(),
                    error = %e,
                    "Renewal failed"
                );
                summary.failed += 1;
            }
        }
    }

    /// `Ok(None)` means the candidate was skipped without error
    async fn renew_path(
        &self,
        action_id: ActionId,
        path: &Path,
        source: Source,
        immediate: bool,
    ) -> Result<Option<RenewalOutcome>, RenewError> {
        if source == Source::File {
            if no_ocsp_flag_path(path).exists() {
                return Err(RenewError::NoOcspFlagFile {
                    path: path.to_path_buf(),
                });
            }
            let meta = fs::metadata(path).map_err(|e| RenewError::io(path, e))?;
            if !meta.is_file() {
                return Err(RenewError::NotARegularFile {
                    path: path.to_path_buf(),
                });
            }
        }

        let loaded = load_certificate_file(path)?;

        if loaded.cert.ocsp_urls().is_empty() {
            if source == Source::Directory && self.config().allow_non_ocsp_in_dir {
                debug!(
                    action_id = %action_id,
                    path = %path.display(),
                    label = %loaded.cert.label(),
                    "No OCSP information, skipping"
                );
                return Ok(None);
            }
            return Err(RenewError::NoOcspInCert {
                label: loaded.cert.label().to_string(),
            });
        }

        debug!(
            action_id = %action_id,
            path = %path.display(),
            label = %loaded.cert.label(),
            "Checking certificate"
        );

        let outcome = CertRenewal::new(self, action_id, path, loaded)?
            .run(immediate)
            .await?;
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use ocsprenewer_config::Config;
    use tempfile::TempDir;

    fn renewer(config: Config) -> Renewer {
        Renewer::new(config.validate().unwrap()).unwrap()
    }

    fn dir_config(out: &TempDir, inputs: Vec<PathBuf>) -> Config {
        Config {
            directories: true,
            output_dir: out.path().to_path_buf(),
            input_paths: inputs,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_ocsp_flag_path() {
        assert_eq!(
            no_ocsp_flag_path(Path::new("/ssl/www.crt")),
            PathBuf::from("/ssl/www.crt.noocsp")
        );
    }

    #[tokio::test]
    async fn test_all_excluded_is_no_certs_found() {
        let out = TempDir::new().unwrap();
        let certs = TempDir::new().unwrap();
        let cert = testutil::generate_cert("www.example.com", Some("http://127.0.0.1:9"));
        let flagged = testutil::write_cert_file(certs.path(), "www.crt", &cert);
        std::fs::write(no_ocsp_flag_path(&flagged), b"").unwrap();
        testutil::write_cert_file(certs.path(), "www.issuer.pem", &cert);

        let renewer = renewer(dir_config(&out, vec![certs.path().to_path_buf()]));
        let mut summary = SweepSummary::default();
        let err = renewer
            .sweep_directory(certs.path(), true, &mut summary)
            .await
            .unwrap_err();
        assert!(matches!(err, RenewError::NoCertsFound { .. }));
        assert_eq!(summary.skipped, 2);

        assert!(matches!(
            renewer.one_shot(true).await,
            Err(RenewError::SweepFailed { failed: 1 })
        ));
    }

    #[tokio::test]
    async fn test_empty_directory_is_no_certs_found() {
        let out = TempDir::new().unwrap();
        let certs = TempDir::new().unwrap();
        std::fs::write(certs.path().join("README"), "nothing here").unwrap();

        let renewer = renewer(dir_config(&out, vec![certs.path().to_path_buf()]));
        let mut summary = SweepSummary::default();
        assert!(matches!(
            renewer.sweep_directory(certs.path(), true, &mut summary).await,
            Err(RenewError::NoCertsFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_tolerated_missing_ocsp_in_directory() {
        let out = TempDir::new().unwrap();
        let certs = TempDir::new().unwrap();
        let cert = testutil::generate_cert("plain.example.com", None);
        testutil::write_cert_file(certs.path(), "plain.pem", &cert);

        let mut config = dir_config(&out, vec![certs.path().to_path_buf()]);
        config.allow_non_ocsp_in_dir = true;
        let summary = renewer(config).one_shot(true).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);

        // Without the tolerance flag the same certificate fails
        let config = dir_config(&out, vec![certs.path().to_path_buf()]);
        assert!(matches!(
            renewer(config).one_shot(true).await,
            Err(RenewError::SweepFailed { failed: 1 })
        ));
    }

    #[tokio::test]
    async fn test_file_mode_errors() {
        let out = TempDir::new().unwrap();
        let certs = TempDir::new().unwrap();
        let cert = testutil::generate_cert("www.example.com", Some("http://127.0.0.1:9"));
        let flagged = testutil::write_cert_file(certs.path(), "www.crt", &cert);
        std::fs::write(no_ocsp_flag_path(&flagged), b"").unwrap();

        let renewer = renewer(Config {
            output_dir: out.path().to_path_buf(),
            input_paths: vec![flagged.clone()],
            ..Default::default()
        });

        assert!(matches!(
            renewer.renew_path(renewer.next_action_id(), &flagged, Source::File, true).await,
            Err(RenewError::NoOcspFlagFile { .. })
        ));
        assert!(matches!(
            renewer.renew_path(renewer.next_action_id(), certs.path(), Source::File, true).await,
            Err(RenewError::NotARegularFile { .. })
        ));
        assert!(matches!(
            renewer
                .renew_path(renewer.next_action_id(), &certs.path().join("missing.crt"), Source::File, true)
                .await,
            Err(RenewError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_sweep_drops_checks_of_vanished_certificates() {
        let out = TempDir::new().unwrap();
        let certs = TempDir::new().unwrap();
        let cert = testutil::generate_cert("www.example.com", Some("http://127.0.0.1:9"));
        testutil::write_cert_file(certs.path(), "www.crt", &cert);

        let renewer = renewer(dir_config(&out, vec![certs.path().to_path_buf()]));
        renewer.enable_timers();
        renewer.set_not_really(true);
        let gone = certs.path().join("gone.crt");
        let later = Utc::now() + chrono::Duration::hours(2);
        renewer
            .registry()
            .register_future_check(&gone, Utc::now() - chrono::Duration::seconds(5));
        renewer
            .registry()
            .register_future_check(Path::new("/elsewhere/later.crt"), later);

        renewer.one_shot(false).await.unwrap();
        assert_eq!(renewer.registry().check_for(&gone), None);
        assert_eq!(renewer.registry().earliest(), Some(later));
    }

    #[tokio::test]
    async fn test_missing_directory_counts_as_failure() {
        let out = TempDir::new().unwrap();
        let renewer = renewer(dir_config(&out, vec![PathBuf::from("/nonexistent/certs")]));
        assert!(matches!(
            renewer.one_shot(false).await,
            Err(RenewError::SweepFailed { failed: 1 })
        ));
    }

    #[tokio::test]
    async fn test_dry_run_counts() {
        let out = TempDir::new().unwrap();
        let certs = TempDir::new().unwrap();
        let cert = testutil::generate_cert("www.example.com", Some("http://127.0.0.1:9"));
        testutil::write_cert_file(certs.path(), "www.crt", &cert);
        testutil::write_cert_file(certs.path(), "mail.pem", &cert);

        let renewer = renewer(dir_config(&out, vec![certs.path().to_path_buf()]));
        renewer.set_not_really(true);
        let summary = renewer.one_shot(true).await.unwrap();
        assert_eq!(summary.dry_run, 2);
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
