//! Per-certificate renewal
//!
//! A [`CertRenewal`] walks one certificate through
//! locate, check existing staple, decide, resolve issuer, fetch, classify
//! and write. Every log line carries the attempt's action ID.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use ocsprenewer_common::ActionId;

use crate::cert::{CertInfo, LoadedCert};
use crate::error::RenewError;
use crate::fetch::FetchOutcome;
use crate::issuer::issuer_from_hint;
use crate::ocsp::{self, OcspReply, StapleInfo};
use crate::renewer::Renewer;
use crate::timing::{self, Due, TRY_LATER_RETRY};

/// What a successful renewal attempt amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// The existing staple is fresh enough
    NotDue { next_check: DateTime<Utc> },
    /// Network calls are not permitted
    DryRun,
    /// A good staple was fetched; `written` is false when writes are off
    Renewed {
        staple_path: PathBuf,
        written: bool,
        next_check: DateTime<Utc>,
    },
}

/// One certificate's pass through the renewal state machine
#[derive(Debug)]
pub struct CertRenewal<'a> {
    renewer: &'a Renewer,
    action_id: ActionId,
    path: PathBuf,
    cert: CertInfo,
    hint: Vec<u8>,
    staple_path: PathBuf,
    existing: Option<Vec<u8>>,
    existing_info: Option<StapleInfo>,
}

impl<'a> CertRenewal<'a> {
    /// Locate and parse the certificate's existing staple
    pub fn new(
        renewer: &'a Renewer,
        action_id: ActionId,
        path: &Path,
        loaded: LoadedCert,
    ) -> Result<Self, RenewError> {
        let LoadedCert { cert, rest } = loaded;
        let staple_path = renewer.store().staple_path(path)?;
        let existing = renewer.store().read(&staple_path)?;

        let existing_info = match existing.as_deref().map(|raw| ocsp::parse_response(raw, &cert)) {
            None => None,
            Some(Ok(OcspReply::Staple(info))) => {
                debug!(
                    action_id = %action_id,
                    label = %cert.label(),
                    staple = %staple_path.display(),
                    "Found existing staple"
                );
                Some(info)
            }
            Some(Ok(OcspReply::Refused(status))) => {
                warn!(
                    action_id = %action_id,
                    label = %cert.label(),
                    staple = %staple_path.display(),
                    status = %status,
                    "Existing staple is not a successful response"
                );
                None
            }
            Some(Err(e)) => {
                warn!(
                    action_id = %action_id,
                    label = %cert.label(),
                    staple = %staple_path.display(),
                    error = %e,
                    "Existing staple is unparsable"
                );
                None
            }
        };

        Ok(Self {
            renewer,
            action_id,
            path: path.to_path_buf(),
            cert,
            hint: rest,
            staple_path,
            existing,
            existing_info,
        })
    }

    pub fn action_id(&self) -> ActionId {
        self.action_id
    }

    pub fn cert(&self) -> &CertInfo {
        &self.cert
    }

    pub fn staple_path(&self) -> &Path {
        &self.staple_path
    }

    /// Run the attempt; `immediate` skips the timer check
    pub async fn run(self, immediate: bool) -> Result<RenewalOutcome, RenewError> {
        let now = Utc::now();
        let registered = self.renewer.registry().take_check(&self.path);

        if !immediate {
            if let Some(next_check) = self.not_due_until(now, registered) {
                self.renewer
                    .registry()
                    .register_future_check(&self.path, next_check);
                debug!(
                    action_id = %self.action_id,
                    label = %self.cert.label(),
                    next_check = %next_check,
                    "Staple not due for renewal"
                );
                return Ok(RenewalOutcome::NotDue { next_check });
            }
        }

        let issuer = self.resolve_issuer()?;

        if self.cert.is_expired_at(now) {
            return Err(RenewError::CertExpired {
                label: self.cert.label().to_string(),
                not_after: self.cert.not_after(),
            });
        }

        let url = self
            .cert
            .ocsp_urls()
            .first()
            .cloned()
            .ok_or_else(|| RenewError::NoOcspInCert {
                label: self.cert.label().to_string(),
            })?;

        if !self.renewer.permit_remote() {
            info!(
                action_id = %self.action_id,
                label = %self.cert.label(),
                url = %url,
                "Not really fetching OCSP staple"
            );
            return Ok(RenewalOutcome::DryRun);
        }

        debug!(action_id = %self.action_id, label = %self.cert.label(), url = %url, "Fetching OCSP staple");
        let outcome = self
            .renewer
            .fetcher()
            .fetch(&url, &self.cert, &issuer)
            .await?;

        match outcome {
            FetchOutcome::Good(staple) => {
                info!(
                    action_id = %self.action_id,
                    label = %self.cert.label(),
                    produced_at = ?staple.info.times.produced_at,
                    next_update = ?staple.info.times.next_update,
                    "OCSP status good"
                );

                let written = self.renewer.store().write(
                    &self.staple_path,
                    &staple.raw,
                    self.renewer.permit_writes(),
                )?;

                let next_check = timing::next_check_after_fetch(
                    &mut rand::thread_rng(),
                    &staple.info.times,
                    self.renewer.config().timer_t1,
                    Utc::now(),
                );
                self.renewer
                    .registry()
                    .register_future_check(&self.path, next_check);

                info!(
                    action_id = %self.action_id,
                    label = %self.cert.label(),
                    staple = %self.staple_path.display(),
                    next_check = %next_check,
                    "Renewed OCSP staple"
                );
                Ok(RenewalOutcome::Renewed {
                    staple_path: self.staple_path,
                    written,
                    next_check,
                })
            }
            FetchOutcome::Revoked { revoked_at } => Err(RenewError::Revoked {
                label: self.cert.label().to_string(),
                revoked_at,
            }),
            FetchOutcome::Unknown => Err(RenewError::UnknownAtResponder {
                label: self.cert.label().to_string(),
                url,
            }),
            FetchOutcome::TryLater => {
                let retry = timing::retry_in(&mut rand::thread_rng(), Utc::now(), TRY_LATER_RETRY);
                self.renewer.registry().register_future_check(&self.path, retry);
                debug!(
                    action_id = %self.action_id,
                    label = %self.cert.label(),
                    retry = %retry,
                    "Responder asked to try later"
                );
                Err(RenewError::TryLater { url })
            }
            FetchOutcome::Unexpected(status) => Err(RenewError::OcspProblem(format!(
                "responder {} answered {}",
                url, status
            ))),
        }
    }

    /// When the existing staple is fresh, the time it should be rechecked
    fn not_due_until(
        &self,
        now: DateTime<Utc>,
        registered: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let Some(info) = &self.existing_info else {
            if self.existing.is_some() {
                debug!(action_id = %self.action_id, label = %self.cert.label(), "Renewing unusable staple");
            } else {
                debug!(action_id = %self.action_id, label = %self.cert.label(), "No staple yet");
            }
            return None;
        };

        let t1 = self.renewer.config().timer_t1;
        match timing::renewal_due(&mut rand::thread_rng(), &info.times, t1, now, registered) {
            Due::Later(at) => Some(at),
            Due::Now(reason) => {
                debug!(
                    action_id = %self.action_id,
                    label = %self.cert.label(),
                    reason = ?reason,
                    "Staple due for renewal"
                );
                None
            }
        }
    }

    fn resolve_issuer(&self) -> Result<CertInfo, RenewError> {
        if let Some(issuer) = issuer_from_hint(&self.hint, &self.cert) {
            return Ok(issuer);
        }
        self.renewer
            .issuers()
            .find_issuer(&self.path, &self.cert)
            .ok_or_else(|| RenewError::NoIssuer {
                label: self.cert.label().to_string(),
            })
    }
}
