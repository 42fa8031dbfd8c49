//! OCSP responder transport
//!
//! POSTs a DER request to the certificate's responder and classifies the
//! reply into a [`FetchOutcome`] the renewal engine switches on.

use std::time::Instant;

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tracing::{debug, trace};

use crate::cert::CertInfo;
use crate::error::RenewError;
use crate::ocsp::{self, OcspError, OcspReply, ResponderStatus, StapleInfo, StapleStatus};

/// A fresh staple: the exact bytes to store and what they say
#[derive(Debug, Clone)]
pub struct Staple {
    pub raw: Vec<u8>,
    pub info: StapleInfo,
}

/// Classified result of one OCSP exchange
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Status good; the staple is ready to store
    Good(Staple),
    Revoked { revoked_at: DateTime<Utc> },
    /// The responder does not know this certificate/issuer pair
    Unknown,
    /// The responder asked to be retried later
    TryLater,
    /// Any other responder-level status
    Unexpected(ResponderStatus),
}

/// Reduce a raw OCSP reply to a [`FetchOutcome`]
pub fn classify(raw: Vec<u8>, cert: &CertInfo) -> Result<FetchOutcome, OcspError> {
    let outcome = match ocsp::parse_response(&raw, cert)? {
        OcspReply::Refused(ResponderStatus::TryLater) => FetchOutcome::TryLater,
        OcspReply::Refused(status) => FetchOutcome::Unexpected(status),
        OcspReply::Staple(info) => match info.status {
            StapleStatus::Good => FetchOutcome::Good(Staple { raw, info }),
            StapleStatus::Revoked { revoked_at } => FetchOutcome::Revoked { revoked_at },
            StapleStatus::Unknown => FetchOutcome::Unknown,
        },
    };
    Ok(outcome)
}

/// HTTP client for OCSP responders
#[derive(Debug, Clone)]
pub struct OcspFetcher {
    client: Client,
}

impl OcspFetcher {
    pub fn new(user_agent: &str) -> Result<Self, RenewError> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }

    /// Request the status of `cert` from `url`
    pub async fn fetch(
        &self,
        url: &str,
        cert: &CertInfo,
        issuer: &CertInfo,
    ) -> Result<FetchOutcome, RenewError> {
        let body = ocsp::build_request(cert, issuer)?;
        let start = Instant::now();
        trace!(url = %url, size = body.len(), "Sending OCSP request");

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, ocsp::MIME_OCSP_REQUEST)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.bytes().await?.to_vec();

        debug!(
            url = %url,
            status = status.as_u16(),
            size = raw.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "OCSP responder answered"
        );

        if status != StatusCode::OK {
            return Err(RenewError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                body: raw,
            });
        }

        classify(raw, cert).map_err(RenewError::from)
    }
}
