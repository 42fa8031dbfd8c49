//! OCSP request and response encoding
//!
//! Thin layer over the `x509-ocsp` ASN.1 types: build the DER request for a
//! (certificate, issuer) pair and reduce a DER response to the handful of
//! facts the renewal engine acts on.
//!
//! Response signatures are not checked here. A staple is only ever served to
//! TLS clients, which verify it against the issuer themselves.

use chrono::{DateTime, Utc};
use der::asn1::{Null, ObjectIdentifier, OctetString};
use der::{Any, Decode, Encode};
use sha1::{Digest, Sha1};
use thiserror::Error;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspGeneralizedTime, OcspRequest, OcspResponse,
    OcspResponseStatus, Request, TbsRequest, Version,
};

use crate::cert::CertInfo;

/// MIME type of an OCSP request body
pub const MIME_OCSP_REQUEST: &str = "application/ocsp-request";

/// id-sha1, the CertID hash every responder understands
const ID_SHA_1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");

/// id-pkix-ocsp-basic response type
const ID_PKIX_OCSP_BASIC: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.1");

/// OCSP encoding errors
#[derive(Error, Debug)]
pub enum OcspError {
    #[error("failed to encode OCSP request: {0}")]
    Encode(der::Error),

    #[error("malformed OCSP response: {0}")]
    Decode(der::Error),

    #[error("unsupported OCSP response type {0}")]
    UnsupportedType(String),

    #[error("successful OCSP response carries no response bytes")]
    MissingBody,

    #[error("OCSP response does not cover certificate serial {serial}")]
    NoMatchingResponse { serial: String },

    #[error("OCSP timestamp out of range")]
    TimeOutOfRange,
}

/// Responder-level status of an OCSP reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderStatus {
    Successful,
    MalformedRequest,
    InternalError,
    TryLater,
    SigRequired,
    Unauthorized,
}

impl std::fmt::Display for ResponderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Successful => "successful",
            Self::MalformedRequest => "malformedRequest",
            Self::InternalError => "internalError",
            Self::TryLater => "tryLater",
            Self::SigRequired => "sigRequired",
            Self::Unauthorized => "unauthorized",
        };
        f.write_str(name)
    }
}

impl From<OcspResponseStatus> for ResponderStatus {
    fn from(status: OcspResponseStatus) -> Self {
        match status {
            OcspResponseStatus::Successful => Self::Successful,
            OcspResponseStatus::MalformedRequest => Self::MalformedRequest,
            OcspResponseStatus::InternalError => Self::InternalError,
            OcspResponseStatus::TryLater => Self::TryLater,
            OcspResponseStatus::SigRequired => Self::SigRequired,
            OcspResponseStatus::Unauthorized => Self::Unauthorized,
        }
    }
}

/// Certificate status carried by a staple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StapleStatus {
    Good,
    Revoked { revoked_at: DateTime<Utc> },
    Unknown,
}

/// Timers of a staple; any of them may be unset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StapleTimes {
    pub produced_at: Option<DateTime<Utc>>,
    pub this_update: Option<DateTime<Utc>>,
    pub next_update: Option<DateTime<Utc>>,
}

/// The part of a successful reply that concerns our certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StapleInfo {
    pub status: StapleStatus,
    pub serial: String,
    pub times: StapleTimes,
}

/// A decoded OCSP reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcspReply {
    /// Successful reply with a SingleResponse for the certificate
    Staple(StapleInfo),
    /// The responder declined to answer
    Refused(ResponderStatus),
}

/// Build a DER OCSP request for `cert` issued by `issuer`
pub fn build_request(cert: &CertInfo, issuer: &CertInfo) -> Result<Vec<u8>, OcspError> {
    let cert_id = CertId {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid: ID_SHA_1,
            parameters: Some(Any::from(Null)),
        },
        issuer_name_hash: OctetString::new(Sha1::digest(issuer.subject_raw()).to_vec())
            .map_err(OcspError::Encode)?,
        issuer_key_hash: OctetString::new(Sha1::digest(issuer.public_key()).to_vec())
            .map_err(OcspError::Encode)?,
        serial_number: SerialNumber::new(cert.serial()).map_err(OcspError::Encode)?,
    };

    let request = OcspRequest {
        tbs_request: TbsRequest {
            version: Version::V1,
            requestor_name: None,
            request_list: vec![Request {
                req_cert: cert_id,
                single_request_extensions: None,
            }],
            request_extensions: None,
        },
        optional_signature: None,
    };

    request.to_der().map_err(OcspError::Encode)
}

/// Decode a DER OCSP reply and pick out the response for `cert`
pub fn parse_response(raw: &[u8], cert: &CertInfo) -> Result<OcspReply, OcspError> {
    let response = OcspResponse::from_der(raw).map_err(OcspError::Decode)?;

    let status = ResponderStatus::from(response.response_status);
    if status != ResponderStatus::Successful {
        return Ok(OcspReply::Refused(status));
    }

    let body = response.response_bytes.ok_or(OcspError::MissingBody)?;
    if body.response_type != ID_PKIX_OCSP_BASIC {
        return Err(OcspError::UnsupportedType(body.response_type.to_string()));
    }

    let basic = BasicOcspResponse::from_der(body.response.as_bytes()).map_err(OcspError::Decode)?;
    let data = basic.tbs_response_data;

    let single = data
        .responses
        .iter()
        .find(|single| same_serial(single.cert_id.serial_number.as_bytes(), cert.serial()))
        .ok_or_else(|| OcspError::NoMatchingResponse {
            serial: cert.serial_hex(),
        })?;

    let status = match &single.cert_status {
        CertStatus::Good(_) => StapleStatus::Good,
        CertStatus::Revoked(info) => StapleStatus::Revoked {
            revoked_at: to_chrono(&info.revocation_time)?,
        },
        CertStatus::Unknown(_) => StapleStatus::Unknown,
    };

    let times = StapleTimes {
        produced_at: Some(to_chrono(&data.produced_at)?),
        this_update: Some(to_chrono(&single.this_update)?),
        next_update: single.next_update.as_ref().map(to_chrono).transpose()?,
    };

    Ok(OcspReply::Staple(StapleInfo {
        status,
        serial: cert.serial_hex(),
        times,
    }))
}

fn to_chrono(time: &OcspGeneralizedTime) -> Result<DateTime<Utc>, OcspError> {
    let since_epoch = time.0.to_unix_duration();
    let secs = i64::try_from(since_epoch.as_secs()).map_err(|_| OcspError::TimeOutOfRange)?;
    DateTime::<Utc>::from_timestamp(secs, since_epoch.subsec_nanos())
        .ok_or(OcspError::TimeOutOfRange)
}

/// Compare two big-endian serials, ignoring sign-padding zero bytes
fn same_serial(a: &[u8], b: &[u8]) -> bool {
    fn trim(bytes: &[u8]) -> &[u8] {
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        &bytes[start..]
    }
    trim(a) == trim(b)
}
