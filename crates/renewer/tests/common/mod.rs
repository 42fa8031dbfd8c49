//! Fixtures shared by unit and integration tests: generated certificates
//! carrying an OCSP responder URL, and hand-assembled OCSP replies.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use der::asn1::{BitString, GeneralizedTime, Null, ObjectIdentifier, OctetString};
use der::{Any, Encode};
use rcgen::{CertificateParams, CustomExtension, DistinguishedName, DnType, KeyPair};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspGeneralizedTime, OcspResponse, OcspResponseStatus,
    ResponderId, ResponseBytes, ResponseData, RevokedInfo, SingleResponse, Version,
};

const AUTHORITY_INFO_ACCESS: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 1];
const ID_AD_OCSP_DER: &[u8] = &[0x06, 0x08, 0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01];
const ID_PKIX_OCSP_BASIC: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.1");
const ID_SHA_1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// A freshly minted self-signed certificate
pub struct GeneratedCert {
    pub pem: String,
    pub der: Vec<u8>,
}

/// Self-signed certificate valid until 2099, optionally with an OCSP URL
pub fn generate_cert(name: &str, ocsp_url: Option<&str>) -> GeneratedCert {
    build_cert(name, ocsp_url, (2020, 2099))
}

/// Self-signed certificate that expired in 2001
pub fn generate_expired_cert(name: &str, ocsp_url: Option<&str>) -> GeneratedCert {
    build_cert(name, ocsp_url, (2000, 2001))
}

fn build_cert(name: &str, ocsp_url: Option<&str>, years: (i32, i32)) -> GeneratedCert {
    let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, name);
    params.distinguished_name = dn;
    params.not_before = rcgen::date_time_ymd(years.0, 1, 1);
    params.not_after = rcgen::date_time_ymd(years.1, 1, 1);
    if let Some(url) = ocsp_url {
        params
            .custom_extensions
            .push(CustomExtension::from_oid_content(AUTHORITY_INFO_ACCESS, aia_ocsp(url)));
    }

    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    GeneratedCert {
        pem: cert.pem(),
        der: cert.der().to_vec(),
    }
}

/// Write `cert` as `dir/name`, followed by itself as the issuer hint
pub fn write_cert_file(dir: &Path, name: &str, cert: &GeneratedCert) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("{}{}", cert.pem, cert.pem)).unwrap();
    path
}

/// AuthorityInfoAccessSyntax with a single id-ad-ocsp URI
fn aia_ocsp(url: &str) -> Vec<u8> {
    let mut location = vec![0x86];
    location.extend(der_len(url.len()));
    location.extend_from_slice(url.as_bytes());

    let access = der_sequence(&[ID_AD_OCSP_DER, &location].concat());
    der_sequence(&access)
}

fn der_sequence(content: &[u8]) -> Vec<u8> {
    let mut out = vec![0x30];
    out.extend(der_len(content.len()));
    out.extend_from_slice(content);
    out
}

fn der_len(len: usize) -> Vec<u8> {
    match len {
        0..=0x7f => vec![len as u8],
        0x80..=0xff => vec![0x81, len as u8],
        _ => vec![0x82, (len >> 8) as u8, len as u8],
    }
}

/// Certificate status to put in a generated reply
#[derive(Debug, Clone, Copy)]
pub enum TestStatus {
    Good,
    Revoked(DateTime<Utc>),
    Unknown,
}

/// Shape of a generated successful reply
#[derive(Debug, Clone)]
pub struct ResponseSpec {
    pub serial: Vec<u8>,
    pub status: TestStatus,
    pub produced_at: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

/// DER of a successful, unsigned basic OCSP reply
pub fn ocsp_response(spec: &ResponseSpec) -> Vec<u8> {
    let cert_status = match spec.status {
        TestStatus::Good => CertStatus::Good(Null),
        TestStatus::Revoked(at) => CertStatus::Revoked(RevokedInfo {
            revocation_time: ocsp_time(at),
            revocation_reason: None,
        }),
        TestStatus::Unknown => CertStatus::Unknown(Null),
    };

    let single = SingleResponse {
        cert_id: CertId {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: ID_SHA_1,
                parameters: Some(Any::from(Null)),
            },
            issuer_name_hash: OctetString::new(vec![0u8; 20]).unwrap(),
            issuer_key_hash: OctetString::new(vec![0u8; 20]).unwrap(),
            serial_number: SerialNumber::new(&spec.serial).unwrap(),
        },
        cert_status,
        this_update: ocsp_time(spec.produced_at),
        next_update: spec.next_update.map(ocsp_time),
        single_extensions: None,
    };

    let basic = BasicOcspResponse {
        tbs_response_data: ResponseData {
            version: Version::V1,
            responder_id: ResponderId::ByKey(OctetString::new(vec![0x11u8; 20]).unwrap()),
            produced_at: ocsp_time(spec.produced_at),
            responses: vec![single],
            response_extensions: None,
        },
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: SHA256_WITH_RSA,
            parameters: None,
        },
        signature: BitString::from_bytes(&[0u8; 32]).unwrap(),
        certs: None,
    };

    OcspResponse {
        response_status: OcspResponseStatus::Successful,
        response_bytes: Some(ResponseBytes {
            response_type: ID_PKIX_OCSP_BASIC,
            response: OctetString::new(basic.to_der().unwrap()).unwrap(),
        }),
    }
    .to_der()
    .unwrap()
}

/// DER of a reply where the responder declined to answer
pub fn ocsp_refusal(status: OcspResponseStatus) -> Vec<u8> {
    OcspResponse {
        response_status: status,
        response_bytes: None,
    }
    .to_der()
    .unwrap()
}

fn ocsp_time(at: DateTime<Utc>) -> OcspGeneralizedTime {
    let since_epoch = std::time::Duration::from_secs(at.timestamp() as u64);
    OcspGeneralizedTime(GeneralizedTime::from_unix_duration(since_epoch).unwrap())
}
