//! Certificate input
//!
//! Loads PEM certificate files and keeps an owned summary of the fields the
//! renewer needs, so nothing borrows the DER buffer across await points.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::trace;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::x509::AttributeTypeAndValue;

/// Largest certificate file we are prepared to read (1 MiB)
pub const MAX_CERT_FILE_SIZE: u64 = 1024 * 1024;

/// PEM tag of the block we accept
const PEM_CERTIFICATE_TAG: &str = "CERTIFICATE";

/// End marker of a PEM certificate block
const PEM_CERTIFICATE_END: &[u8] = b"-----END CERTIFICATE-----";

/// id-ad-ocsp access method in the Authority Information Access extension
const ID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";

/// Certificate input errors
#[derive(Error, Debug)]
pub enum CertError {
    #[error("certificate file too large ({size} bytes; maximum {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("no certificate found in file")]
    NotCertificate,

    #[error("failed to parse certificate: {0}")]
    Parse(String),

    #[error("failed to read certificate file: {0}")]
    Io(#[from] std::io::Error),
}

/// Owned view of an X.509 certificate
#[derive(Debug, Clone)]
pub struct CertInfo {
    der: Vec<u8>,
    label: String,
    serial: Vec<u8>,
    not_after: DateTime<Utc>,
    ocsp_urls: Vec<String>,
    subject_raw: Vec<u8>,
    issuer_raw: Vec<u8>,
    issuer_dn: String,
    public_key: Vec<u8>,
}

impl CertInfo {
    /// Parse a DER certificate
    pub fn from_der(der: Vec<u8>) -> Result<Self, CertError> {
        let mut info = Self::summarize(&der)?;
        info.der = der;
        Ok(info)
    }

    fn summarize(der: &[u8]) -> Result<Self, CertError> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| CertError::Parse(e.to_string()))?;

        let not_after_ts = cert.validity().not_after.timestamp();
        let not_after = DateTime::<Utc>::from_timestamp(not_after_ts, 0).ok_or_else(|| {
            CertError::Parse(format!("notAfter out of range: {}", not_after_ts))
        })?;

        let info = Self {
            der: Vec::new(),
            label: label_for(&cert),
            serial: cert.raw_serial().to_vec(),
            not_after,
            ocsp_urls: ocsp_urls(&cert),
            subject_raw: cert.subject().as_raw().to_vec(),
            issuer_raw: cert.issuer().as_raw().to_vec(),
            issuer_dn: cert.issuer().to_string(),
            public_key: cert.public_key().subject_public_key.data.to_vec(),
        };

        trace!(
            label = %info.label,
            serial = %info.serial_hex(),
            ocsp_urls = info.ocsp_urls.len(),
            "Parsed certificate"
        );

        Ok(info)
    }

    /// Parse the first PEM certificate block in `data`
    pub fn from_pem(data: &[u8]) -> Result<Self, CertError> {
        let block = pem::parse(data).map_err(|_| CertError::NotCertificate)?;
        if block.tag() != PEM_CERTIFICATE_TAG {
            return Err(CertError::NotCertificate);
        }
        Self::from_der(block.into_contents())
    }

    /// Human-oriented name for log lines
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Serial number as raw big-endian bytes
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    pub fn serial_hex(&self) -> String {
        hex::encode(&self.serial)
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// OCSP responder URLs from the Authority Information Access extension
    pub fn ocsp_urls(&self) -> &[String] {
        &self.ocsp_urls
    }

    /// DER encoding of the subject name
    pub fn subject_raw(&self) -> &[u8] {
        &self.subject_raw
    }

    /// DER encoding of the issuer name
    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer_raw
    }

    pub fn issuer_dn(&self) -> &str {
        &self.issuer_dn
    }

    /// Subject public key bits (without the algorithm identifier)
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.not_after
    }

    /// Whether `issuer`'s subject is this certificate's issuer name
    pub fn is_issued_by(&self, issuer: &CertInfo) -> bool {
        self.issuer_raw == issuer.subject_raw
    }
}

/// A certificate file after loading
#[derive(Debug, Clone)]
pub struct LoadedCert {
    /// The leaf: first PEM certificate block in the file
    pub cert: CertInfo,
    /// Bytes following the leaf block; only ever an issuer hint
    pub rest: Vec<u8>,
}

/// Read a PEM certificate file, bounded by [`MAX_CERT_FILE_SIZE`]
pub fn load_certificate_file(path: &Path) -> Result<LoadedCert, CertError> {
    let size = fs::metadata(path)?.len();
    if size > MAX_CERT_FILE_SIZE {
        return Err(CertError::TooLarge {
            size,
            max: MAX_CERT_FILE_SIZE,
        });
    }

    let data = fs::read(path)?;
    let cert = CertInfo::from_pem(&data)?;
    let rest = trailing_after_first_block(&data).to_vec();

    Ok(LoadedCert { cert, rest })
}

/// Bytes after the first certificate block's end marker
fn trailing_after_first_block(data: &[u8]) -> &[u8] {
    data.windows(PEM_CERTIFICATE_END.len())
        .position(|w| w == PEM_CERTIFICATE_END)
        .map(|pos| &data[pos + PEM_CERTIFICATE_END.len()..])
        .unwrap_or(&[])
}

fn ocsp_urls(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut urls = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
            for desc in &aia.accessdescs {
                if desc.access_method.to_id_string() != ID_AD_OCSP {
                    continue;
                }
                if let GeneralName::URI(uri) = &desc.access_location {
                    urls.push(uri.to_string());
                }
            }
        }
    }
    urls
}

/// Common Name, else first DNS SAN, else "C O [OU]", else the subject DN
fn label_for(cert: &X509Certificate<'_>) -> String {
    let subject = cert.subject();

    if let Some(cn) = subject
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .filter(|cn| !cn.is_empty())
    {
        return cn.to_string();
    }

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                return dns.to_string();
            }
        }
    }

    let country = first_value(subject.iter_country());
    let organization = first_value(subject.iter_organization());
    if let (Some(country), Some(organization)) = (country, organization) {
        let mut label = format!("{} {}", country, organization);
        if let Some(unit) = first_value(subject.iter_organizational_unit()) {
            label.push(' ');
            label.push_str(&unit);
        }
        return label;
    }

    subject.to_string()
}

fn first_value<'a, 'b>(
    mut attrs: impl Iterator<Item = &'b AttributeTypeAndValue<'a>>,
) -> Option<String>
where
    'a: 'b,
{
    attrs
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string)
}
