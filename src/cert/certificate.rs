use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::io::BufReader;
use std::time::Duration;

/// A parsed X.509 certificate reduced to what supervision needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Start of the validity window
    not_before: DateTime<Utc>,
    /// End of the validity window
    not_after: DateTime<Utc>,
    /// Signature bytes, used to tell one issued certificate from another
    fingerprint: Vec<u8>,
    /// Common name and DNS subject alternative names
    names: Vec<String>,
}

impl Certificate {
    pub fn new(not_before: DateTime<Utc>, not_after: DateTime<Utc>, fingerprint: Vec<u8>) -> Self {
        Self {
            not_before,
            not_after,
            fingerprint,
            names: Vec::new(),
        }
    }

    /// Parse the first certificate of a PEM bundle
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        use rustls_pemfile::certs;

        let mut reader = BufReader::new(pem);
        let items = certs(&mut reader)
            .map_err(|e| anyhow::anyhow!("Failed to parse PEM certificate: {}", e))?;

        // Only the end-entity certificate matters; the rest is chain
        let der = items
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No certificates found in PEM data"))?;

        Self::from_der(&der)
    }

    /// Parse a DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        use x509_parser::parse_x509_certificate;

        let (_, x509) = parse_x509_certificate(der)
            .map_err(|e| anyhow::anyhow!("Failed to parse X.509 certificate: {}", e))?;

        let validity = x509.validity();
        let not_before = parse_asn1_time(&validity.not_before).context("Invalid notBefore")?;
        let not_after = parse_asn1_time(&validity.not_after).context("Invalid notAfter")?;

        let mut names = Vec::new();

        if let Some(cn) = x509.subject().iter_common_name().next() {
            if let Ok(cn_str) = cn.as_str() {
                names.push(cn_str.to_string());
            }
        }

        let san_ext = x509
            .extensions()
            .iter()
            .find(|ext| ext.oid == x509_parser::oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME);

        if let Some(san) = san_ext {
            if let x509_parser::extensions::ParsedExtension::SubjectAlternativeName(san_names) =
                san.parsed_extension()
            {
                for name in &san_names.general_names {
                    if let x509_parser::extensions::GeneralName::DNSName(dns) = name {
                        names.push(dns.to_string());
                    }
                }
            }
        }

        names.sort();
        names.dedup();

        Ok(Self {
            not_before,
            not_after,
            fingerprint: x509.signature_value.data.to_vec(),
            names,
        })
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn fingerprint(&self) -> &[u8] {
        &self.fingerprint
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// `now` falls before the validity window
    pub fn is_pending_at(&self, now: DateTime<Utc>) -> bool {
        now < self.not_before
    }

    /// `now` falls after the validity window
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.not_after
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_pending_at(now) && !self.is_expired_at(now)
    }

    /// Time left until `not_after`, zero once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.not_after - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Two certificates are the same issuance when their signatures match
    pub fn same_identity(&self, other: &Certificate) -> bool {
        self.fingerprint == other.fingerprint
    }

    /// Short hex prefix of the fingerprint for log lines
    pub fn short_fingerprint(&self) -> String {
        self.fingerprint
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

fn parse_asn1_time(time: &x509_parser::time::ASN1Time) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(time.timestamp(), 0)
        .single()
        .ok_or_else(|| anyhow::anyhow!("Failed to convert ASN.1 time to DateTime"))
}
