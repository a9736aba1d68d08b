//! Certificate chain trust decisions.
//!
//! A chain is trusted when any of its certificates can be linked to a
//! self-signed anchor in the truststore. Trusted entries that are not
//! self-signed are followed recursively toward a root.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use x509_cert::Certificate;

use crate::cert::{decode_certificates, issuer_string, subject_string};
use crate::error::KeystoreError;
use crate::keystore::TrustStore;
use crate::pkix::{is_self_signed, validate_step};
use crate::settings::TrustSettings;

/// Maximum number of trusted intermediates followed before giving up.
pub const MAX_TRUST_DEPTH: usize = 16;

/// Validates certificate chains against a fixed set of trust anchors.
#[derive(Debug, Clone)]
pub struct CertChainValidator {
    trust_store: TrustStore,
}

impl CertChainValidator {
    /// Use the platform default truststore.
    pub fn from_platform_default(settings: &TrustSettings) -> Result<Self, KeystoreError> {
        TrustStore::platform_default(settings).map(Self::from_trust_store)
    }

    /// Decode a JKS keystore or PEM bundle.
    pub fn from_keystore_bytes(bytes: &[u8], password: Option<&str>) -> Result<Self, KeystoreError> {
        TrustStore::load(bytes, password).map(Self::from_trust_store)
    }

    pub fn from_trust_store(trust_store: TrustStore) -> Self {
        Self { trust_store }
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust_store
    }

    /// Whether the encoded chain (leaf first) is trusted now.
    ///
    /// Never fails: undecodable input and every validation problem are
    /// logged and reported as untrusted.
    pub fn validate_key_chain(&self, chain: &[u8]) -> bool {
        match decode_certificates(chain) {
            Ok(certs) => self.validate_certificates(&certs, Utc::now()),
            Err(e) => {
                warn!(error = %e, "cannot decode certificate chain");
                false
            }
        }
    }

    /// Whether `chain` is trusted at time `now`.
    pub fn validate_certificates(&self, chain: &[Certificate], now: DateTime<Utc>) -> bool {
        for pair in chain.windows(2) {
            if pair[0].tbs_certificate.issuer != pair[1].tbs_certificate.subject {
                warn!(
                    issuer = %issuer_string(&pair[0]),
                    next_subject = %subject_string(&pair[1]),
                    "certificate chain is not linked"
                );
                return false;
            }
        }

        for cert in chain {
            if self.is_trusted_at(cert, now, 0) {
                debug!(subject = %subject_string(cert), "certificate chain trusted");
                return true;
            }
        }

        if let Some(leaf) = chain.first() {
            warn!(subject = %subject_string(leaf), "untrusted certificate");
        }
        false
    }

    /// Whether a single certificate leads to a trusted root now.
    pub fn is_trusted(&self, cert: &Certificate) -> bool {
        self.is_trusted_at(cert, Utc::now(), 0)
    }

    fn is_trusted_at(&self, cert: &Certificate, now: DateTime<Utc>, depth: usize) -> bool {
        if depth >= MAX_TRUST_DEPTH {
            warn!(subject = %subject_string(cert), depth, "trust anchor search too deep");
            return false;
        }

        for anchor in self.trust_store.certificates() {
            if cert.tbs_certificate.issuer != anchor.tbs_certificate.subject {
                continue;
            }

            match validate_step(cert, anchor, now) {
                Ok(()) if is_self_signed(anchor) => {
                    debug!(
                        subject = %subject_string(cert),
                        anchor = %subject_string(anchor),
                        "reached trusted root"
                    );
                    return true;
                }
                Ok(()) => {
                    debug!(anchor = %subject_string(anchor), depth, "following trusted intermediate");
                    if self.is_trusted_at(anchor, now, depth + 1) {
                        return true;
                    }
                }
                Err(e) => {
                    warn!(
                        subject = %subject_string(cert),
                        anchor = %subject_string(anchor),
                        error = %e,
                        "path validation failed against candidate anchor"
                    );
                }
            }
        }
        false
    }
}
