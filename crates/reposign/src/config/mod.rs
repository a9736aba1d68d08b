//! Signing and verification configuration.
//!
//! [`BaseConfig`] holds what both sides share. [`SignerConfig`] is built once
//! through [`SignerConfigBuilder`] and is complete by construction.
//! [`ValidatorConfig`] is filled in by the caller and then by index parsing,
//! and is checked for completeness before a verified signer is handed out.

mod signer;
mod validator;

pub use signer::{SignerConfig, SignerConfigBuilder};
pub use validator::ValidatorConfig;

use x509_cert::Certificate;

use crate::cert::{decode_certificates, encode_pem};
use crate::error::{SigningError, SigningErrorKind, SigningResult};
use crate::types::{Charset, DigestAlgorithm, RepoAttributes};

/// Name reported by [`BaseConfig::missing_key`] for an empty chain.
pub const SIGNING_CERTS_KEY: &str = "signingCerts";
pub const DIGEST_KEY: &str = "digest";
pub const CHARSET_KEY: &str = "charset";
pub const SIGNING_KEY_KEY: &str = "signingKey";
pub const SIGNATURE_KEY: &str = "signature";

/// Configuration shared by signer and validator.
#[derive(Debug, Clone, Default)]
pub struct BaseConfig {
    attributes: RepoAttributes,
    signing_certs: Vec<Certificate>,
    digest: Option<DigestAlgorithm>,
    charset: Option<Charset>,
}

impl BaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the first required field without a value.
    ///
    /// Checked in order: the three repository attributes, the signing
    /// certificate chain, the digest algorithm, the charset.
    pub fn missing_key(&self) -> Option<&'static str> {
        if let Some(key) = self.attributes.missing_key() {
            return Some(key);
        }
        if self.signing_certs.is_empty() {
            return Some(SIGNING_CERTS_KEY);
        }
        if self.digest.is_none() {
            return Some(DIGEST_KEY);
        }
        if self.charset.is_none() {
            return Some(CHARSET_KEY);
        }
        None
    }

    pub fn attributes(&self) -> &RepoAttributes {
        &self.attributes
    }

    pub fn set_attributes(&mut self, attributes: RepoAttributes) {
        self.attributes = attributes;
    }

    /// Set one repository attribute by index key. Returns `false` for unknown keys.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) -> bool {
        self.attributes.set(key, value)
    }

    /// Parse one or more concatenated certificates (PEM or DER).
    ///
    /// Failures are reported with `kind`, so the signer reports SIGN and the
    /// validator reports VERIFY for the same bad input.
    pub fn set_signing_certs(&mut self, bytes: &[u8], kind: SigningErrorKind) -> SigningResult<()> {
        let certs = decode_certificates(bytes).map_err(|e| {
            SigningError::new(
                kind,
                format!(
                    "cannot parse signing certificate chain ({}), check with `openssl x509 -text`",
                    e
                ),
            )
            .with_source(e)
        })?;
        self.signing_certs = certs;
        Ok(())
    }

    /// The signing (leaf) certificate.
    ///
    /// This is the first certificate of the chain as supplied. Callers must
    /// pass chains leaf first; the order is not checked or corrected here.
    pub fn signing_cert(&self) -> Option<&Certificate> {
        self.signing_certs.first()
    }

    pub fn signing_certs(&self) -> &[Certificate] {
        &self.signing_certs
    }

    /// The configured chain as PEM text.
    pub fn signing_certs_pem(&self) -> SigningResult<String> {
        encode_pem(&self.signing_certs).map_err(|e| {
            SigningError::sign(format!("cannot encode signing certificates: {}", e)).with_source(e)
        })
    }

    pub fn digest(&self) -> Option<DigestAlgorithm> {
        self.digest
    }

    pub fn set_digest(&mut self, algorithm: DigestAlgorithm) {
        self.digest = Some(algorithm);
    }

    pub fn charset(&self) -> Option<Charset> {
        self.charset
    }

    pub fn set_charset(&mut self, charset: Charset) {
        self.charset = Some(charset);
    }
}
