use std::fmt;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pkcs8::DecodePrivateKey;
use regex::Regex;
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::{Sha256, Sha512};
use tracing::debug;

use super::{BaseConfig, CHARSET_KEY, DIGEST_KEY, SIGNATURE_KEY, SIGNING_CERTS_KEY, SIGNING_KEY_KEY};
use crate::cert::{rsa_public_key, subject_string};
use crate::error::{SigningError, SigningErrorKind, SigningResult};
use crate::types::{Charset, DigestAlgorithm, PrivateKeyFormat, RepoAttributes, SigningAlgorithm};

static PEM_ARMOR: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn pem_armor() -> SigningResult<&'static Regex> {
    PEM_ARMOR
        .get_or_init(|| Regex::new(r"-----(BEGIN|END)[A-Z0-9 ]+-----|\s+"))
        .as_ref()
        .map_err(|e| SigningError::sign(format!("invalid PEM armor pattern: {}", e)))
}

/// Private key primed for one signing algorithm.
enum RepoSigningKey {
    Sha256(SigningKey<Sha256>),
    Sha512(SigningKey<Sha512>),
}

impl RepoSigningKey {
    fn new(algorithm: SigningAlgorithm, key: RsaPrivateKey) -> Self {
        match algorithm {
            SigningAlgorithm::Sha256WithRsa => Self::Sha256(SigningKey::new(key)),
            SigningAlgorithm::Sha512WithRsa => Self::Sha512(SigningKey::new(key)),
        }
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, rsa::signature::Error> {
        match self {
            Self::Sha256(key) => key.try_sign(message).map(|s| s.to_vec()),
            Self::Sha512(key) => key.try_sign(message).map(|s| s.to_vec()),
        }
    }
}

/// Complete, immutable signing configuration.
///
/// Only obtainable through [`SignerConfigBuilder::build`], which guarantees
/// every field is present and that the private key belongs to the signing
/// certificate.
pub struct SignerConfig {
    base: BaseConfig,
    algorithm: SigningAlgorithm,
    digest: DigestAlgorithm,
    key: RepoSigningKey,
}

impl fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerConfig")
            .field("base", &self.base)
            .field("algorithm", &self.algorithm)
            .field("digest", &self.digest)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl SignerConfig {
    pub fn builder() -> SignerConfigBuilder {
        SignerConfigBuilder::new()
    }

    /// Build a configuration from its parts in one call.
    pub fn new(
        attributes: RepoAttributes,
        private_key: &[u8],
        key_format: PrivateKeyFormat,
        signing_certs: &[u8],
        algorithm: SigningAlgorithm,
    ) -> SigningResult<Self> {
        Self::builder()
            .attributes(attributes)
            .private_key(private_key, key_format)
            .signing_certs(signing_certs)
            .algorithm(algorithm)
            .build()
    }

    pub fn base(&self) -> &BaseConfig {
        &self.base
    }

    pub fn attributes(&self) -> &RepoAttributes {
        self.base.attributes()
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    pub fn digest(&self) -> DigestAlgorithm {
        self.digest
    }

    /// Always `None` for a built configuration.
    pub fn missing_key(&self) -> Option<&'static str> {
        self.base.missing_key()
    }

    pub(crate) fn sign(&self, message: &[u8]) -> SigningResult<Vec<u8>> {
        self.key.sign(message).map_err(|e| {
            SigningError::sign(format!("{} signature failed: {}", self.algorithm, e)).with_source(e)
        })
    }
}

/// Collects signer inputs; [`build`](Self::build) validates them all at once.
#[derive(Debug, Clone)]
pub struct SignerConfigBuilder {
    attributes: RepoAttributes,
    private_key: Option<(Vec<u8>, PrivateKeyFormat)>,
    signing_certs: Option<Vec<u8>>,
    algorithm: Option<SigningAlgorithm>,
    digest: Option<DigestAlgorithm>,
    charset: Option<Charset>,
}

impl Default for SignerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SignerConfigBuilder {
    /// Empty builder. Package digests default to SHA-256, the index charset to UTF-8.
    pub fn new() -> Self {
        Self {
            attributes: RepoAttributes::default(),
            private_key: None,
            signing_certs: None,
            algorithm: None,
            digest: Some(DigestAlgorithm::Sha256),
            charset: Some(Charset::Utf8),
        }
    }

    pub fn attributes(mut self, attributes: RepoAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set one repository attribute. Unknown keys are ignored.
    pub fn attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.set(key, value);
        self
    }

    /// PKCS#8 RSA private key, PEM armored or raw DER.
    pub fn private_key(mut self, bytes: impl Into<Vec<u8>>, format: PrivateKeyFormat) -> Self {
        self.private_key = Some((bytes.into(), format));
        self
    }

    /// Signing certificate chain, leaf first.
    pub fn signing_certs(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.signing_certs = Some(bytes.into());
        self
    }

    pub fn algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = Some(charset);
        self
    }

    /// Name of the first required input not yet supplied.
    pub fn missing_key(&self) -> Option<&'static str> {
        if let Some(key) = self.attributes.missing_key() {
            return Some(key);
        }
        if self.signing_certs.is_none() {
            return Some(SIGNING_CERTS_KEY);
        }
        if self.digest.is_none() {
            return Some(DIGEST_KEY);
        }
        if self.charset.is_none() {
            return Some(CHARSET_KEY);
        }
        if self.private_key.is_none() {
            return Some(SIGNING_KEY_KEY);
        }
        if self.algorithm.is_none() {
            return Some(SIGNATURE_KEY);
        }
        None
    }

    /// Validate every input and produce a ready configuration.
    ///
    /// Fails with a SIGN error naming the first missing field, on an
    /// unparseable key or chain, or when the key's modulus differs from the
    /// signing certificate's.
    pub fn build(self) -> SigningResult<SignerConfig> {
        if let Some(key) = self.missing_key() {
            return Err(SigningError::sign(format!(
                "incomplete signer configuration: missing {}",
                key
            )));
        }

        let (Some((key_bytes, key_format)), Some(cert_bytes), Some(algorithm), Some(digest), Some(charset)) = (
            self.private_key,
            self.signing_certs,
            self.algorithm,
            self.digest,
            self.charset,
        ) else {
            return Err(SigningError::sign("incomplete signer configuration"));
        };

        let mut base = BaseConfig::new();
        base.set_attributes(self.attributes);
        base.set_digest(digest);
        base.set_charset(charset);
        base.set_signing_certs(&cert_bytes, SigningErrorKind::Sign)?;

        let private_key = load_private_key(&key_bytes, key_format)?;

        let leaf = base
            .signing_cert()
            .ok_or_else(|| SigningError::sign("signing certificate chain is empty"))?;
        let public_key = rsa_public_key(leaf).map_err(|e| {
            SigningError::sign(format!("unusable signing certificate: {}", e))
                .with_certificate(leaf)
                .with_source(e)
        })?;
        if public_key.n() != private_key.n() {
            return Err(SigningError::sign(format!(
                "private key does not match signing certificate {}",
                subject_string(leaf)
            ))
            .with_certificate(leaf));
        }

        debug!(
            subject = %subject_string(leaf),
            algorithm = %algorithm,
            digest = %digest,
            "signer configuration ready"
        );

        Ok(SignerConfig {
            base,
            algorithm,
            digest,
            key: RepoSigningKey::new(algorithm, private_key),
        })
    }
}

fn load_private_key(bytes: &[u8], format: PrivateKeyFormat) -> SigningResult<RsaPrivateKey> {
    let der = match format {
        PrivateKeyFormat::Pem => pem_key_body(bytes)?,
        PrivateKeyFormat::Der => bytes.to_vec(),
    };
    RsaPrivateKey::from_pkcs8_der(&der).map_err(|e| {
        SigningError::sign(format!("cannot parse PKCS#8 RSA private key: {}", e)).with_source(e)
    })
}

/// Strip the PEM armor and whitespace, then base64-decode what remains.
fn pem_key_body(bytes: &[u8]) -> SigningResult<Vec<u8>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| SigningError::sign("PEM private key is not valid text").with_source(e))?;
    let body = pem_armor()?.replace_all(text, "");
    BASE64.decode(body.as_bytes()).map_err(|e| {
        SigningError::sign(format!("invalid base64 in PEM private key: {}", e)).with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::REPO_VERSION;

    const LEAF_KEY_PEM: &str = include_str!("../../tests/data/leaf_key.pem");
    const LEAF_KEY_DER: &[u8] = include_bytes!("../../tests/data/leaf_key.der");
    const OTHER_KEY_PEM: &str = include_str!("../../tests/data/other_key.pem");
    const LEAF_CHAIN_PEM: &str = include_str!("../../tests/data/leaf_chain.pem");

    fn attrs() -> RepoAttributes {
        RepoAttributes::new("demo", "Demo Repo", "1.0")
    }

    #[test]
    fn test_build_from_pem_key() {
        let config = SignerConfig::new(
            attrs(),
            LEAF_KEY_PEM.as_bytes(),
            PrivateKeyFormat::Pem,
            LEAF_CHAIN_PEM.as_bytes(),
            SigningAlgorithm::Sha256WithRsa,
        )
        .unwrap();

        assert_eq!(config.missing_key(), None);
        assert_eq!(config.digest(), DigestAlgorithm::Sha256);
        assert_eq!(config.base().signing_certs().len(), 2);
        assert_eq!(config.sign(b"index").unwrap().len(), 256);
    }

    #[test]
    fn test_build_from_der_key() {
        let config = SignerConfig::builder()
            .attributes(attrs())
            .private_key(LEAF_KEY_DER, PrivateKeyFormat::Der)
            .signing_certs(LEAF_CHAIN_PEM)
            .algorithm(SigningAlgorithm::Sha512WithRsa)
            .digest(DigestAlgorithm::Sha512)
            .build()
            .unwrap();
        assert_eq!(config.algorithm(), SigningAlgorithm::Sha512WithRsa);
        assert_eq!(config.digest(), DigestAlgorithm::Sha512);
    }

    #[test]
    fn test_key_certificate_mismatch() {
        let err = SignerConfig::new(
            attrs(),
            OTHER_KEY_PEM.as_bytes(),
            PrivateKeyFormat::Pem,
            LEAF_CHAIN_PEM.as_bytes(),
            SigningAlgorithm::Sha256WithRsa,
        )
        .unwrap_err();
        assert_eq!(err.kind(), SigningErrorKind::Sign);
        assert!(err.message().contains("does not match"));
        assert!(err.certificate().is_some());
    }

    #[test]
    fn test_missing_fields_named() {
        let builder = SignerConfig::builder()
            .attribute("repoCodeName", "demo")
            .attribute("repoDescription", "Demo Repo");
        assert_eq!(builder.missing_key(), Some(REPO_VERSION));

        let builder = builder
            .attribute(REPO_VERSION, "1.0")
            .signing_certs(LEAF_CHAIN_PEM);
        assert_eq!(builder.missing_key(), Some(SIGNING_KEY_KEY));

        let builder = builder.private_key(LEAF_KEY_PEM, PrivateKeyFormat::Pem);
        assert_eq!(builder.missing_key(), Some(SIGNATURE_KEY));

        let err = builder.build().unwrap_err();
        assert_eq!(err.kind(), SigningErrorKind::Sign);
        assert!(err.message().contains("missing signature"));
    }

    #[test]
    fn test_wrong_key_format() {
        let err = SignerConfig::new(
            attrs(),
            LEAF_KEY_PEM.as_bytes(),
            PrivateKeyFormat::Der,
            LEAF_CHAIN_PEM.as_bytes(),
            SigningAlgorithm::Sha256WithRsa,
        )
        .unwrap_err();
        assert!(err.message().contains("PKCS#8"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = SignerConfig::new(
            attrs(),
            LEAF_KEY_PEM.as_bytes(),
            PrivateKeyFormat::Pem,
            LEAF_CHAIN_PEM.as_bytes(),
            SigningAlgorithm::Sha256WithRsa,
        )
        .unwrap();
        assert!(format!("{:?}", config).contains("<redacted>"));
    }
}
