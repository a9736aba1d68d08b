use std::collections::BTreeMap;
use std::fmt;

use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha512};
use tracing::debug;

use super::{BaseConfig, SIGNATURE_KEY};
use crate::cert::rsa_public_key;
use crate::chain::CertChainValidator;
use crate::error::{SigningError, SigningErrorKind, SigningResult};
use crate::keystore::TrustStore;
use crate::settings::TrustSettings;
use crate::types::{Charset, DigestAlgorithm, SigningAlgorithm};

/// Public key primed for one signature algorithm.
enum RepoVerifyingKey {
    Sha256(VerifyingKey<Sha256>),
    Sha512(VerifyingKey<Sha512>),
}

impl RepoVerifyingKey {
    fn new(algorithm: SigningAlgorithm, key: RsaPublicKey) -> Self {
        match algorithm {
            SigningAlgorithm::Sha256WithRsa => Self::Sha256(VerifyingKey::new(key)),
            SigningAlgorithm::Sha512WithRsa => Self::Sha512(VerifyingKey::new(key)),
        }
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), rsa::signature::Error> {
        let signature = Signature::try_from(signature)?;
        match self {
            Self::Sha256(key) => key.verify(message, &signature),
            Self::Sha512(key) => key.verify(message, &signature),
        }
    }
}

/// Where trust anchors come from.
#[derive(Debug, Clone)]
enum TrustSource {
    Keystore(Vec<u8>),
    Platform(TrustSettings),
    Anchors(TrustStore),
}

/// Verification configuration.
///
/// The caller supplies the signing chain and, optionally, a truststore.
/// Repository attributes and package digests are filled in from the release
/// index once its signature has been checked.
pub struct ValidatorConfig {
    base: BaseConfig,
    signing_cert_bytes: Option<Vec<u8>>,
    algorithm: Option<SigningAlgorithm>,
    verifying_key: Option<RepoVerifyingKey>,
    trust_source: Option<TrustSource>,
    trust_store_password: Option<String>,
    chain_validator: Option<CertChainValidator>,
    pkg_digests: BTreeMap<String, String>,
}

impl fmt::Debug for ValidatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorConfig")
            .field("base", &self.base)
            .field("algorithm", &self.algorithm)
            .field("trust_source", &self.trust_source)
            .field("packages", &self.pkg_digests.len())
            .finish()
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorConfig {
    /// Empty configuration using SHA-256 package digests and UTF-8 text.
    pub fn new() -> Self {
        let mut base = BaseConfig::new();
        base.set_digest(DigestAlgorithm::Sha256);
        base.set_charset(Charset::Utf8);
        Self {
            base,
            signing_cert_bytes: None,
            algorithm: None,
            verifying_key: None,
            trust_source: None,
            trust_store_password: None,
            chain_validator: None,
            pkg_digests: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> &BaseConfig {
        &self.base
    }

    pub(crate) fn base_mut(&mut self) -> &mut BaseConfig {
        &mut self.base
    }

    pub fn set_digest(&mut self, digest: DigestAlgorithm) {
        self.base.set_digest(digest);
    }

    /// Set the signing certificate chain (leaf first) and the algorithm the
    /// index was signed with.
    pub fn set_signing_cert(&mut self, bytes: &[u8], algorithm: SigningAlgorithm) -> SigningResult<()> {
        self.base.set_signing_certs(bytes, SigningErrorKind::Verify)?;

        let leaf = self
            .base
            .signing_cert()
            .ok_or_else(|| SigningError::verify("signing certificate chain is empty"))?;
        let public_key = rsa_public_key(leaf).map_err(|e| {
            SigningError::verify(format!("unusable signing certificate: {}", e))
                .with_certificate(leaf)
                .with_source(e)
        })?;

        self.signing_cert_bytes = Some(bytes.to_vec());
        self.algorithm = Some(algorithm);
        self.verifying_key = Some(RepoVerifyingKey::new(algorithm, public_key));
        Ok(())
    }

    /// Raw chain bytes exactly as supplied.
    pub fn signing_cert_bytes(&self) -> Option<&[u8]> {
        self.signing_cert_bytes.as_deref()
    }

    pub fn algorithm(&self) -> Option<SigningAlgorithm> {
        self.algorithm
    }

    /// Use an explicit keystore (JKS or PEM bundle) as truststore.
    pub fn set_trust_store(&mut self, bytes: impl Into<Vec<u8>>) {
        self.trust_source = Some(TrustSource::Keystore(bytes.into()));
        self.chain_validator = None;
    }

    /// Password for the keystore given to [`set_trust_store`](Self::set_trust_store).
    pub fn set_trust_store_password(&mut self, password: impl Into<String>) {
        self.trust_store_password = Some(password.into());
        self.chain_validator = None;
    }

    /// Use already decoded trust anchors.
    pub fn set_trust_anchors(&mut self, store: TrustStore) {
        self.trust_source = Some(TrustSource::Anchors(store));
        self.chain_validator = None;
    }

    /// Use the platform default truststore located through the environment.
    pub fn setup_default_truststore(&mut self) {
        self.setup_default_truststore_with(TrustSettings::from_env());
    }

    /// Use the platform default truststore located through `settings`.
    pub fn setup_default_truststore_with(&mut self, settings: TrustSettings) {
        self.trust_source = Some(TrustSource::Platform(settings));
        self.chain_validator = None;
    }

    pub fn has_trust_store(&self) -> bool {
        self.trust_source.is_some()
    }

    /// Chain validator for the configured truststore, built on first use.
    ///
    /// `None` when no truststore was configured: trust then rests on
    /// certificate pinning alone. An unreadable keystore or wrong password
    /// is a VERIFY error.
    pub fn cert_chain_validator(&mut self) -> SigningResult<Option<&CertChainValidator>> {
        if self.chain_validator.is_none() {
            let validator = match &self.trust_source {
                None => return Ok(None),
                Some(TrustSource::Keystore(bytes)) => {
                    CertChainValidator::from_keystore_bytes(bytes, self.trust_store_password.as_deref())
                }
                Some(TrustSource::Platform(settings)) => {
                    CertChainValidator::from_platform_default(settings)
                }
                Some(TrustSource::Anchors(store)) => {
                    Ok(CertChainValidator::from_trust_store(store.clone()))
                }
            }
            .map_err(|e| {
                SigningError::verify(format!("cannot load truststore: {}", e)).with_source(e)
            })?;

            debug!(anchors = validator.trust_store().len(), "truststore loaded");
            self.chain_validator = Some(validator);
        }
        Ok(self.chain_validator.as_ref())
    }

    /// Name of the first required field without a value.
    pub fn missing_key(&self) -> Option<&'static str> {
        self.base.missing_key().or_else(|| {
            if self.verifying_key.is_none() {
                Some(SIGNATURE_KEY)
            } else {
                None
            }
        })
    }

    /// Expected digests by package file name.
    pub fn package_digests(&self) -> &BTreeMap<String, String> {
        &self.pkg_digests
    }

    /// Record a package digest. Returns `false` if the name was already present.
    pub(crate) fn insert_package_digest(&mut self, name: String, digest: String) -> bool {
        if self.pkg_digests.contains_key(&name) {
            return false;
        }
        self.pkg_digests.insert(name, digest);
        true
    }

    pub(crate) fn verify_signature(&self, message: &[u8], signature: &[u8]) -> SigningResult<()> {
        let key = self
            .verifying_key
            .as_ref()
            .ok_or_else(|| SigningError::verify("no signing certificate configured"))?;
        key.verify(message, signature).map_err(|e| {
            let err = SigningError::verify("release index signature does not verify").with_source(e);
            match self.base.signing_cert() {
                Some(cert) => err.with_certificate(cert),
                None => err,
            }
        })
    }
}
