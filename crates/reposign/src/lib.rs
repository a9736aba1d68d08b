//! Repository release-index signing and X.509 trust verification.
//!
//! A package repository publishes a signed manifest of its contents (the
//! release index); a consumer decides from it whether packages from that
//! repository may be installed.
//!
//! - Release index writer and parser
//! - RSA signing with a PKCS#8 key matched to its certificate
//! - Certificate pinning or chain validation against a JKS / PEM truststore
//! - Per-package digest checks
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use reposign::{
//!     repo_validator, sign_repo, PrivateKeyFormat, RepoAttributes, SignerConfig,
//!     SigningAlgorithm, ValidatorConfig,
//! };
//!
//! # fn example() -> reposign::SigningResult<()> {
//! let key = std::fs::read("signing-key.pem").unwrap();
//! let chain = std::fs::read("signing-chain.pem").unwrap();
//!
//! let config = SignerConfig::new(
//!     RepoAttributes::new("demo", "Demo Repo", "1.0"),
//!     &key,
//!     PrivateKeyFormat::Pem,
//!     &chain,
//!     SigningAlgorithm::Sha256WithRsa,
//! )?;
//! let signed = sign_repo(Path::new("repo"), &config)?.with_cert(chain.clone());
//!
//! let mut validator = ValidatorConfig::new();
//! validator.set_signing_cert(&chain, SigningAlgorithm::Sha256WithRsa)?;
//! validator.setup_default_truststore();
//!
//! let signer = repo_validator(validator, &signed.index, &signed.signature, None)?;
//! signer.validate_package_file(Path::new("repo/app-1.0.0.zip"))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Every operation fails with a [`SigningError`]. Its kind separates
//! [`SigningErrorKind::Sign`] (could not produce a signature: fix keys or
//! certificates) from [`SigningErrorKind::Verify`] (could not trust a
//! signature: do not install).
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `REPOSIGN_TRUSTSTORE` | Explicit truststore (JKS or PEM bundle) |
//! | `REPOSIGN_TRUSTSTORE_PASSWORD` | Truststore password (default: `changeit`) |
//! | `REPOSIGN_RUNTIME_HOME` | Runtime home holding `lib/security/cacerts` (falls back to `JAVA_HOME`) |
//! | `REPOSIGN_CA_BUNDLE` | OS CA bundle used when no runtime keystore exists |

pub mod cert;
pub mod chain;
pub mod config;
mod digest;
pub mod error;
pub mod index;
pub mod keystore;
pub mod pkix;
pub mod settings;
pub mod signer;
pub mod types;

// Re-export main types
pub use chain::{CertChainValidator, MAX_TRUST_DEPTH};
pub use config::{BaseConfig, SignerConfig, SignerConfigBuilder, ValidatorConfig};
pub use error::{
    CertError, KeystoreError, PathValidationError, SigningError, SigningErrorKind, SigningResult,
};
pub use index::{PackageDigest, ReleaseIndex, PACKAGE_DIGESTS_SEPARATOR};
pub use keystore::{TrustStore, TrustedEntry};
pub use settings::TrustSettings;
pub use signer::{repo_validator, sign_repo, Signer};
pub use types::{
    Charset, DigestAlgorithm, PrivateKeyFormat, RepoAttributes, SignatureWrapper,
    SigningAlgorithm, CERT_FILE_NAME, INDEX_FILE_NAME, SIGNATURE_FILE_NAME,
};
