//! Error types for repository signing and verification.

use std::fmt;

use x509_cert::Certificate;

use crate::cert::subject_string;

/// Which side of the protocol failed.
///
/// `Sign` means a valid signature could not be produced (fix keys or
/// certificates). `Verify` means someone else's signature could not be
/// trusted: reject the repository and do not install from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningErrorKind {
    Sign,
    Verify,
}

impl fmt::Display for SigningErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sign => f.write_str("signing failed"),
            Self::Verify => f.write_str("verification failed"),
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Terminal error for every sign/verify operation.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct SigningError {
    kind: SigningErrorKind,
    message: String,
    certificate: Option<Box<Certificate>>,
    #[source]
    source: Option<BoxError>,
}

impl SigningError {
    /// Create an error of the given kind.
    pub fn new(kind: SigningErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            certificate: None,
            source: None,
        }
    }

    /// A failure to produce a signature.
    pub fn sign(message: impl Into<String>) -> Self {
        Self::new(SigningErrorKind::Sign, message)
    }

    /// A failure to trust a signature.
    pub fn verify(message: impl Into<String>) -> Self {
        Self::new(SigningErrorKind::Verify, message)
    }

    /// Attach the certificate that caused the failure.
    pub fn with_certificate(mut self, certificate: &Certificate) -> Self {
        self.certificate = Some(Box::new(certificate.clone()));
        self
    }

    /// Attach the lower-level cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> SigningErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The offending certificate, when known.
    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_deref()
    }

    /// Subject of the offending certificate, for audit logs.
    pub fn certificate_subject(&self) -> Option<String> {
        self.certificate().map(subject_string)
    }

    /// Whether this error means "do not install".
    pub fn is_security_failure(&self) -> bool {
        self.kind == SigningErrorKind::Verify
    }

    /// Exit code for CLI front-ends.
    pub fn exit_code(&self) -> i32 {
        match self.kind {
            // Operator / configuration problem
            SigningErrorKind::Sign => 1,
            // Security problem
            SigningErrorKind::Verify => 4,
        }
    }
}

/// Result type for signing operations.
pub type SigningResult<T> = Result<T, SigningError>;

/// Certificate decoding and encoding errors.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    /// No certificate found in the input.
    #[error("no certificate found in input")]
    Empty,

    /// A PEM block was malformed.
    #[error("malformed PEM block {index}: {reason}")]
    Pem { index: usize, reason: String },

    /// DER decoding failed.
    #[error("invalid DER certificate: {0}")]
    Der(#[from] der::Error),

    /// Reading the input failed.
    #[error("failed to read certificate input: {0}")]
    Io(#[from] std::io::Error),

    /// The certificate does not carry an RSA public key.
    #[error("certificate public key is not RSA: {0}")]
    NotRsa(String),
}

/// Truststore (keystore) decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    /// Unknown file signature.
    #[error("unrecognized keystore format (magic {magic:#010x})")]
    BadMagic { magic: u32 },

    /// Supported magic, unsupported version.
    #[error("unsupported keystore version {0}")]
    UnsupportedVersion(u32),

    /// Input ended before the structure was complete.
    #[error("keystore truncated while reading {0}")]
    Truncated(&'static str),

    /// Entry tag this reader does not understand.
    #[error("unsupported keystore entry tag {tag} for alias {alias}")]
    UnsupportedEntry { tag: u32, alias: String },

    /// Integrity digest did not match; usually a wrong password.
    #[error("keystore was tampered with, or password was incorrect")]
    IntegrityCheckFailed,

    /// A stored certificate could not be decoded.
    #[error("keystore entry {alias} holds an invalid certificate: {source}")]
    Certificate {
        alias: String,
        #[source]
        source: CertError,
    },

    /// A length does not fit the JKS field that carries it.
    #[error("keystore {field} too large for JKS ({len} bytes)")]
    TooLarge { field: &'static str, len: usize },

    /// Reading the keystore file failed.
    #[error("failed to read keystore: {0}")]
    Io(#[from] std::io::Error),

    /// Nothing usable found at any configured location.
    #[error("no default truststore found (looked in: {searched})")]
    NotFound { searched: String },
}

/// Single-step PKIX validation errors.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    /// Issuer of the certificate is not the anchor's subject.
    #[error("issuer {issuer} does not match anchor subject {anchor}")]
    NameChaining { issuer: String, anchor: String },

    /// Certificate signature algorithm is not supported.
    #[error("unsupported certificate signature algorithm {0}")]
    UnsupportedAlgorithm(String),

    /// Signature over the TBS certificate did not verify.
    #[error("certificate signature does not verify against anchor {anchor}")]
    BadSignature { anchor: String },

    /// Certificate outside its validity window.
    #[error("certificate {subject} not valid at check time (valid {not_before} to {not_after})")]
    Validity {
        subject: String,
        not_before: String,
        not_after: String,
    },

    /// Encoding the certificate or key failed.
    #[error("certificate encoding error: {0}")]
    Encoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        let err = SigningError::verify("package not found: app.zip");
        assert_eq!(
            err.to_string(),
            "verification failed: package not found: app.zip"
        );
        assert_eq!(err.kind(), SigningErrorKind::Verify);
        assert!(err.is_security_failure());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SigningError::sign("x").exit_code(), 1);
        assert_eq!(SigningError::verify("x").exit_code(), 4);
    }

    #[test]
    fn test_source_is_chained() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = SigningError::sign("cannot write index").with_source(io);
        let source = err.source().expect("source attached");
        assert_eq!(source.to_string(), "gone");
        assert!(err.certificate().is_none());
    }
}
