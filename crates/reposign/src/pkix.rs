//! Single-step X.509 path validation.
//!
//! Validates a one-certificate path against exactly one trust anchor:
//! name chaining, RSA PKCS#1 v1.5 signature, and validity at the check
//! time. Revocation is not checked.

use chrono::{DateTime, Utc};
use der::oid::{AssociatedOid, ObjectIdentifier};
use der::Encode;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_cert::Certificate;

use crate::cert::{issuer_string, not_after, not_before, rsa_public_key, subject_string};
use crate::error::PathValidationError;

const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

/// Validate `cert` against `anchor` as sole trust anchor at time `now`.
pub fn validate_step(
    cert: &Certificate,
    anchor: &Certificate,
    now: DateTime<Utc>,
) -> Result<(), PathValidationError> {
    if cert.tbs_certificate.issuer != anchor.tbs_certificate.subject {
        return Err(PathValidationError::NameChaining {
            issuer: issuer_string(cert),
            anchor: subject_string(anchor),
        });
    }

    let anchor_key =
        rsa_public_key(anchor).map_err(|e| PathValidationError::Encoding(e.to_string()))?;
    if !verify_certificate_signature(cert, anchor_key)? {
        return Err(PathValidationError::BadSignature {
            anchor: subject_string(anchor),
        });
    }

    check_validity(cert, now)
}

/// Whether `cert` names itself as issuer and carries a signature made by its own key.
pub fn is_self_signed(cert: &Certificate) -> bool {
    if cert.tbs_certificate.issuer != cert.tbs_certificate.subject {
        return false;
    }
    match rsa_public_key(cert) {
        Ok(key) => verify_certificate_signature(cert, key).unwrap_or(false),
        Err(_) => false,
    }
}

/// Check that `now` falls inside the certificate's validity window.
pub fn check_validity(cert: &Certificate, now: DateTime<Utc>) -> Result<(), PathValidationError> {
    let from = not_before(cert);
    let until = not_after(cert);
    if now < from || now > until {
        return Err(PathValidationError::Validity {
            subject: subject_string(cert),
            not_before: from.to_rfc3339(),
            not_after: until.to_rfc3339(),
        });
    }
    Ok(())
}

/// Verify the signature over the TBS part of `cert` with `key`.
///
/// `Ok(false)` is a well-formed signature that does not verify.
fn verify_certificate_signature(
    cert: &Certificate,
    key: RsaPublicKey,
) -> Result<bool, PathValidationError> {
    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| PathValidationError::Encoding(e.to_string()))?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or_else(|| PathValidationError::Encoding("signature has unused bits".to_string()))?;

    let oid = cert.signature_algorithm.oid;
    let verified = if oid == SHA256_WITH_RSA {
        verify_with::<Sha256>(key, &tbs, signature)
    } else if oid == SHA384_WITH_RSA {
        verify_with::<Sha384>(key, &tbs, signature)
    } else if oid == SHA512_WITH_RSA {
        verify_with::<Sha512>(key, &tbs, signature)
    } else if oid == SHA1_WITH_RSA {
        verify_with::<Sha1>(key, &tbs, signature)
    } else {
        return Err(PathValidationError::UnsupportedAlgorithm(oid.to_string()));
    };
    Ok(verified)
}

fn verify_with<D>(key: RsaPublicKey, message: &[u8], signature: &[u8]) -> bool
where
    D: Digest + AssociatedOid,
{
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    VerifyingKey::<D>::new(key).verify(message, &signature).is_ok()
}
