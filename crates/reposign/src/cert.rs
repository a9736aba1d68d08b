//! X.509 certificate decoding and encoding.
//!
//! Pure format conversion: nothing here checks trust or validity.
//! Inputs may be a single DER certificate, several concatenated DER
//! certificates, or any number of PEM `CERTIFICATE` blocks (text between
//! blocks, such as `openssl x509 -text` output, is ignored).

use std::io::Read;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use der::{Decode, Encode, Reader, SliceReader};
use pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use x509_cert::time::Time;
use x509_cert::Certificate;

use crate::error::CertError;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";
const PEM_LINE_WIDTH: usize = 64;

/// Decode every certificate in `bytes`, preserving order.
pub fn decode_certificates(bytes: &[u8]) -> Result<Vec<Certificate>, CertError> {
    let certs = if looks_like_pem(bytes) {
        decode_pem_blocks(bytes)?
    } else {
        decode_der_sequence(bytes)?
    };

    if certs.is_empty() {
        return Err(CertError::Empty);
    }
    Ok(certs)
}

/// Decode the first certificate in `bytes`.
pub fn decode_certificate(bytes: &[u8]) -> Result<Certificate, CertError> {
    decode_certificates(bytes)?
        .into_iter()
        .next()
        .ok_or(CertError::Empty)
}

/// Decode every certificate from a stream.
pub fn read_certificates<R: Read>(mut reader: R) -> Result<Vec<Certificate>, CertError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    decode_certificates(&buf)
}

/// Encode certificates as concatenated PEM blocks.
pub fn encode_pem<'a, I>(certs: I) -> Result<String, CertError>
where
    I: IntoIterator<Item = &'a Certificate>,
{
    let mut out = String::new();
    for cert in certs {
        let body = BASE64.encode(cert.to_der()?);
        out.push_str(PEM_BEGIN);
        out.push('\n');
        // base64 output is ASCII, so byte chunks are valid str slices
        for line in body.as_bytes().chunks(PEM_LINE_WIDTH) {
            out.push_str(std::str::from_utf8(line).unwrap_or_default());
            out.push('\n');
        }
        out.push_str(PEM_END);
        out.push('\n');
    }
    Ok(out)
}

/// DER encoding of a single certificate.
pub fn encode_der(cert: &Certificate) -> Result<Vec<u8>, CertError> {
    Ok(cert.to_der()?)
}

/// RSA public key carried by the certificate.
pub fn rsa_public_key(cert: &Certificate) -> Result<RsaPublicKey, CertError> {
    let spki_der = cert.tbs_certificate.subject_public_key_info.to_der()?;
    RsaPublicKey::from_public_key_der(&spki_der).map_err(|e| CertError::NotRsa(e.to_string()))
}

/// RFC 4514 rendering of the subject name.
pub fn subject_string(cert: &Certificate) -> String {
    cert.tbs_certificate.subject.to_string()
}

/// RFC 4514 rendering of the issuer name.
pub fn issuer_string(cert: &Certificate) -> String {
    cert.tbs_certificate.issuer.to_string()
}

pub fn not_before(cert: &Certificate) -> DateTime<Utc> {
    to_datetime(&cert.tbs_certificate.validity.not_before)
}

pub fn not_after(cert: &Certificate) -> DateTime<Utc> {
    to_datetime(&cert.tbs_certificate.validity.not_after)
}

fn to_datetime(time: &Time) -> DateTime<Utc> {
    DateTime::<Utc>::from(time.to_system_time())
}

pub(crate) fn looks_like_pem(bytes: &[u8]) -> bool {
    bytes.windows(10).any(|w| w == b"-----BEGIN")
}

fn decode_der_sequence(bytes: &[u8]) -> Result<Vec<Certificate>, CertError> {
    let mut reader = SliceReader::new(bytes)?;
    let mut certs = Vec::new();
    while !reader.is_finished() {
        certs.push(Certificate::decode(&mut reader)?);
    }
    Ok(certs)
}

fn decode_pem_blocks(bytes: &[u8]) -> Result<Vec<Certificate>, CertError> {
    pem_bodies(bytes)?
        .iter()
        .map(|der| Certificate::from_der(der).map_err(CertError::from))
        .collect()
}

/// DER bodies of every PEM `CERTIFICATE` block, in order.
pub(crate) fn pem_bodies(bytes: &[u8]) -> Result<Vec<Vec<u8>>, CertError> {
    let text = String::from_utf8_lossy(bytes);
    let mut bodies = Vec::new();
    let mut body: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        match body.take() {
            None => {
                if line == PEM_BEGIN {
                    body = Some(String::new());
                }
            }
            Some(acc) if line == PEM_END => {
                let index = bodies.len();
                let der = BASE64.decode(acc.as_bytes()).map_err(|e| CertError::Pem {
                    index,
                    reason: format!("invalid base64 body: {}", e),
                })?;
                bodies.push(der);
            }
            Some(_) if line.starts_with("-----") => {
                return Err(CertError::Pem {
                    index: bodies.len(),
                    reason: format!("unexpected marker inside block: {}", line),
                });
            }
            Some(mut acc) => {
                acc.push_str(line);
                body = Some(acc);
            }
        }
    }

    if body.is_some() {
        return Err(CertError::Pem {
            index: bodies.len(),
            reason: format!("missing {}", PEM_END),
        });
    }
    Ok(bodies)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Self-signed RSA-2048 test certificate, CN=reposign-test.
    const TEST_CERT_PEM: &str = include_str!("../tests/data/self_signed.pem");

    #[test]
    fn test_decode_single_pem() {
        let certs = decode_certificates(TEST_CERT_PEM.as_bytes()).unwrap();
        assert_eq!(certs.len(), 1);
        assert!(subject_string(&certs[0]).contains("CN=reposign-test"));
    }

    #[test]
    fn test_concatenated_pem_with_text() {
        let input = format!(
            "Certificate:\n    Data: ...\n{}\nsome trailing text\n{}",
            TEST_CERT_PEM, TEST_CERT_PEM
        );
        let certs = decode_certificates(input.as_bytes()).unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0], certs[1]);
    }

    #[test]
    fn test_der_sequence() {
        let cert = decode_certificate(TEST_CERT_PEM.as_bytes()).unwrap();
        let der = encode_der(&cert).unwrap();
        let mut doubled = der.clone();
        doubled.extend_from_slice(&der);

        let certs = decode_certificates(&doubled).unwrap();
        assert_eq!(certs.len(), 2);
    }

    #[test]
    fn test_pem_reencode_is_stable() {
        let certs = decode_certificates(TEST_CERT_PEM.as_bytes()).unwrap();
        let pem = encode_pem(&certs).unwrap();
        assert!(pem.starts_with(PEM_BEGIN));
        assert!(pem.trim_end().ends_with(PEM_END));
        assert!(pem.lines().all(|l| l.len() <= PEM_LINE_WIDTH || l.starts_with("-----")));

        let again = decode_certificates(pem.as_bytes()).unwrap();
        assert_eq!(certs, again);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(decode_certificates(b""), Err(_)));
        assert!(decode_certificates(b"not a certificate").is_err());

        let truncated = format!("{}\nMIIB\n", PEM_BEGIN);
        assert!(matches!(
            decode_certificates(truncated.as_bytes()),
            Err(CertError::Pem { .. })
        ));
    }

    #[test]
    fn test_rsa_public_key_extracted() {
        use rsa::traits::PublicKeyParts;

        let cert = decode_certificate(TEST_CERT_PEM.as_bytes()).unwrap();
        let key = rsa_public_key(&cert).unwrap();
        assert_eq!(key.size(), 256);
    }
}
