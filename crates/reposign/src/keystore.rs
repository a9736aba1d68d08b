//! Trust anchor store.
//!
//! Anchors come from a JKS keystore (the runtime `cacerts` convention) or a
//! PEM CA bundle. Only trusted-certificate entries are used; private-key
//! entries in a JKS file are skipped, a truststore is never signing material.
//!
//! # JKS layout
//!
//! ```text
//! u32 magic (0xFEEDFEED, or 0xCECECECE for JCEKS)
//! u32 version (1 or 2)
//! u32 entry count
//! entries:
//!   u32 tag (1 = private key, 2 = trusted certificate, 3 = secret key)
//!   UTF alias, u64 timestamp (ms)
//!   tag 2: [v2: UTF cert type] u32 len, cert bytes
//!   tag 1: u32 len, key bytes, u32 chain len, chain certs as for tag 2
//! 20 bytes SHA-1(password as UTF-16BE || "Mighty Aphrodite" || everything above)
//! ```

use std::fs;
use std::path::Path;

use sha1::{Digest, Sha1};
use tracing::{debug, warn};
use x509_cert::Certificate;

use crate::cert::{decode_certificate, encode_der, looks_like_pem, pem_bodies, subject_string};
use crate::error::KeystoreError;
use crate::settings::TrustSettings;

const JKS_MAGIC: u32 = 0xFEED_FEED;
const JCEKS_MAGIC: u32 = 0xCECE_CECE;
const JKS_VERSION_1: u32 = 1;
const JKS_VERSION_2: u32 = 2;
const TAG_PRIVATE_KEY: u32 = 1;
const TAG_TRUSTED_CERT: u32 = 2;
const INTEGRITY_SALT: &[u8] = b"Mighty Aphrodite";
const INTEGRITY_LEN: usize = 20;
const X509_TYPE: &str = "X.509";

/// A trusted certificate and the alias it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedEntry {
    pub alias: String,
    pub certificate: Certificate,
}

/// Ordered set of trust anchors.
///
/// Iteration follows the order entries were read or added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustStore {
    entries: Vec<TrustedEntry>,
}

impl TrustStore {
    /// Create an empty trust store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from certificates, with generated aliases.
    pub fn from_certificates<I>(certs: I) -> Self
    where
        I: IntoIterator<Item = Certificate>,
    {
        let mut store = Self::new();
        for (i, cert) in certs.into_iter().enumerate() {
            store.add(format!("cert-{}", i), cert);
        }
        store
    }

    /// Decode a keystore, detecting JKS/JCEKS or PEM from its contents.
    ///
    /// The password is only used for the JKS integrity check; `None` skips it.
    pub fn load(bytes: &[u8], password: Option<&str>) -> Result<Self, KeystoreError> {
        match read_magic(bytes) {
            Some(JKS_MAGIC | JCEKS_MAGIC) => Self::from_jks(bytes, password),
            _ if looks_like_pem(bytes) => Self::from_pem(bytes),
            Some(magic) => Err(KeystoreError::BadMagic { magic }),
            None => Err(KeystoreError::Truncated("magic")),
        }
    }

    /// Read and decode a keystore file.
    pub fn from_path(path: &Path, password: Option<&str>) -> Result<Self, KeystoreError> {
        let bytes = fs::read(path)?;
        Self::load(&bytes, password)
    }

    /// Load the platform default truststore.
    ///
    /// An explicitly configured truststore must load. Otherwise each
    /// candidate location is tried in turn and unreadable ones are skipped.
    pub fn platform_default(settings: &TrustSettings) -> Result<Self, KeystoreError> {
        let password = Some(settings.truststore_password.as_str());

        if let Some(path) = &settings.truststore_path {
            return Self::from_path(path, password);
        }

        let candidates = settings.truststore_candidates();
        for path in &candidates {
            if !path.is_file() {
                continue;
            }
            match Self::from_path(path, password) {
                Ok(store) => {
                    debug!(path = %path.display(), anchors = store.len(), "loaded default truststore");
                    return Ok(store);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable truststore");
                }
            }
        }

        Err(KeystoreError::NotFound {
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Decode a PEM CA bundle.
    ///
    /// Blocks that do not decode as certificates are skipped with a warning,
    /// OS bundles occasionally carry encodings a strict DER parser refuses.
    pub fn from_pem(bytes: &[u8]) -> Result<Self, KeystoreError> {
        let bodies = pem_bodies(bytes).map_err(|source| KeystoreError::Certificate {
            alias: "pem".to_string(),
            source,
        })?;

        let mut store = Self::new();
        for (i, der) in bodies.iter().enumerate() {
            let alias = format!("pem-{}", i);
            match decode_certificate(der) {
                Ok(cert) => store.add(alias, cert),
                Err(e) => warn!(alias = %alias, error = %e, "skipping undecodable CA certificate"),
            }
        }
        Ok(store)
    }

    /// Decode a JKS (or JCEKS) keystore.
    pub fn from_jks(bytes: &[u8], password: Option<&str>) -> Result<Self, KeystoreError> {
        if let Some(password) = password {
            check_integrity(bytes, password)?;
        }

        let mut reader = JksReader::new(bytes);
        let magic = reader.u32("magic")?;
        if magic != JKS_MAGIC && magic != JCEKS_MAGIC {
            return Err(KeystoreError::BadMagic { magic });
        }
        let version = reader.u32("version")?;
        if version != JKS_VERSION_1 && version != JKS_VERSION_2 {
            return Err(KeystoreError::UnsupportedVersion(version));
        }

        let count = reader.u32("entry count")?;
        let mut store = Self::new();
        for _ in 0..count {
            let tag = reader.u32("entry tag")?;
            let alias = reader.utf("alias")?;
            let _timestamp = reader.u64("timestamp")?;

            match tag {
                TAG_TRUSTED_CERT => {
                    let der = reader.cert(version)?;
                    let cert = decode_certificate(der).map_err(|source| {
                        KeystoreError::Certificate {
                            alias: alias.clone(),
                            source,
                        }
                    })?;
                    store.add(alias, cert);
                }
                TAG_PRIVATE_KEY => {
                    let key_len = reader.u32("key length")? as usize;
                    reader.bytes(key_len, "key")?;
                    let chain_len = reader.u32("chain length")?;
                    for _ in 0..chain_len {
                        reader.cert(version)?;
                    }
                    warn!(alias = %alias, "ignoring private key entry in truststore");
                }
                tag => return Err(KeystoreError::UnsupportedEntry { tag, alias }),
            }
        }

        Ok(store)
    }

    /// Encode the store as a JKS v2 trusted-certificate keystore.
    pub fn to_jks(&self, password: &str) -> Result<Vec<u8>, KeystoreError> {
        let mut out = Vec::new();
        out.extend_from_slice(&JKS_MAGIC.to_be_bytes());
        out.extend_from_slice(&JKS_VERSION_2.to_be_bytes());
        out.extend_from_slice(&jks_u32("entry count", self.entries.len())?.to_be_bytes());

        let timestamp = chrono::Utc::now().timestamp_millis() as u64;
        for entry in &self.entries {
            let der = encode_der(&entry.certificate).map_err(|source| {
                KeystoreError::Certificate {
                    alias: entry.alias.clone(),
                    source,
                }
            })?;
            out.extend_from_slice(&TAG_TRUSTED_CERT.to_be_bytes());
            write_utf(&mut out, "alias", &entry.alias)?;
            out.extend_from_slice(&timestamp.to_be_bytes());
            write_utf(&mut out, "certificate type", X509_TYPE)?;
            out.extend_from_slice(&jks_u32("certificate", der.len())?.to_be_bytes());
            out.extend_from_slice(&der);
        }

        let digest = integrity_digest(&out, password);
        out.extend_from_slice(&digest);
        Ok(out)
    }

    /// Add a trusted certificate. An existing alias is replaced in place.
    pub fn add(&mut self, alias: impl Into<String>, certificate: Certificate) {
        let alias = alias.into();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.alias == alias) {
            existing.certificate = certificate;
            return;
        }
        debug!(alias = %alias, subject = %subject_string(&certificate), "added trust anchor");
        self.entries.push(TrustedEntry { alias, certificate });
    }

    pub fn entries(&self) -> &[TrustedEntry] {
        &self.entries
    }

    pub fn certificates(&self) -> impl Iterator<Item = &Certificate> + '_ {
        self.entries.iter().map(|e| &e.certificate)
    }

    pub fn get(&self, alias: &str) -> Option<&Certificate> {
        self.entries
            .iter()
            .find(|e| e.alias == alias)
            .map(|e| &e.certificate)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_magic(bytes: &[u8]) -> Option<u32> {
    let head: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(head))
}

fn integrity_digest(data: &[u8], password: &str) -> [u8; INTEGRITY_LEN] {
    let mut hasher = Sha1::new();
    for unit in password.encode_utf16() {
        hasher.update(unit.to_be_bytes());
    }
    hasher.update(INTEGRITY_SALT);
    hasher.update(data);
    hasher.finalize().into()
}

fn check_integrity(bytes: &[u8], password: &str) -> Result<(), KeystoreError> {
    if bytes.len() < INTEGRITY_LEN {
        return Err(KeystoreError::Truncated("integrity digest"));
    }
    let (data, expected) = bytes.split_at(bytes.len() - INTEGRITY_LEN);
    if integrity_digest(data, password).as_slice() != expected {
        return Err(KeystoreError::IntegrityCheckFailed);
    }
    Ok(())
}

fn jks_u32(field: &'static str, len: usize) -> Result<u32, KeystoreError> {
    u32::try_from(len).map_err(|_| KeystoreError::TooLarge { field, len })
}

fn write_utf(out: &mut Vec<u8>, field: &'static str, value: &str) -> Result<(), KeystoreError> {
    let bytes = value.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| KeystoreError::TooLarge {
        field,
        len: bytes.len(),
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

struct JksReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> JksReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], KeystoreError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(KeystoreError::Truncated(what))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], KeystoreError> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.bytes(N, what)?);
        Ok(out)
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, KeystoreError> {
        self.array(what).map(u16::from_be_bytes)
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, KeystoreError> {
        self.array(what).map(u32::from_be_bytes)
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, KeystoreError> {
        self.array(what).map(u64::from_be_bytes)
    }

    /// Java modified UTF-8 string. Aliases are ASCII in practice.
    fn utf(&mut self, what: &'static str) -> Result<String, KeystoreError> {
        let len = self.u16(what)? as usize;
        let bytes = self.bytes(len, what)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn cert(&mut self, version: u32) -> Result<&'a [u8], KeystoreError> {
        if version == JKS_VERSION_2 {
            let cert_type = self.utf("certificate type")?;
            if cert_type != X509_TYPE {
                debug!(cert_type = %cert_type, "non X.509 certificate type in keystore");
            }
        }
        let len = self.u32("certificate length")? as usize;
        self.bytes(len, "certificate")
    }
}
