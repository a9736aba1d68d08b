//! Value types shared by the signing and verification paths.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SigningError, SigningResult};

/// Attribute key for the repository code name.
pub const REPO_CODE_NAME: &str = "repoCodeName";

/// Attribute key for the repository description.
pub const REPO_DESCRIPTION: &str = "repoDescription";

/// Attribute key for the repository version.
pub const REPO_VERSION: &str = "repoVersion";

/// Required repository attributes, in the order they appear in the index.
pub const ATTRIBUTE_KEYS: [&str; 3] = [REPO_CODE_NAME, REPO_DESCRIPTION, REPO_VERSION];

/// File name of the release index inside a signed repository.
pub const INDEX_FILE_NAME: &str = "release.index";

/// File name of the detached index signature.
pub const SIGNATURE_FILE_NAME: &str = "release.index.sig";

/// File name of the PEM certificate chain distributed with the index.
pub const CERT_FILE_NAME: &str = "release.index.pem";

/// Package content digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl DigestAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA256" => Ok(Self::Sha256),
            "SHA512" => Ok(Self::Sha512),
            other => Err(format!("unsupported digest algorithm: {}", other)),
        }
    }
}

/// Release-index signature algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    #[default]
    #[serde(rename = "SHA256withRSA")]
    Sha256WithRsa,
    #[serde(rename = "SHA512withRSA")]
    Sha512WithRsa,
}

impl SigningAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256WithRsa => "SHA256withRSA",
            Self::Sha512WithRsa => "SHA512withRSA",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("SHA256withRSA") {
            Ok(Self::Sha256WithRsa)
        } else if s.eq_ignore_ascii_case("SHA512withRSA") {
            Ok(Self::Sha512WithRsa)
        } else {
            Err(format!("unsupported signing algorithm: {}", s))
        }
    }
}

/// Encoding of the signer's PKCS#8 private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrivateKeyFormat {
    Pem,
    Der,
}

/// Text encoding of the release index. Only UTF-8 is produced or accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Charset {
    #[default]
    #[serde(rename = "UTF-8")]
    Utf8,
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            other => Err(format!("unsupported charset: {}", other)),
        }
    }
}

/// The three repository attributes carried at the top of a release index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoAttributes {
    #[serde(default)]
    pub repo_code_name: Option<String>,
    #[serde(default)]
    pub repo_description: Option<String>,
    #[serde(default)]
    pub repo_version: Option<String>,
}

impl RepoAttributes {
    /// All three attributes present.
    pub fn new(
        code_name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            repo_code_name: Some(code_name.into()),
            repo_description: Some(description.into()),
            repo_version: Some(version.into()),
        }
    }

    /// Look up an attribute by its index key.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            REPO_CODE_NAME => self.repo_code_name.as_deref(),
            REPO_DESCRIPTION => self.repo_description.as_deref(),
            REPO_VERSION => self.repo_version.as_deref(),
            _ => None,
        }
    }

    /// Set an attribute by its index key. Returns `false` for unknown keys.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        let slot = match key {
            REPO_CODE_NAME => &mut self.repo_code_name,
            REPO_DESCRIPTION => &mut self.repo_description,
            REPO_VERSION => &mut self.repo_version,
            _ => return false,
        };
        *slot = Some(value.into());
        true
    }

    /// First attribute key without a value.
    pub fn missing_key(&self) -> Option<&'static str> {
        ATTRIBUTE_KEYS.into_iter().find(|key| self.get(key).is_none())
    }

    /// Present attributes in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        ATTRIBUTE_KEYS
            .into_iter()
            .filter_map(move |key| self.get(key).map(|value| (key, value)))
    }
}

/// A signed release index as exchanged between signer and verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureWrapper {
    /// Exact index bytes that were signed.
    pub index: Vec<u8>,

    /// Detached signature over `index`.
    pub signature: Vec<u8>,

    /// Signing certificate chain (PEM or DER), attached by the caller.
    pub cert: Option<Vec<u8>>,
}

impl SignatureWrapper {
    pub fn new(index: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            index,
            signature,
            cert: None,
        }
    }

    /// Attach the signing certificate chain.
    pub fn with_cert(mut self, cert: impl Into<Vec<u8>>) -> Self {
        self.cert = Some(cert.into());
        self
    }

    /// Write index, signature and (if present) certificate into `dir`.
    pub fn write_to(&self, dir: &Path) -> SigningResult<()> {
        let write = |name: &str, bytes: &[u8]| {
            fs::write(dir.join(name), bytes).map_err(|e| {
                SigningError::sign(format!("failed to write {}: {}", name, e)).with_source(e)
            })
        };

        write(INDEX_FILE_NAME, &self.index)?;
        write(SIGNATURE_FILE_NAME, &self.signature)?;
        if let Some(cert) = &self.cert {
            write(CERT_FILE_NAME, cert)?;
        }
        Ok(())
    }

    /// Load a wrapper previously written with [`SignatureWrapper::write_to`].
    ///
    /// The certificate file is optional.
    pub fn read_from(dir: &Path) -> SigningResult<Self> {
        let read = |name: &str| {
            fs::read(dir.join(name)).map_err(|e| {
                SigningError::verify(format!("failed to read {}: {}", name, e)).with_source(e)
            })
        };

        let index = read(INDEX_FILE_NAME)?;
        let signature = read(SIGNATURE_FILE_NAME)?;
        let cert_path = dir.join(CERT_FILE_NAME);
        let cert = if cert_path.exists() {
            Some(read(CERT_FILE_NAME)?)
        } else {
            None
        };

        Ok(Self {
            index,
            signature,
            cert,
        })
    }
}
