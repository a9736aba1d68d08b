//! Repository signing and verification.
//!
//! [`sign_repo`] digests every package under a directory, writes the release
//! index and signs it. [`repo_validator`] decides whether a signed index can
//! be trusted and returns a [`Signer`] that checks individual packages
//! against it.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use rsa::traits::PublicKeyParts;
use tracing::{debug, info};
use walkdir::WalkDir;
use x509_cert::Certificate;

use crate::cert::{decode_certificate, not_after, not_before, rsa_public_key, subject_string};
use crate::config::{SignerConfig, ValidatorConfig};
use crate::digest::{hex_digest, hex_digest_reader};
use crate::error::{SigningError, SigningResult};
use crate::index::{PackageDigest, ReleaseIndex};
use crate::types::{DigestAlgorithm, RepoAttributes, SignatureWrapper, INDEX_FILE_NAME};

/// Package file extensions picked up by [`sign_repo`].
pub const PACKAGE_EXTENSIONS: [&str; 2] = ["jar", "zip"];

/// Sign every `*.jar` and `*.zip` package under `path`.
///
/// Packages are found recursively and listed in path order under their file
/// name. The index is written to `path/release.index` and the exact bytes
/// written are signed. Any failure is a SIGN error, including package names
/// or attribute values the index format cannot carry.
pub fn sign_repo(path: &Path, config: &SignerConfig) -> SigningResult<SignatureWrapper> {
    if let Some(key) = config.missing_key() {
        return Err(SigningError::sign(format!(
            "incomplete signer configuration: missing {}",
            key
        )));
    }

    let packages = find_packages(path)?;
    let mut index = ReleaseIndex::new(config.attributes().clone());
    let mut names: HashMap<String, PathBuf> = HashMap::new();

    for package in &packages {
        let name = package
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SigningError::sign(format!("package path has no file name: {}", package.display()))
            })?;
        if let Some(first) = names.insert(name.clone(), package.clone()) {
            return Err(SigningError::sign(format!(
                "duplicate package name {}: {} and {}",
                name,
                first.display(),
                package.display()
            )));
        }

        let file = File::open(package).map_err(|e| {
            SigningError::sign(format!("cannot open package {}: {}", package.display(), e))
                .with_source(e)
        })?;
        let digest = hex_digest_reader(config.digest(), BufReader::new(file)).map_err(|e| {
            SigningError::sign(format!("cannot read package {}: {}", package.display(), e))
                .with_source(e)
        })?;
        debug!(package = %name, digest = %digest, "package digested");
        index.packages.push(PackageDigest::new(name, digest));
    }

    if let Some(reason) = index.unrenderable() {
        return Err(SigningError::sign(format!(
            "cannot write release index: {}",
            reason
        )));
    }

    let text = index.render();
    let index_path = path.join(INDEX_FILE_NAME);
    fs::write(&index_path, text.as_bytes()).map_err(|e| {
        SigningError::sign(format!("cannot write {}: {}", index_path.display(), e)).with_source(e)
    })?;

    let index_bytes = text.into_bytes();
    let signature = config.sign(&index_bytes)?;

    info!(
        path = %path.display(),
        packages = index.packages.len(),
        algorithm = %config.algorithm(),
        "repository signed"
    );
    Ok(SignatureWrapper::new(index_bytes, signature))
}

fn find_packages(path: &Path) -> SigningResult<Vec<PathBuf>> {
    let mut packages = Vec::new();
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| {
            SigningError::sign(format!("cannot walk repository {}: {}", path.display(), e))
                .with_source(e)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_package = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| PACKAGE_EXTENSIONS.contains(&ext));
        if is_package {
            packages.push(entry.into_path());
        }
    }
    packages.sort();
    Ok(packages)
}

/// Decide whether a signed release index can be trusted.
///
/// With `pinned_cert`, trust rests on that certificate alone: its RSA key
/// must equal the signing certificate's key, and chain and expiry checks are
/// skipped, so an expired pinned certificate is still accepted. Without it
/// the chain is validated against the configured truststore (if any) and the
/// signing certificate must be currently valid.
///
/// The signature is then checked over the exact `index` bytes, the index is
/// parsed into `config`, and the completed configuration must have no
/// missing field. Every failure is a VERIFY error.
pub fn repo_validator(
    mut config: ValidatorConfig,
    index: &[u8],
    signature: &[u8],
    pinned_cert: Option<&[u8]>,
) -> SigningResult<Signer> {
    let leaf = config
        .base()
        .signing_cert()
        .cloned()
        .ok_or_else(|| SigningError::verify("no signing certificate configured"))?;

    match pinned_cert {
        Some(pinned) => check_pinned(pinned, &leaf)?,
        None => {
            let chain = config.signing_cert_bytes().map(<[u8]>::to_vec);
            if let (Some(validator), Some(chain)) = (config.cert_chain_validator()?, chain) {
                if !validator.validate_key_chain(&chain) {
                    return Err(SigningError::verify(format!(
                        "signing certificate {} is not trusted",
                        subject_string(&leaf)
                    ))
                    .with_certificate(&leaf));
                }
            }
            check_current(&leaf)?;
        }
    }

    config.verify_signature(index, signature)?;

    let text = std::str::from_utf8(index).map_err(|e| {
        SigningError::verify("release index is not valid UTF-8").with_source(e)
    })?;
    let parsed = ReleaseIndex::parse(text)?;
    let package_count = parsed.packages.len();
    config.base_mut().set_attributes(parsed.attributes);
    for package in parsed.packages {
        if !config.insert_package_digest(package.name.clone(), package.digest) {
            return Err(SigningError::verify(format!(
                "duplicate package {} in release index",
                package.name
            )));
        }
    }

    if let Some(key) = config.missing_key() {
        return Err(SigningError::verify(format!(
            "incomplete release index: missing {}",
            key
        )));
    }
    let digest = config
        .base()
        .digest()
        .ok_or_else(|| SigningError::verify("incomplete release index: missing digest"))?;

    info!(
        subject = %subject_string(&leaf),
        packages = package_count,
        pinned = pinned_cert.is_some(),
        "repository verified"
    );
    Ok(Signer { config, digest })
}

fn check_pinned(pinned: &[u8], leaf: &Certificate) -> SigningResult<()> {
    let pinned = decode_certificate(pinned).map_err(|e| {
        SigningError::verify(format!("cannot parse pinned certificate: {}", e)).with_source(e)
    })?;
    let pinned_key = rsa_public_key(&pinned).map_err(|e| {
        SigningError::verify(format!("unusable pinned certificate: {}", e))
            .with_certificate(&pinned)
            .with_source(e)
    })?;
    let leaf_key = rsa_public_key(leaf).map_err(|e| {
        SigningError::verify(format!("unusable signing certificate: {}", e))
            .with_certificate(leaf)
            .with_source(e)
    })?;

    if pinned_key.n() != leaf_key.n() || pinned_key.e() != leaf_key.e() {
        return Err(SigningError::verify(format!(
            "signing certificate {} does not match pinned certificate {}",
            subject_string(leaf),
            subject_string(&pinned)
        ))
        .with_certificate(leaf));
    }

    debug!(subject = %subject_string(leaf), "pinned certificate matched, skipping chain checks");
    Ok(())
}

fn check_current(leaf: &Certificate) -> SigningResult<()> {
    let now = Utc::now();
    let expires = not_after(leaf);
    if now > expires {
        return Err(SigningError::verify(format!(
            "signing certificate {} expired on {}",
            subject_string(leaf),
            expires.format("%Y-%m-%d %H:%M:%S UTC")
        ))
        .with_certificate(leaf));
    }
    let starts = not_before(leaf);
    if now < starts {
        return Err(SigningError::verify(format!(
            "signing certificate {} is not valid before {}",
            subject_string(leaf),
            starts.format("%Y-%m-%d %H:%M:%S UTC")
        ))
        .with_certificate(leaf));
    }
    Ok(())
}

/// A verified release index, ready to check packages against.
#[derive(Debug)]
pub struct Signer {
    config: ValidatorConfig,
    digest: DigestAlgorithm,
}

impl Signer {
    /// Check package bytes against the digest listed for `name`.
    ///
    /// An unlisted name is a VERIFY error, as is any digest mismatch.
    pub fn validate_package(&self, bytes: &[u8], name: &str) -> SigningResult<()> {
        let expected = self.expected_digest(name)?;
        self.compare(name, expected, hex_digest(self.digest, bytes))
    }

    /// Like [`validate_package`](Self::validate_package), hashing a stream.
    pub fn validate_package_reader<R: Read>(&self, reader: R, name: &str) -> SigningResult<()> {
        let expected = self.expected_digest(name)?;
        let actual = hex_digest_reader(self.digest, reader).map_err(|e| {
            SigningError::verify(format!("cannot read package {}: {}", name, e)).with_source(e)
        })?;
        self.compare(name, expected, actual)
    }

    /// Validate a package file, looked up by its file name.
    pub fn validate_package_file(&self, path: &Path) -> SigningResult<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SigningError::verify(format!("package path has no file name: {}", path.display()))
            })?;
        let file = File::open(path).map_err(|e| {
            SigningError::verify(format!("cannot open package {}: {}", path.display(), e))
                .with_source(e)
        })?;
        self.validate_package_reader(BufReader::new(file), &name)
    }

    fn expected_digest(&self, name: &str) -> SigningResult<&str> {
        self.config
            .package_digests()
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| SigningError::verify(format!("package not found: {}", name)))
    }

    fn compare(&self, name: &str, expected: &str, actual: String) -> SigningResult<()> {
        // Exact match: the index stores lowercase hex.
        if actual != expected {
            return Err(SigningError::verify(format!(
                "digest mismatch for {}: expected {}, got {}",
                name, expected, actual
            )));
        }
        debug!(package = %name, "package digest verified");
        Ok(())
    }

    pub fn attributes(&self) -> &RepoAttributes {
        self.config.base().attributes()
    }

    pub fn package_digests(&self) -> &BTreeMap<String, String> {
        self.config.package_digests()
    }

    /// The leaf certificate the index was signed with.
    pub fn signing_certificate(&self) -> Option<&Certificate> {
        self.config.base().signing_cert()
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SigningErrorKind;
    use crate::types::{PrivateKeyFormat, SigningAlgorithm};

    const LEAF_KEY_PEM: &str = include_str!("../tests/data/leaf_key.pem");
    const LEAF_CHAIN_PEM: &str = include_str!("../tests/data/leaf_chain.pem");

    fn signer_config() -> SignerConfig {
        SignerConfig::new(
            RepoAttributes::new("demo", "Demo Repo", "1.0"),
            LEAF_KEY_PEM.as_bytes(),
            PrivateKeyFormat::Pem,
            LEAF_CHAIN_PEM.as_bytes(),
            SigningAlgorithm::Sha256WithRsa,
        )
        .unwrap()
    }

    fn validator_config() -> ValidatorConfig {
        let mut config = ValidatorConfig::new();
        config
            .set_signing_cert(LEAF_CHAIN_PEM.as_bytes(), SigningAlgorithm::Sha256WithRsa)
            .unwrap();
        config
    }

    #[test]
    fn test_find_packages_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/z.jar"), b"z").unwrap();
        fs::write(dir.path().join("a.zip"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"n").unwrap();
        fs::write(dir.path().join("c.ZIP"), b"c").unwrap();

        let found = find_packages(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("a.zip"), dir.path().join("b/z.jar")]
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("x")).unwrap();
        fs::create_dir_all(dir.path().join("y")).unwrap();
        fs::write(dir.path().join("x/app.zip"), b"1").unwrap();
        fs::write(dir.path().join("y/app.zip"), b"2").unwrap();

        let err = sign_repo(dir.path(), &signer_config()).unwrap_err();
        assert_eq!(err.kind(), SigningErrorKind::Sign);
        assert!(err.message().contains("duplicate package name app.zip"));
    }

    #[test]
    fn test_sign_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app-1.0.0.zip"), b"payload").unwrap();

        let wrapper = sign_repo(dir.path(), &signer_config()).unwrap();
        assert_eq!(
            fs::read(dir.path().join(INDEX_FILE_NAME)).unwrap(),
            wrapper.index
        );

        let signer =
            repo_validator(validator_config(), &wrapper.index, &wrapper.signature, None).unwrap();
        signer.validate_package(b"payload", "app-1.0.0.zip").unwrap();
        signer
            .validate_package_file(&dir.path().join("app-1.0.0.zip"))
            .unwrap();
        assert_eq!(signer.attributes().repo_code_name.as_deref(), Some("demo"));
        assert_eq!(signer.digest_algorithm(), DigestAlgorithm::Sha256);
    }

    #[test]
    fn test_uppercase_digest_does_not_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.zip"), b"payload").unwrap();
        let wrapper = sign_repo(dir.path(), &signer_config()).unwrap();

        let signer =
            repo_validator(validator_config(), &wrapper.index, &wrapper.signature, None).unwrap();
        let stored = signer.package_digests()["app.zip"].clone();
        assert_eq!(stored, stored.to_lowercase());

        let err = signer
            .compare("app.zip", &stored.to_uppercase(), stored.clone())
            .unwrap_err();
        assert!(err.message().contains("digest mismatch"));
    }

    #[test]
    fn test_missing_signing_cert() {
        let err = repo_validator(ValidatorConfig::new(), b"", b"", None).unwrap_err();
        assert_eq!(err.kind(), SigningErrorKind::Verify);
    }
}
