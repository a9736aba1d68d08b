//! Shared fixtures for integration tests.
//!
//! Certificates and keystores live in `tests/data` and are produced by
//! `tests/data/generate_fixtures.py`.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use reposign::{
    PrivateKeyFormat, RepoAttributes, SignerConfig, SigningAlgorithm, ValidatorConfig,
};
use tempfile::TempDir;

pub const STOREPASS: &str = "changeit";

static TRACING: OnceLock<()> = OnceLock::new();

/// Route library logs to the test writer (`RUST_LOG=reposign=debug`).
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn data_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

pub fn fixture(name: &str) -> Vec<u8> {
    fs::read(data_path(name)).unwrap_or_else(|e| panic!("missing fixture {name}: {e}"))
}

pub fn demo_attributes() -> RepoAttributes {
    RepoAttributes::new("demo", "Demo Repo", "1.0")
}

/// Signer for the leaf certificate, chain `leaf_chain.pem`.
pub fn signer_config() -> SignerConfig {
    signer_config_for("leaf_chain.pem")
}

pub fn signer_config_for(chain: &str) -> SignerConfig {
    SignerConfig::new(
        demo_attributes(),
        &fixture("leaf_key.pem"),
        PrivateKeyFormat::Pem,
        &fixture(chain),
        SigningAlgorithm::Sha256WithRsa,
    )
    .expect("signer config")
}

/// Validator primed with `chain`, no truststore.
pub fn validator_config(chain: &str) -> ValidatorConfig {
    let mut config = ValidatorConfig::new();
    config
        .set_signing_cert(&fixture(chain), SigningAlgorithm::Sha256WithRsa)
        .expect("validator config");
    config
}

/// Temporary repository holding the given `(relative path, content)` packages.
pub fn repo_with(packages: &[(&str, &[u8])]) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for (rel, content) in packages {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create package dir");
        }
        fs::write(path, content).expect("write package");
    }
    dir
}
