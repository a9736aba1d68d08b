//! Integration tests for trust decisions during verification.
//!
//! Pinned certificates, truststore chain validation (JKS and PEM), expiry,
//! and structurally broken chains.

mod common;

use reposign::{
    repo_validator, sign_repo, SigningAlgorithm, SigningErrorKind, TrustSettings, TrustStore,
    ValidatorConfig,
};

use common::{
    fixture, init_tracing, repo_with, signer_config, signer_config_for, validator_config, STOREPASS,
};

fn signed(chain: &str) -> (Vec<u8>, Vec<u8>) {
    let repo = repo_with(&[("app.zip", &b"app"[..])]);
    let wrapper = sign_repo(repo.path(), &signer_config_for(chain)).unwrap();
    (wrapper.index, wrapper.signature)
}

fn with_jks(chain: &str, jks: &str, password: &str) -> ValidatorConfig {
    let mut config = validator_config(chain);
    config.set_trust_store(fixture(jks));
    config.set_trust_store_password(password);
    config
}

// ============================================================================
// Truststore validation
// ============================================================================

#[test]
fn test_chain_trusted_by_jks_root() {
    init_tracing();
    let (index, signature) = signed("leaf_chain.pem");
    let signer = repo_validator(
        with_jks("leaf_chain.pem", "truststore.jks", STOREPASS),
        &index,
        &signature,
        None,
    )
    .unwrap();
    signer.validate_package(b"app", "app.zip").unwrap();
}

#[test]
fn test_chain_trusted_by_pem_bundle() {
    let (index, signature) = signed("leaf_chain.pem");
    let mut config = validator_config("leaf_chain.pem");
    config.set_trust_store(fixture("root_ca.pem"));
    repo_validator(config, &index, &signature, None).unwrap();
}

#[test]
fn test_intermediate_only_store_rejects() {
    init_tracing();
    let (index, signature) = signed("leaf_chain.pem");
    let err = repo_validator(
        with_jks("leaf_chain.pem", "intermediate_only.jks", STOREPASS),
        &index,
        &signature,
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind(), SigningErrorKind::Verify);
    assert!(err.message().contains("not trusted"), "{}", err);
    assert!(err
        .certificate_subject()
        .unwrap()
        .contains("Reposign Release Signing"));
}

#[test]
fn test_intermediate_anchor_walks_to_root() {
    let (index, signature) = signed("leaf_chain.pem");

    let mut store = TrustStore::new();
    store.add("root", reposign::cert::decode_certificate(&fixture("root_ca.pem")).unwrap());
    store.add(
        "intermediate",
        reposign::cert::decode_certificate(&fixture("intermediate_ca.pem")).unwrap(),
    );

    // only the leaf is sent; the intermediate comes from the store
    let mut config = validator_config("leaf.pem");
    config.set_trust_anchors(store);
    repo_validator(config, &index, &signature, None).unwrap();
}

#[test]
fn test_unrelated_root_rejects() {
    let (index, signature) = signed("leaf_chain.pem");
    let mut store = TrustStore::new();
    store.add(
        "unrelated",
        reposign::cert::decode_certificate(&fixture("unrelated_ca.pem")).unwrap(),
    );

    let mut config = validator_config("leaf_chain.pem");
    config.set_trust_anchors(store);
    let err = repo_validator(config, &index, &signature, None).unwrap_err();
    assert!(err.message().contains("not trusted"));
}

#[test]
fn test_unlinked_chain_rejected() {
    let (index, signature) = signed("leaf_chain.pem");

    let mut broken = fixture("leaf.pem");
    broken.extend_from_slice(&fixture("root_ca.pem"));
    let mut config = ValidatorConfig::new();
    config
        .set_signing_cert(&broken, SigningAlgorithm::Sha256WithRsa)
        .unwrap();
    config.set_trust_store(fixture("truststore.jks"));
    config.set_trust_store_password(STOREPASS);

    let err = repo_validator(config, &index, &signature, None).unwrap_err();
    assert_eq!(err.kind(), SigningErrorKind::Verify);
    assert!(err.message().contains("not trusted"));
}

#[test]
fn test_wrong_truststore_password() {
    let (index, signature) = signed("leaf_chain.pem");
    let err = repo_validator(
        with_jks("leaf_chain.pem", "truststore.jks", "not-the-password"),
        &index,
        &signature,
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind(), SigningErrorKind::Verify);
    assert!(err.message().contains("cannot load truststore"));
}

#[test]
fn test_default_truststore_from_runtime_home() {
    let (index, signature) = signed("leaf_chain.pem");
    let home = tempfile::tempdir().unwrap();
    let security = home.path().join("lib").join("security");
    std::fs::create_dir_all(&security).unwrap();
    std::fs::write(security.join("cacerts"), fixture("truststore.jks")).unwrap();

    let mut config = validator_config("leaf_chain.pem");
    config.setup_default_truststore_with(
        TrustSettings::default()
            .with_runtime_home(home.path())
            .with_ca_bundle(home.path().join("no-bundle.pem")),
    );
    repo_validator(config, &index, &signature, None).unwrap();
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn test_expired_certificate_rejected() {
    init_tracing();
    let (index, signature) = signed("expired_chain.pem");

    // the chain itself links to the trusted root; only the leaf is expired
    let err = repo_validator(
        with_jks("expired_chain.pem", "truststore.jks", STOREPASS),
        &index,
        &signature,
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind(), SigningErrorKind::Verify);
    assert!(err.message().contains("expired on 2021-01-01"), "{}", err);
    assert!(err.certificate().is_some());

    let err = repo_validator(validator_config("expired_chain.pem"), &index, &signature, None)
        .unwrap_err();
    assert!(err.message().contains("2021-01-01"));
}

// ============================================================================
// Pinning
// ============================================================================

#[test]
fn test_pinned_certificate_accepted() {
    let (index, signature) = signed("leaf_chain.pem");
    let signer = repo_validator(
        validator_config("leaf_chain.pem"),
        &index,
        &signature,
        Some(&fixture("leaf.pem")),
    )
    .unwrap();
    signer.validate_package(b"app", "app.zip").unwrap();
}

#[test]
fn test_pinned_expired_certificate_bypasses_checks() {
    let (index, signature) = signed("expired_chain.pem");

    // untrusting store and expired leaf are both skipped when pinned
    let signer = repo_validator(
        with_jks("expired_chain.pem", "intermediate_only.jks", STOREPASS),
        &index,
        &signature,
        Some(&fixture("expired_leaf.pem")),
    )
    .unwrap();
    signer.validate_package(b"app", "app.zip").unwrap();
}

#[test]
fn test_pinned_mismatch_rejected() {
    let (index, signature) = signed("leaf_chain.pem");
    let err = repo_validator(
        validator_config("leaf_chain.pem"),
        &index,
        &signature,
        Some(&fixture("self_signed.pem")),
    )
    .unwrap_err();
    assert_eq!(err.kind(), SigningErrorKind::Verify);
    assert!(err.message().contains("does not match pinned certificate"));
}

#[test]
fn test_pinned_does_not_skip_signature() {
    let (index, _) = signed("leaf_chain.pem");
    let repo = repo_with(&[("other.zip", &b"other"[..])]);
    let other = sign_repo(repo.path(), &signer_config()).unwrap();

    let err = repo_validator(
        validator_config("leaf_chain.pem"),
        &index,
        &other.signature,
        Some(&fixture("leaf.pem")),
    )
    .unwrap_err();
    assert!(err.message().contains("signature does not verify"));
}
