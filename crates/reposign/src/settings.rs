//! Truststore location settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Password conventionally protecting the runtime's `cacerts` keystore.
pub const DEFAULT_TRUSTSTORE_PASSWORD: &str = "changeit";

/// Location of the CA keystore relative to a runtime home.
pub const RUNTIME_CACERTS: &str = "lib/security/cacerts";

/// Well-known OS CA bundles, tried in order when no runtime keystore exists.
pub const WELL_KNOWN_CA_BUNDLES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
    "/etc/ssl/cert.pem",
];

/// Where to find the default truststore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustSettings {
    /// Explicit truststore (JKS or PEM bundle). Takes precedence over everything else.
    #[serde(default)]
    pub truststore_path: Option<PathBuf>,

    /// Password for JKS truststores.
    #[serde(default = "default_password")]
    pub truststore_password: String,

    /// Runtime home holding `lib/security/cacerts`.
    #[serde(default)]
    pub runtime_home: Option<PathBuf>,

    /// OS CA bundle override.
    #[serde(default)]
    pub ca_bundle_path: Option<PathBuf>,
}

fn default_password() -> String {
    DEFAULT_TRUSTSTORE_PASSWORD.to_string()
}

impl Default for TrustSettings {
    fn default() -> Self {
        Self {
            truststore_path: None,
            truststore_password: default_password(),
            runtime_home: None,
            ca_bundle_path: None,
        }
    }
}

impl TrustSettings {
    /// Create settings from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `REPOSIGN_TRUSTSTORE` | Explicit truststore path |
    /// | `REPOSIGN_TRUSTSTORE_PASSWORD` | Truststore password (default `changeit`) |
    /// | `REPOSIGN_RUNTIME_HOME` | Runtime home, falls back to `JAVA_HOME` |
    /// | `REPOSIGN_CA_BUNDLE` | OS CA bundle path |
    pub fn from_env() -> Self {
        Self {
            truststore_path: env_path("REPOSIGN_TRUSTSTORE"),
            truststore_password: std::env::var("REPOSIGN_TRUSTSTORE_PASSWORD")
                .unwrap_or_else(|_| default_password()),
            runtime_home: env_path("REPOSIGN_RUNTIME_HOME").or_else(|| env_path("JAVA_HOME")),
            ca_bundle_path: env_path("REPOSIGN_CA_BUNDLE"),
        }
    }

    /// Set an explicit truststore.
    pub fn with_truststore(mut self, path: impl Into<PathBuf>) -> Self {
        self.truststore_path = Some(path.into());
        self
    }

    /// Set the truststore password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.truststore_password = password.into();
        self
    }

    /// Set the runtime home.
    pub fn with_runtime_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.runtime_home = Some(home.into());
        self
    }

    /// Set the OS CA bundle.
    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle_path = Some(path.into());
        self
    }

    /// Candidate truststore locations, most specific first.
    ///
    /// Only the explicit truststore is returned when one is set.
    pub fn truststore_candidates(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.truststore_path {
            return vec![path.clone()];
        }

        let mut out = Vec::new();
        if let Some(home) = &self.runtime_home {
            out.push(home.join(RUNTIME_CACERTS));
        }
        match &self.ca_bundle_path {
            Some(bundle) => out.push(bundle.clone()),
            None => out.extend(WELL_KNOWN_CA_BUNDLES.iter().map(PathBuf::from)),
        }
        out
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
