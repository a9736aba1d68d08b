//! Release index text format.
//!
//! ```text
//! repoCodeName: demo
//! repoDescription: Demo Repo
//! repoVersion: 1.0
//! [package digests]
//! app-1.0.0.zip: 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
//! ```
//!
//! Lines end with `\n`. Keys and values are separated by the first `": "`.

use std::collections::HashSet;

use tracing::warn;

use crate::error::{SigningError, SigningResult};
use crate::types::RepoAttributes;

/// Line separating repository attributes from package digests.
pub const PACKAGE_DIGESTS_SEPARATOR: &str = "[package digests]";

const KEY_VALUE_SEPARATOR: &str = ": ";

/// One `filename: hex-digest` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDigest {
    pub name: String,
    pub digest: String,
}

impl PackageDigest {
    pub fn new(name: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            digest: digest.into(),
        }
    }
}

/// Parsed or to-be-written release index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseIndex {
    pub attributes: RepoAttributes,
    pub packages: Vec<PackageDigest>,
}

impl ReleaseIndex {
    pub fn new(attributes: RepoAttributes) -> Self {
        Self {
            attributes,
            packages: Vec::new(),
        }
    }

    /// Render the index. Attributes come first in their fixed order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.attributes.iter() {
            push_line(&mut out, key, value);
        }
        out.push_str(PACKAGE_DIGESTS_SEPARATOR);
        out.push('\n');
        for package in &self.packages {
            push_line(&mut out, &package.name, &package.digest);
        }
        out
    }

    /// Parse index text.
    ///
    /// Every line must be `key: value` or the separator; anything else, or a
    /// package listed twice, is a VERIFY error naming the 1-based line number.
    /// Unknown attribute keys are logged and ignored.
    pub fn parse(text: &str) -> SigningResult<Self> {
        let mut index = Self::default();
        let mut in_packages = false;
        let mut seen = HashSet::new();

        for (i, line) in text.lines().enumerate() {
            let line_no = i + 1;
            if line == PACKAGE_DIGESTS_SEPARATOR && !in_packages {
                in_packages = true;
                continue;
            }

            let Some((key, value)) = line.split_once(KEY_VALUE_SEPARATOR) else {
                return Err(SigningError::verify(format!(
                    "malformed release index line {}: {:?}",
                    line_no, line
                )));
            };
            if key.is_empty() {
                return Err(SigningError::verify(format!(
                    "malformed release index line {}: empty key",
                    line_no
                )));
            }

            if in_packages {
                if !seen.insert(key.to_string()) {
                    return Err(SigningError::verify(format!(
                        "duplicate package {} at release index line {}",
                        key, line_no
                    )));
                }
                index.packages.push(PackageDigest::new(key, value));
            } else if !index.attributes.set(key, value) {
                warn!(key = %key, line = line_no, "ignoring unknown release index attribute");
            }
        }

        Ok(index)
    }

    /// First entry that would not parse back as written.
    ///
    /// Package names must not contain `": "` or a line break, and attribute
    /// values must not contain a line break. Returns a description of the
    /// offending entry.
    pub fn unrenderable(&self) -> Option<String> {
        for (key, value) in self.attributes.iter() {
            if has_line_break(value) {
                return Some(format!("attribute {} contains a line break", key));
            }
        }
        self.packages.iter().find_map(|package| {
            if has_line_break(&package.name) {
                Some(format!("package name {:?} contains a line break", package.name))
            } else if package.name.contains(KEY_VALUE_SEPARATOR) {
                Some(format!(
                    "package name {:?} contains {:?}",
                    package.name, KEY_VALUE_SEPARATOR
                ))
            } else {
                None
            }
        })
    }

    /// Expected digest of a package.
    pub fn digest_of(&self, name: &str) -> Option<&str> {
        self.packages
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.digest.as_str())
    }
}

fn has_line_break(text: &str) -> bool {
    text.contains(['\n', '\r'])
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(KEY_VALUE_SEPARATOR);
    out.push_str(value);
    out.push('\n');
}
