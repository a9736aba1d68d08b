//! Package digests as lowercase hex.
//!
//! Release indexes store lowercase hex and packages are compared
//! case-sensitively, so every digest goes through this module.

use std::io::Read;

use sha2::{Digest, Sha256, Sha512};

use crate::types::DigestAlgorithm;

const READ_BUFFER: usize = 8192;

fn hex_reader<D: Digest, R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0_u8; READ_BUFFER];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Digest everything `reader` yields.
pub(crate) fn hex_digest_reader<R: Read>(
    algorithm: DigestAlgorithm,
    reader: R,
) -> std::io::Result<String> {
    match algorithm {
        DigestAlgorithm::Sha256 => hex_reader::<Sha256, R>(reader),
        DigestAlgorithm::Sha512 => hex_reader::<Sha512, R>(reader),
    }
}

pub(crate) fn hex_digest(algorithm: DigestAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
        DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
    }
}
