//! Integrity: SHA-256 over the whole transferred stream.

use sha2::{Digest, Sha256};

/// Incremental digest, fed one frame at a time.
#[derive(Default, Clone)]
pub struct StreamDigest {
    hasher: Sha256,
}

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Lowercase hex of the digest so far.
    pub fn finish_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Compare a received hex digest against the computed one, ignoring case.
pub fn verify_hex(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}
