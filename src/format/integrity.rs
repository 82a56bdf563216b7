//! Checksum gate over canonical payload bytes.
//!
//! The checksum is computed before compression and encryption, so the same
//! verification works for every format.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Computes and verifies SHA-256 checksums when integrity checking is on.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityVerifier {
    enabled: bool,
}

impl IntegrityVerifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Base64 SHA-256 digest, or `None` when integrity checking is disabled.
    pub fn checksum(&self, bytes: &[u8]) -> Option<String> {
        if !self.enabled {
            return None;
        }
        Some(STANDARD.encode(Sha256::digest(bytes)))
    }

    /// Verifies bytes against an expected checksum.
    ///
    /// Disabled integrity always passes; no checksum is written in that
    /// mode. When enabled, a missing or mismatched checksum fails closed.
    pub fn verify(&self, bytes: &[u8], expected: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }
        match expected {
            Some(want) => self.checksum(bytes).as_deref() == Some(want),
            None => false,
        }
    }
}
