//! Symmetric encryption of save payloads.
//!
//! Key and nonce are derived once at store construction from the injected
//! device secret plus a crate salt, hashed through SHA-256. The same device
//! re-derives the same material at load time; there is no key rotation, and
//! save files are not portable across devices.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use sha2::{Digest, Sha256};

use crate::device::DeviceIdentity;
use crate::error::{Result, SaveError};

const KEY_SALT: &[u8] = b"savekeep.key.v1";
const NONCE_SALT: &[u8] = b"savekeep.nonce.v1";
const NONCE_LEN: usize = 12;

/// Encrypts and decrypts byte buffers with device-derived key material.
///
/// Derived once, then immutable for the store's lifetime.
pub struct CryptoProvider {
    key: [u8; 32],
    nonce: [u8; NONCE_LEN],
}

impl CryptoProvider {
    pub fn derive(identity: &dyn DeviceIdentity) -> Self {
        let secret = identity.device_secret();

        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.update(KEY_SALT);
        let key: [u8; 32] = hasher.finalize().into();

        let mut hasher = Sha256::new();
        hasher.update(NONCE_SALT);
        hasher.update(secret.as_bytes());
        let digest = hasher.finalize();
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);

        Self { key, nonce }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|err| SaveError::Crypto(format!("AES key init: {}", err)))?;
        cipher
            .encrypt(Nonce::from_slice(&self.nonce), plaintext)
            .map_err(|err| SaveError::Crypto(format!("AES-GCM encrypt: {}", err)))
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|err| SaveError::Crypto(format!("AES key init: {}", err)))?;
        cipher
            .decrypt(Nonce::from_slice(&self.nonce), ciphertext)
            .map_err(|err| {
                SaveError::Crypto(format!(
                    "AES-GCM decrypt (wrong or rotated device key?): {}",
                    err
                ))
            })
    }
}
