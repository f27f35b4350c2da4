//! At-rest encryption for the stored access token.
//!
//! A [`TokenCipher`] seals a value for one named storage slot using
//! ChaCha20-Poly1305. The slot name is the AEAD associated data, so a sealed
//! blob moved under a different slot no longer opens. The sealed form is
//! base64(version || nonce || ciphertext). The key lives in its own file with
//! 0o600 permissions and is created on first use.

use std::fmt;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::rand_core::RngCore as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};

/// Leading byte of every sealed blob.
const FORMAT_VERSION: u8 = 1;

const NONCE_LEN: usize = 12;

/// Length of a session encryption key in bytes.
pub const KEY_LEN: usize = 32;

/// Seals and opens values bound to a storage slot.
#[derive(Clone)]
pub struct TokenCipher {
    aead: ChaCha20Poly1305,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Cipher over a 256-bit key.
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(key.into()),
        }
    }

    /// Encrypt `plaintext` for `slot` with a fresh nonce.
    pub fn seal(&self, slot: &str, plaintext: &str) -> Result<String, SecretError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let payload = Payload {
            msg: plaintext.as_bytes(),
            aad: slot.as_bytes(),
        };
        let ciphertext = self
            .aead
            .encrypt(&nonce, payload)
            .map_err(|_| SecretError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        sealed.push(FORMAT_VERSION);
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypt a blob sealed for `slot`.
    ///
    /// Fails with [`SecretError::DecryptionFailed`] for a different key, a
    /// different slot, or tampered bytes.
    pub fn open(&self, slot: &str, sealed: &str) -> Result<String, SecretError> {
        let bytes = STANDARD
            .decode(sealed)
            .map_err(|_| SecretError::InvalidEncoding)?;
        let (nonce, ciphertext) = split_sealed(&bytes)?;
        let payload = Payload {
            msg: ciphertext,
            aad: slot.as_bytes(),
        };
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| SecretError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| SecretError::InvalidUtf8)
    }
}

fn split_sealed(bytes: &[u8]) -> Result<(&[u8], &[u8]), SecretError> {
    match bytes.split_first() {
        Some((&FORMAT_VERSION, rest)) if rest.len() > NONCE_LEN => Ok(rest.split_at(NONCE_LEN)),
        _ => Err(SecretError::InvalidEncoding),
    }
}

/// Generate a random 256-bit key.
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// Load the key file, creating it with a fresh key if it does not exist.
pub fn load_or_create_key(path: &Path) -> Result<[u8; KEY_LEN], SecretError> {
    if path.exists() {
        let encoded =
            std::fs::read_to_string(path).map_err(|e| SecretError::Io(e.to_string()))?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| SecretError::InvalidEncoding)?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| SecretError::InvalidKeyLength)?;
        return Ok(key);
    }

    let key = generate_key();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SecretError::Io(e.to_string()))?;
    }
    std::fs::write(path, STANDARD.encode(key)).map_err(|e| SecretError::Io(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| SecretError::Io(e.to_string()))?;
    }

    tracing::info!(path = %path.display(), "created session key");
    Ok(key)
}

/// Errors from encryption and key handling.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,
    /// Wrong key or tampered ciphertext.
    #[error("decryption failed")]
    DecryptionFailed,
    /// Stored value is not valid base64 or is too short.
    #[error("invalid encoding")]
    InvalidEncoding,
    /// Decrypted bytes are not UTF-8.
    #[error("invalid UTF-8")]
    InvalidUtf8,
    /// Key file does not hold exactly 32 bytes.
    #[error("invalid key length")]
    InvalidKeyLength,
    /// Key file could not be read or written.
    #[error("I/O error: {0}")]
    Io(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
