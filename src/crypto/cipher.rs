//! AES-256-ECB payload cipher with the protocol's zero padding.
//!
//! Encryption zero-pads to the next 16-byte boundary. Input that is already a
//! non-empty multiple of 16 gets no extra block (unlike PKCS#7). Decryption
//! pads the decoded ciphertext to a multiple of 8 before block decryption;
//! that rounding is inherited from older clients and must stay as is.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes256, Block};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::key::EncryptionKey;
use crate::error::{NefitError, Result};

/// Cipher block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Decrypt-side alignment applied before block decryption.
const DECRYPT_ALIGN: usize = 8;

/// Payload encryptor bound to one set of credentials.
#[derive(Clone)]
pub struct Encryptor {
    cipher: Aes256,
}

impl Encryptor {
    /// Derive the key from the credentials and set up the cipher.
    ///
    /// The device serial number plays no part in key derivation.
    pub fn new(access_key: &str, password: &str) -> Result<Self> {
        Self::with_key(&EncryptionKey::derive(access_key, password))
    }

    /// Set up the cipher from an already derived key.
    pub fn with_key(key: &EncryptionKey) -> Result<Self> {
        let cipher = Aes256::new_from_slice(key.as_bytes())
            .map_err(|e| NefitError::Encryption(format!("failed to create cipher: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Encrypt a plaintext and return base64 ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut buf = plaintext.as_bytes().to_vec();
        let remainder = buf.len() % BLOCK_SIZE;
        if buf.is_empty() {
            buf.resize(BLOCK_SIZE, 0);
        } else if remainder != 0 {
            buf.resize(buf.len() + BLOCK_SIZE - remainder, 0);
        }

        for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.encrypt_block(Block::from_mut_slice(chunk));
        }

        BASE64.encode(buf)
    }

    /// Decrypt base64 ciphertext, keeping any zero padding.
    pub fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>> {
        let mut buf = BASE64
            .decode(ciphertext.trim())
            .map_err(|e| NefitError::Encryption(format!("failed to decode base64: {}", e)))?;

        let remainder = buf.len() % DECRYPT_ALIGN;
        if remainder != 0 {
            buf.resize(buf.len() + DECRYPT_ALIGN - remainder, 0);
        }

        if buf.len() % BLOCK_SIZE != 0 {
            return Err(NefitError::Encryption(format!(
                "ciphertext length {} is not a multiple of the {}-byte block size",
                buf.len(),
                BLOCK_SIZE
            )));
        }

        for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.decrypt_block(Block::from_mut_slice(chunk));
        }

        Ok(buf)
    }

    /// Decrypt base64 ciphertext and strip trailing zero bytes.
    pub fn decrypt_and_strip(&self, ciphertext: &str) -> Result<String> {
        let mut plain = self.decrypt(ciphertext)?;
        let end = plain.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        plain.truncate(end);
        Ok(String::from_utf8_lossy(&plain).into_owned())
    }
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor")
            .field("cipher", &"AES-256-ECB")
            .finish()
    }
}
