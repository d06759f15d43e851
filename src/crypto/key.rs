//! Credential-derived key material.
//!
//! ```text
//! key = MD5(access_key ++ MAGIC) ++ MD5(MAGIC ++ password)
//! ```
//!
//! The result is always 32 bytes and is used as an AES-256 key.

use md5::{Digest, Md5};

/// Key size in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// Protocol-defined shared constant mixed into both key halves.
const MAGIC: [u8; 32] = [
    0x58, 0xf1, 0x8d, 0x70, 0xf6, 0x67, 0xc9, 0xc7, 0x9e, 0xf7, 0xde, 0x43, 0x5b, 0xf0, 0xf9, 0xb1,
    0x55, 0x3b, 0xbb, 0x6e, 0x61, 0x81, 0x62, 0x12, 0xab, 0x80, 0xe5, 0xb0, 0xd3, 0x51, 0xfb, 0xb1,
];

/// Derived 32-byte encryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Derive the key from the access key and password.
    pub fn derive(access_key: &str, password: &str) -> Self {
        let mut key = [0u8; KEY_SIZE];

        let mut head = Md5::new();
        head.update(access_key.as_bytes());
        head.update(MAGIC);
        key[..16].copy_from_slice(&head.finalize());

        let mut tail = Md5::new();
        tail.update(MAGIC);
        tail.update(password.as_bytes());
        key[16..].copy_from_slice(&tail.finalize());

        Self(key)
    }

    /// Raw key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}
