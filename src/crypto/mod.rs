//! Crypto module - credential-derived payload encryption.
//!
//! Request and response bodies are encrypted with AES-256 in ECB mode using a
//! key derived from the device access key and the user password:
//!
//! - [`EncryptionKey`] - deterministic 32-byte key derivation
//! - [`Encryptor`] - encrypt / decrypt / decrypt-and-strip with base64 framing
//!
//! # Example
//!
//! ```
//! use nefit_client::crypto::Encryptor;
//!
//! let enc = Encryptor::new("access-key", "password").unwrap();
//! let ciphertext = enc.encrypt(r#"{"value":21.5}"#);
//! assert_eq!(enc.decrypt_and_strip(&ciphertext).unwrap(), r#"{"value":21.5}"#);
//! ```

mod cipher;
mod key;

pub use cipher::{Encryptor, BLOCK_SIZE};
pub use key::{EncryptionKey, KEY_SIZE};
