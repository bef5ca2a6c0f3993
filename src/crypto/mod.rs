//! Value encryption.
//!
//! Encryption is an optional transform on value bytes only: values are sealed
//! before a record is encoded and opened after it is decoded. Keys, headers
//! and index snapshots stay in the clear.
//!
//! The cipher is a capability injected through [`Config`](crate::Config);
//! [`Aes256GcmCipher`] is the default.
//!
//! ## Security Model
//!
//! - AES-256-GCM authenticated encryption
//! - Fresh random nonce per value, stored in front of the ciphertext
//! - Secrets are zeroized on drop

use std::fmt;
use std::sync::Arc;

use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CaskError, Result};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A symmetric cipher applied to stored values.
pub trait Cipher: Send + Sync + fmt::Debug {
    /// Required secret length in bytes.
    fn key_size(&self) -> usize;

    /// Encrypts `plaintext` under `secret`.
    fn encode(&self, secret: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypts a value produced by [`encode`](Self::encode).
    fn decode(&self, secret: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// AES-256-GCM with a random nonce per value.
///
/// Output format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`
#[derive(Debug, Default, Clone, Copy)]
pub struct Aes256GcmCipher;

impl Aes256GcmCipher {
    fn cipher(secret: &[u8]) -> Result<Aes256Gcm> {
        if secret.len() != KEY_SIZE {
            return Err(CaskError::Encryption(format!(
                "secret must be {} bytes, got {}",
                KEY_SIZE,
                secret.len()
            )));
        }
        Ok(Aes256Gcm::new(GenericArray::from_slice(secret)))
    }
}

impl Cipher for Aes256GcmCipher {
    fn key_size(&self) -> usize {
        KEY_SIZE
    }

    fn encode(&self, secret: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Self::cipher(secret)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CaskError::Encryption("encryption failed".to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);
        Ok(result)
    }

    fn decode(&self, secret: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CaskError::Encryption("ciphertext too short".to_string()));
        }
        let cipher = Self::cipher(secret)?;

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        cipher
            .decrypt(nonce, &ciphertext[NONCE_SIZE..])
            .map_err(|_| CaskError::Encryption("decryption failed".to_string()))
    }
}

/// Shared secret for value encryption.
///
/// The bytes are zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    bytes: Vec<u8>,
}

impl Secret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Be careful with this method - don't log or serialize the result.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A cipher bound to its secret, as used by the engine.
#[derive(Debug, Clone)]
pub struct ValueCipher {
    cipher: Arc<dyn Cipher>,
    secret: Secret,
}

impl ValueCipher {
    /// Binds `cipher` to `secret`, rejecting a secret of the wrong length.
    pub fn new(cipher: Arc<dyn Cipher>, secret: Secret) -> Result<Self> {
        if secret.len() != cipher.key_size() {
            return Err(CaskError::Config(format!(
                "secret must be exactly {} bytes for {:?}, got {}",
                cipher.key_size(),
                cipher,
                secret.len()
            )));
        }
        Ok(Self { cipher, secret })
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher.encode(self.secret.as_bytes(), plaintext)
    }

    pub fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher.decode(self.secret.as_bytes(), ciphertext)
    }
}
