//! Note encryption gateway.
//!
//! The sync engine only needs `encrypt(note, key)` and `decrypt(record, key)`;
//! [`NoteCipher`] is that seam. [`AesGcmCipher`] is the shipped
//! implementation: AES-256-GCM over the JSON-serialized note, with the
//! cleartext `id` and `modification_date` bound as associated data so the
//! server cannot swap a head onto another note's ciphertext.

use std::fmt;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

use crate::error::{Error, Result};
use crate::models::{EncryptedNote, Note};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Symmetric key shared by every device of one account.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            Error::Crypto(format!(
                "encryption key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Parses the base64 form stored in the session.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|error| Error::Crypto(format!("invalid encryption key encoding: {error}")))?;
        Self::from_bytes(&bytes)
    }

    /// Base64 form for storage in the session.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts notes into their wire form and back.
pub trait NoteCipher: Send + Sync {
    /// Encrypt a note; `id` and `modification_date` stay readable.
    fn encrypt(&self, note: &Note, key: &EncryptionKey) -> Result<EncryptedNote>;

    /// Decrypt a record produced by [`NoteCipher::encrypt`] with the same key.
    fn decrypt(&self, record: &EncryptedNote, key: &EncryptionKey) -> Result<Note>;
}

/// AES-256-GCM implementation of [`NoteCipher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmCipher;

impl AesGcmCipher {
    fn cipher(key: &EncryptionKey) -> Aes256Gcm {
        Aes256Gcm::new(GenericArray::from_slice(&key.bytes))
    }

    fn associated_data(id: &str, modification_date: &str) -> Vec<u8> {
        format!("{id}\n{modification_date}").into_bytes()
    }
}

impl NoteCipher for AesGcmCipher {
    fn encrypt(&self, note: &Note, key: &EncryptionKey) -> Result<EncryptedNote> {
        let plaintext = serde_json::to_vec(note)?;
        let aad = Self::associated_data(&note.id.as_str(), &note.modification_date);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = Self::cipher(key)
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::Crypto("encryption failed".to_string()))?;

        Ok(EncryptedNote {
            id: note.id,
            modification_date: note.modification_date.clone(),
            encrypted_base64: STANDARD.encode(ciphertext),
            iv: STANDARD.encode(nonce_bytes),
        })
    }

    fn decrypt(&self, record: &EncryptedNote, key: &EncryptionKey) -> Result<Note> {
        let nonce_bytes = STANDARD
            .decode(&record.iv)
            .map_err(|error| Error::Crypto(format!("invalid iv encoding: {error}")))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(Error::Crypto(format!(
                "iv must be {NONCE_SIZE} bytes, got {}",
                nonce_bytes.len()
            )));
        }
        let ciphertext = STANDARD
            .decode(&record.encrypted_base64)
            .map_err(|error| Error::Crypto(format!("invalid ciphertext encoding: {error}")))?;
        let aad = Self::associated_data(&record.id.as_str(), &record.modification_date);

        let plaintext = Self::cipher(key)
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::Crypto(format!("could not decrypt note {}", record.id)))?;

        let note: Note = serde_json::from_slice(&plaintext)?;
        if note.id != record.id || note.modification_date != record.modification_date {
            return Err(Error::Crypto(format!(
                "decrypted note does not match its head {}",
                record.id
            )));
        }
        Ok(note)
    }
}
