//! Symmetric encryption of single option values.
//!
//! Values are sealed with AES-256-GCM under a fresh random 96-bit nonce and
//! stored as `enc:` + hex(nonce || ciphertext || tag). The random nonce means
//! two equal plaintexts never produce equal stored values.

use aes_gcm::{Aes256Gcm, KeyInit, Nonce, aead::Aead};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, warn};

/// Marker prepended to every encrypted value.
pub const ENCRYPTED_PREFIX: &str = "enc:";

const NONCE_LEN: usize = 12;

/// Context string binding derived keys to option encryption.
const HKDF_INFO: &[u8] = b"adminkit option encryption v1";

/// Errors from encrypting or decrypting a value.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("value is not encrypted")]
    NotEncrypted,

    #[error("invalid hex in encrypted value")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("encrypted value too short")]
    TooShort,

    #[error("raw key must be 32 bytes, got {0}")]
    KeyLength(usize),

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed")]
    Decrypt,

    #[error("decrypted value is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Encrypts and decrypts option values under one key.
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Derive a cipher from an arbitrary key string using HKDF-SHA256.
    pub fn new(key: &str) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, key.as_bytes());
        let mut okm = [0u8; 32];
        hk.expand(HKDF_INFO, &mut okm)
            .map_err(|_| CryptoError::KeyDerivation)?;
        Ok(Self { key: okm })
    }

    /// Use raw 256-bit key material.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Parse 64 hex characters as raw key material.
    pub fn from_hex(key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(key.trim())?;
        let key: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::KeyLength(bytes.len()))?;
        Ok(Self::from_bytes(key))
    }

    /// Build a cipher from a configured key: raw hex when it looks like a
    /// 256-bit hex key, a derived key otherwise.
    pub fn from_config_key(key: &str) -> Result<Self, CryptoError> {
        let trimmed = key.trim();
        if trimmed.len() == 64 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            Self::from_hex(trimmed)
        } else {
            Self::new(key)
        }
    }

    /// Generate fresh key material, hex encoded.
    pub fn generate_key() -> String {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        hex::encode(key)
    }

    /// Whether a stored value carries the encryption marker.
    pub fn is_encrypted(stored: &str) -> bool {
        stored.starts_with(ENCRYPTED_PREFIX)
    }

    /// Encrypt a value for storage.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new((&self.key).into());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{ENCRYPTED_PREFIX}{}", hex::encode(combined)))
    }

    /// Decrypt a stored value, reporting why it could not be decrypted.
    pub fn try_decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let encrypted_hex = stored
            .strip_prefix(ENCRYPTED_PREFIX)
            .ok_or(CryptoError::NotEncrypted)?;

        let combined = hex::decode(encrypted_hex)?;
        if combined.len() < NONCE_LEN {
            return Err(CryptoError::TooShort);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new((&self.key).into());
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;

        Ok(String::from_utf8(plaintext)?)
    }

    /// Decrypt a stored value, returning an empty string when the value is
    /// empty, malformed, or sealed under another key.
    ///
    /// An unset option and a corrupted one look the same to callers.
    pub fn decrypt(&self, stored: &str) -> String {
        if stored.is_empty() {
            return String::new();
        }

        match self.try_decrypt(stored) {
            Ok(plaintext) => plaintext,
            Err(CryptoError::NotEncrypted) => {
                debug!("stored value is not encrypted; treating as unset");
                String::new()
            }
            Err(e) => {
                warn!(error = %e, "could not decrypt stored value; treating as unset");
                String::new()
            }
        }
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::from_bytes([0x42u8; 32])
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = cipher();
        let long = "x".repeat(4096);
        for secret in ["s3cr3t", "", "pässwörd with spaces", "a:b:c", long.as_str()] {
            let encrypted = cipher.encrypt(secret).unwrap();
            assert!(encrypted.starts_with("enc:"));
            assert_eq!(cipher.decrypt(&encrypted), secret);
        }
    }

    #[test]
    fn ciphertext_differs_from_plaintext() {
        let encrypted = cipher().encrypt("s3cr3t").unwrap();
        assert_ne!(encrypted, "s3cr3t");
        assert!(!encrypted.contains("s3cr3t"));
    }

    #[test]
    fn equal_plaintexts_produce_distinct_ciphertexts() {
        let cipher = cipher();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_never_yields_plaintext() {
        let k1 = SecretCipher::new("first key").unwrap();
        let k2 = SecretCipher::new("second key").unwrap();
        let encrypted = k1.encrypt("s3cr3t").unwrap();

        assert!(matches!(k2.try_decrypt(&encrypted), Err(CryptoError::Decrypt)));
        assert_eq!(k2.decrypt(&encrypted), "");
    }

    #[test]
    fn derived_keys_are_deterministic() {
        let a = SecretCipher::new("passphrase").unwrap();
        let b = SecretCipher::new("passphrase").unwrap();
        let encrypted = a.encrypt("value").unwrap();
        assert_eq!(b.decrypt(&encrypted), "value");
    }

    #[test]
    fn malformed_values_decrypt_to_empty() {
        let cipher = cipher();
        assert_eq!(cipher.decrypt(""), "");
        assert_eq!(cipher.decrypt("plaintext"), "");
        assert_eq!(cipher.decrypt("enc:not-hex"), "");
        assert_eq!(cipher.decrypt("enc:0011"), "");

        assert!(matches!(
            cipher.try_decrypt("plaintext"),
            Err(CryptoError::NotEncrypted)
        ));
        assert!(matches!(
            cipher.try_decrypt("enc:zz"),
            Err(CryptoError::InvalidHex(_))
        ));
        assert!(matches!(
            cipher.try_decrypt("enc:0011"),
            Err(CryptoError::TooShort)
        ));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let cipher = cipher();
        let mut encrypted = cipher.encrypt("s3cr3t").unwrap();
        let last = encrypted.pop().unwrap();
        encrypted.push(if last == '0' { '1' } else { '0' });
        assert_eq!(cipher.decrypt(&encrypted), "");
    }

    #[test]
    fn config_key_accepts_hex_or_passphrase() {
        let hex_key = SecretCipher::generate_key();
        assert_eq!(hex_key.len(), 64);

        let raw = SecretCipher::from_config_key(&hex_key).unwrap();
        let same = SecretCipher::from_hex(&hex_key).unwrap();
        let encrypted = raw.encrypt("v").unwrap();
        assert_eq!(same.decrypt(&encrypted), "v");

        let derived = SecretCipher::from_config_key("not a hex key").unwrap();
        assert_eq!(derived.decrypt(&derived.encrypt("w").unwrap()), "w");
    }

    #[test]
    fn from_hex_rejects_short_keys() {
        assert!(matches!(
            SecretCipher::from_hex("0011"),
            Err(CryptoError::KeyLength(2))
        ));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let debug = format!("{:?}", cipher());
        assert!(!debug.contains("66"));
        assert!(debug.starts_with("SecretCipher"));
    }
}
