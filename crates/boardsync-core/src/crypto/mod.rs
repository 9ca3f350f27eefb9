//! Content encryption for the remote store.
//!
//! Keys are derived with HKDF-SHA256 from the user id and an application-wide
//! salt, so every device of the same user derives the same key without a key
//! exchange. Content is sealed with ChaCha20-Poly1305 under a fresh 12-byte iv.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Nonce size in bytes for ChaCha20-Poly1305
pub const IV_SIZE: usize = 12;

const KEY_SIZE: usize = 32;
const KEY_INFO: &[u8] = b"boardsync/board-content/v1";

/// A 256-bit content key. Wiped from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; KEY_SIZE]);

impl ContentKey {
    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("ContentKey([REDACTED])")
    }
}

/// Derive the content key for a user.
///
/// The key depends only on the user id and the application salt. Anyone who
/// knows both can derive it; the remote never sees plaintext, but this is not
/// a boundary against a party that knows the user id.
pub fn derive_key(user_id: &str, salt: &str) -> Result<ContentKey> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(Error::InvalidInput(
            "user id must not be empty for key derivation".to_string(),
        ));
    }

    let hkdf = Hkdf::<Sha256>::new(Some(salt.as_bytes()), user_id.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    hkdf.expand(KEY_INFO, &mut key)
        .map_err(|error| Error::Encryption(format!("key derivation failed: {error}")))?;
    Ok(ContentKey(key))
}

/// Encrypt `plaintext`, returning `(ciphertext, iv)`.
pub fn encrypt(plaintext: &[u8], key: &ContentKey) -> Result<(Vec<u8>, Vec<u8>)> {
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|error| Error::Encryption(error.to_string()))?;

    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| Error::Encryption("encryption failed".to_string()))?;
    Ok((ciphertext, iv.to_vec()))
}

/// Decrypt and authenticate `ciphertext`.
pub fn decrypt(ciphertext: &[u8], iv: &[u8], key: &ContentKey) -> Result<Vec<u8>> {
    if iv.len() != IV_SIZE {
        return Err(Error::Encryption(format!(
            "invalid iv size: expected {IV_SIZE}, got {}",
            iv.len()
        )));
    }

    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|error| Error::Encryption(error.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| Error::Encryption("decryption failed: content or key mismatch".to_string()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChecksumInput<'a> {
    app_state: &'a Map<String, Value>,
    elements: &'a [Value],
}

/// SHA-256 hex digest over `{appState, elements}`.
pub fn content_checksum(elements: &[Value], app_state: &Map<String, Value>) -> Result<String> {
    let canonical = serde_json::to_vec(&ChecksumInput {
        app_state,
        elements,
    })?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Derived keys cached per user id for the lifetime of the owning context.
#[derive(Debug, Default, Clone)]
pub struct KeyCache {
    keys: Arc<Mutex<HashMap<String, Arc<ContentKey>>>>,
}

impl KeyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached key for `user_id`, deriving it on first use.
    pub fn key_for(&self, user_id: &str, salt: &str) -> Result<Arc<ContentKey>> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| Error::Encryption("key cache lock poisoned".to_string()))?;
        if let Some(key) = keys.get(user_id) {
            return Ok(Arc::clone(key));
        }

        let key = Arc::new(derive_key(user_id, salt)?);
        keys.insert(user_id.to_string(), Arc::clone(&key));
        tracing::debug!(user_id, "Derived content key");
        Ok(key)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().map_or(0, |keys| keys.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SALT: &str = "test-salt";

    #[test]
    fn derivation_is_deterministic_per_user() {
        let first = derive_key("user-a", SALT).unwrap();
        let second = derive_key("user-a", SALT).unwrap();
        let other = derive_key("user-b", SALT).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_ne!(first.as_bytes(), other.as_bytes());
    }

    #[test]
    fn derivation_rejects_empty_user() {
        assert!(derive_key("  ", SALT).is_err());
    }

    #[test]
    fn encrypt_then_decrypt_returns_plaintext() {
        let key = derive_key("user-a", SALT).unwrap();
        let (ciphertext, iv) = encrypt(b"{\"elements\":[]}", &key).unwrap();
        assert_eq!(iv.len(), IV_SIZE);
        assert_ne!(ciphertext.as_slice(), b"{\"elements\":[]}");
        assert_eq!(decrypt(&ciphertext, &iv, &key).unwrap(), b"{\"elements\":[]}");
    }

    #[test]
    fn fresh_iv_per_encryption() {
        let key = derive_key("user-a", SALT).unwrap();
        let (first, first_iv) = encrypt(b"same", &key).unwrap();
        let (second, second_iv) = encrypt(b"same", &key).unwrap();
        assert_ne!(first_iv, second_iv);
        assert_ne!(first, second);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let key = derive_key("user-a", SALT).unwrap();
        let other = derive_key("user-b", SALT).unwrap();
        let (ciphertext, iv) = encrypt(b"secret", &key).unwrap();
        assert!(matches!(
            decrypt(&ciphertext, &iv, &other),
            Err(Error::Encryption(_))
        ));
    }

    #[test]
    fn decrypt_rejects_bad_iv_length() {
        let key = derive_key("user-a", SALT).unwrap();
        assert!(decrypt(b"whatever", &[0u8; 4], &key).is_err());
    }

    #[test]
    fn checksum_is_hex_sha256() {
        let app_state = json!({"zoom": 1}).as_object().cloned().unwrap();
        let checksum = content_checksum(&[json!({"id": "a"})], &app_state).unwrap();
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn key_cache_derives_once_per_user() {
        let cache = KeyCache::new();
        let first = cache.key_for("user-a", SALT).unwrap();
        let second = cache.key_for("user-a", SALT).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        cache.key_for("user-b", SALT).unwrap();
        assert_eq!(cache.len(), 2);
    }
}
