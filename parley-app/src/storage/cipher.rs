//! At-rest encryption for message text.

use std::path::Path;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::StoreError;

const NONCE_LEN: usize = 12;

/// AES-256-GCM with a key derived from the host user and the database path.
/// Output is `base64(nonce || ciphertext)`; the empty string maps to itself.
#[derive(Debug, Clone)]
pub(crate) struct TextCipher {
    key: [u8; 32],
}

impl TextCipher {
    pub(crate) fn new(scope: &Path) -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();
        let host = std::env::var("HOSTNAME").unwrap_or_default();
        let material = format!("{user}|{host}|{}|parley-messages-v1", scope.to_string_lossy());
        let digest = Sha256::digest(material.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest[..32]);
        Self { key }
    }

    pub(crate) fn encrypt(&self, plain: &str) -> Result<String, StoreError> {
        if plain.is_empty() {
            return Ok(String::new());
        }
        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|e| StoreError::Cipher(e.to_string()))?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let encrypted = cipher
            .encrypt(nonce, plain.as_bytes())
            .map_err(|e| StoreError::Cipher(e.to_string()))?;
        let mut out = Vec::with_capacity(NONCE_LEN + encrypted.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&encrypted);
        Ok(BASE64.encode(out))
    }

    /// `None` when the payload is corrupt or was written under another key.
    pub(crate) fn decrypt(&self, encoded: &str) -> Option<String> {
        if encoded.is_empty() {
            return Some(String::new());
        }
        let bytes = BASE64.decode(encoded).ok()?;
        if bytes.len() <= NONCE_LEN {
            return None;
        }
        let (nonce_bytes, cipher_bytes) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = Aes256Gcm::new_from_slice(&self.key).ok()?;
        let plain = cipher.decrypt(nonce, cipher_bytes).ok()?;
        String::from_utf8(plain).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ciphertext_hides_plaintext_and_decrypts() {
        let cipher = TextCipher::new(Path::new("/tmp/a.db"));
        let enc = cipher.encrypt("I like pizza").unwrap();
        assert!(!enc.contains("pizza"));
        assert_eq!(cipher.decrypt(&enc).as_deref(), Some("I like pizza"));
    }

    #[test]
    fn nonces_differ_between_calls() {
        let cipher = TextCipher::new(Path::new("/tmp/a.db"));
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn other_scope_cannot_decrypt() {
        let enc = TextCipher::new(Path::new("/tmp/a.db")).encrypt("secret").unwrap();
        assert_eq!(TextCipher::new(Path::new("/tmp/b.db")).decrypt(&enc), None);
        assert_eq!(TextCipher::new(Path::new("/tmp/a.db")).decrypt("not base64!"), None);
    }

    #[test]
    fn empty_text_is_stored_empty() {
        let cipher = TextCipher::new(Path::new("/tmp/a.db"));
        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.decrypt("").as_deref(), Some(""));
    }
}
