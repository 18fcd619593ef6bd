//! AES-256-GCM encryption of stored provider API keys.
//!
//! Ciphertexts are `base64(nonce || ciphertext)` with a random 96-bit nonce.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("encryption key must be base64 of 32 bytes")]
    InvalidKey,
    #[error("encryption failed")]
    Encrypt,
    #[error("stored key could not be decrypted")]
    Decrypt,
}

#[derive(Clone)]
pub struct KeyVault {
    cipher: Aes256Gcm,
}

impl KeyVault {
    pub fn from_base64(key: &str) -> Result<Self, VaultError> {
        let bytes = BASE64
            .decode(key.trim())
            .map_err(|_| VaultError::InvalidKey)?;
        if bytes.len() != 32 {
            return Err(VaultError::InvalidKey);
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, VaultError> {
        let data = BASE64.decode(encoded).map_err(|_| VaultError::Decrypt)?;
        if data.len() <= NONCE_LEN {
            return Err(VaultError::Decrypt);
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::Decrypt)
    }
}

/// Display form of a key: `****` when short, else first and last four.
pub fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
