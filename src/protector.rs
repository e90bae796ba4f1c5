//! Symmetric protection for SMTP passwords at rest.
//!
//! AES-256-GCM over a key stored hex-encoded under the data root. The
//! purpose string is bound into every ciphertext as associated data, so a
//! value protected for one purpose cannot be unprotected under another.
//! Ciphertext layout: hex(nonce || ct).

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::protector::{KEY_FILE, PURPOSE};
use crate::errors::ProtectorError;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

pub struct Protector {
    cipher: Aes256Gcm,
}

impl Protector {
    /// Load the key from `<data_root>/protector.key`, generating and
    /// persisting a fresh one on first use.
    pub fn load_or_create(data_root: &Path) -> Result<Self> {
        let key_path: PathBuf = data_root.join(KEY_FILE);
        let key_bytes = if key_path.exists() {
            let hex_key = std::fs::read_to_string(&key_path)
                .with_context(|| format!("Failed to read key material at {:?}", key_path))?;
            hex::decode(hex_key.trim())
                .with_context(|| format!("Key material at {:?} is not valid hex", key_path))?
        } else {
            std::fs::create_dir_all(data_root)
                .with_context(|| format!("Failed to create data root {:?}", data_root))?;
            let key = Aes256Gcm::generate_key(&mut OsRng);
            std::fs::write(&key_path, hex::encode(key))
                .with_context(|| format!("Failed to write key material at {:?}", key_path))?;
            info!("Generated new protector key at {:?}", key_path);
            key.to_vec()
        };

        Self::from_key_bytes(&key_bytes)
    }

    pub fn from_key_bytes(key_bytes: &[u8]) -> Result<Self> {
        if key_bytes.len() != KEY_SIZE {
            anyhow::bail!(
                "Protector key must be {} bytes, got {}",
                KEY_SIZE,
                key_bytes.len()
            );
        }
        let cipher = Aes256Gcm::new(key_bytes.into());
        Ok(Self { cipher })
    }

    pub fn protect(&self, plain: &str) -> Result<String, ProtectorError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plain.as_bytes(),
                    aad: PURPOSE.as_bytes(),
                },
            )
            .map_err(|_| ProtectorError::Malformed("encryption failed".to_string()))?;

        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    pub fn unprotect(&self, opaque: &str) -> Result<String, ProtectorError> {
        let raw = hex::decode(opaque)
            .map_err(|e| ProtectorError::Malformed(format!("invalid hex: {e}")))?;
        if raw.len() < NONCE_SIZE {
            return Err(ProtectorError::Malformed(
                "ciphertext shorter than nonce".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plain = self
            .cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: PURPOSE.as_bytes(),
                },
            )
            .map_err(|_| ProtectorError::Decrypt)?;

        String::from_utf8(plain).map_err(|e| ProtectorError::Malformed(format!("not utf-8: {e}")))
    }
}
