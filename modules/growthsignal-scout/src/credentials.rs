// Credential resolution: stored (possibly encrypted) account blobs → typed
// per-platform credentials. Absence is routine and never an error.

use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use thiserror::Error;
use tracing::{debug, warn};

use growthsignal_common::{Config, Platform, PlatformCredentials};

use crate::store::DiscoveryStore;

const ENVELOPE_PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret is encrypted but no decryption key is configured")]
    MissingKey,
    #[error("secret envelope is invalid")]
    InvalidEnvelope,
    #[error("secret key id {0} is not configured")]
    UnknownKeyId(String),
    #[error("failed to decode secret envelope: {0}")]
    Decode(String),
    #[error("failed to decrypt secret")]
    Decrypt,
    #[error("failed to encrypt secret")]
    Encrypt,
}

/// ChaCha20-Poly1305 key for `enc:v1:<key_id>:<nonce>:<ciphertext>` envelopes.
#[derive(Clone)]
pub struct SecretCipher {
    key_id: String,
    key: [u8; 32],
}

impl SecretCipher {
    pub fn new(key_id: &str, key: [u8; 32]) -> Self {
        Self {
            key_id: key_id.to_string(),
            key,
        }
    }

    /// Build from a base64 (standard or URL-safe) 32-byte key. Returns `None`,
    /// with a warning, when the key is malformed.
    pub fn from_base64(key_id: &str, encoded: &str) -> Option<Self> {
        let decoded = URL_SAFE_NO_PAD
            .decode(encoded.trim().as_bytes())
            .or_else(|_| STANDARD.decode(encoded.trim().as_bytes()));
        match decoded {
            Ok(bytes) if bytes.len() == 32 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                Some(Self::new(key_id, key))
            }
            Ok(bytes) => {
                warn!(
                    key_bytes = bytes.len(),
                    "credential encryption key ignored: expected a 32-byte value"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "credential encryption key ignored: invalid base64");
                None
            }
        }
    }

    pub fn from_config(config: &Config) -> Option<Self> {
        let encoded = config.credentials_encryption_key.as_deref()?;
        Self::from_base64(&config.credentials_key_id, encoded)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let aead = ChaCha20Poly1305::new_from_slice(&self.key).map_err(|_| SecretError::Encrypt)?;
        let ciphertext = aead
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| SecretError::Encrypt)?;
        Ok(format!(
            "{ENVELOPE_PREFIX}{}:{}:{}",
            self.key_id,
            URL_SAFE_NO_PAD.encode(nonce_bytes),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    fn decrypt_envelope(&self, stored: &str) -> Result<String, SecretError> {
        let rest = stored
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or(SecretError::InvalidEnvelope)?;
        let parts: Vec<&str> = rest.split(':').collect();
        let [key_id, nonce_b64, ciphertext_b64] = parts[..] else {
            return Err(SecretError::InvalidEnvelope);
        };
        if key_id != self.key_id {
            return Err(SecretError::UnknownKeyId(key_id.to_string()));
        }

        let nonce = URL_SAFE_NO_PAD
            .decode(nonce_b64.as_bytes())
            .map_err(|e| SecretError::Decode(e.to_string()))?;
        if nonce.len() != NONCE_LEN {
            return Err(SecretError::InvalidEnvelope);
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64.as_bytes())
            .map_err(|e| SecretError::Decode(e.to_string()))?;

        let aead = ChaCha20Poly1305::new_from_slice(&self.key).map_err(|_| SecretError::Decrypt)?;
        let plaintext = aead
            .decrypt(Nonce::from_slice(nonce.as_slice()), ciphertext.as_ref())
            .map_err(|_| SecretError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|e| SecretError::Decode(e.to_string()))
    }
}

pub fn is_encrypted(stored: &str) -> bool {
    stored.starts_with(ENVELOPE_PREFIX)
}

/// Decrypt a stored secret. Plaintext values pass through unchanged.
pub fn decrypt_secret(stored: &str, cipher: Option<&SecretCipher>) -> Result<String, SecretError> {
    if !is_encrypted(stored) {
        return Ok(stored.to_string());
    }
    let cipher = cipher.ok_or(SecretError::MissingKey)?;
    cipher.decrypt_envelope(stored)
}

/// Looks up the active account for a platform and returns typed credentials,
/// or `None` to signal public/fallback mode.
pub struct CredentialResolver {
    store: Arc<dyn DiscoveryStore>,
    cipher: Option<SecretCipher>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn DiscoveryStore>, cipher: Option<SecretCipher>) -> Self {
        Self { store, cipher }
    }

    /// Every failure mode (lookup error, stale key, bad JSON) degrades to `None`.
    pub async fn resolve(&self, platform: Platform) -> Option<PlatformCredentials> {
        let stored = match self.store.account_credentials(platform).await {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!(%platform, "No stored credentials, using fallback mode");
                return None;
            }
            Err(e) => {
                warn!(%platform, error = %e, "Credential lookup failed, using fallback mode");
                return None;
            }
        };

        let json = match decrypt_secret(&stored, self.cipher.as_ref()) {
            Ok(json) => json,
            Err(e) => {
                warn!(%platform, error = %e, "Credential decryption failed, using fallback mode");
                return None;
            }
        };

        match PlatformCredentials::parse(platform, &json) {
            Ok(creds) => creds,
            Err(e) => {
                warn!(%platform, error = %e, "Stored credentials are malformed, using fallback mode");
                None
            }
        }
    }
}
