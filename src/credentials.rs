// =============================================================================
// Credentials — AES-256-GCM envelope for per-user exchange keys
// =============================================================================
//
// Envelope layout: base64( nonce[12] || ciphertext ).  The 256-bit key comes
// from the process environment and is never persisted next to a ciphertext.
// Decrypted credentials live only in memory and are zeroed on drop; Debug
// output redacts both fields.
// =============================================================================

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment variable holding the hex-encoded 256-bit key.
pub const KEY_ENV_VAR: &str = "QUORUM_CRED_KEY";

const NONCE_LEN: usize = 12;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The key environment variable is unset.
    MissingKey,
    /// The key is not 64 hex characters.
    BadKey(String),
    /// The envelope is not valid base64 or is too short to hold a nonce.
    BadEnvelope(String),
    /// The cipher rejected the encryption input.
    EncryptFailed,
    /// Authentication failed: wrong key or tampered ciphertext.
    DecryptFailed,
    /// The decrypted payload is not a credentials document.
    BadPayload,
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingKey => write!(f, "{KEY_ENV_VAR} is not set"),
            Self::BadKey(reason) => write!(f, "bad credential key: {reason}"),
            Self::BadEnvelope(reason) => write!(f, "bad credential envelope: {reason}"),
            Self::EncryptFailed => write!(f, "credential encryption failed"),
            Self::DecryptFailed => write!(f, "credential decryption failed"),
            Self::BadPayload => write!(f, "credential payload is malformed"),
        }
    }
}

impl std::error::Error for CredentialError {}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Decrypted exchange credentials.  Held only in memory, zeroed on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Minimal shape check used by the executor's eligibility filter.
    pub fn is_valid(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Cipher
// ---------------------------------------------------------------------------

/// AES-256-GCM cipher over the process-level credential key.
pub struct CredentialCipher {
    key: [u8; 32],
}

impl CredentialCipher {
    pub fn from_key_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn from_key_hex(hex_key: &str) -> Result<Self, CredentialError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| CredentialError::BadKey(e.to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CredentialError::BadKey("key must be 32 bytes".to_string()))?;
        Ok(Self::from_key_bytes(key))
    }

    /// Build the cipher from the process environment.
    pub fn from_env() -> Result<Self, CredentialError> {
        let hex_key = std::env::var(KEY_ENV_VAR).map_err(|_| CredentialError::MissingKey)?;
        Self::from_key_hex(&hex_key)
    }

    /// Encrypt credentials into an envelope string.
    pub fn encrypt(&self, creds: &ApiCredentials) -> Result<String, CredentialError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut plaintext = serde_json::json!({
            "api_key": creds.api_key,
            "api_secret": creds.api_secret,
        })
        .to_string();

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CredentialError::EncryptFailed)?;
        plaintext.zeroize();

        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(envelope))
    }

    /// Decrypt an envelope back into credentials.
    pub fn decrypt(&self, envelope: &str) -> Result<ApiCredentials, CredentialError> {
        let raw = BASE64
            .decode(envelope.trim())
            .map_err(|e| CredentialError::BadEnvelope(e.to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(CredentialError::BadEnvelope(
                "envelope shorter than nonce".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let mut plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CredentialError::DecryptFailed)?;

        let parsed: serde_json::Value =
            serde_json::from_slice(&plaintext).map_err(|_| CredentialError::BadPayload)?;
        plaintext.zeroize();

        let api_key = parsed
            .get("api_key")
            .and_then(|v| v.as_str())
            .ok_or(CredentialError::BadPayload)?;
        let api_secret = parsed
            .get("api_secret")
            .and_then(|v| v.as_str())
            .ok_or(CredentialError::BadPayload)?;

        Ok(ApiCredentials::new(api_key, api_secret))
    }
}

impl Drop for CredentialCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
