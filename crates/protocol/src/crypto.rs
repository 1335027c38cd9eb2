//! Encryption envelope for sensitive onboarding fields.
//!
//! Two independent strategies share the [`Encryptor`] trait:
//!
//! - [`MessageEncryptor`]: symmetric AES-256-GCM keyed by a digest of the
//!   access point's shared secret. Used on outbound credential fields.
//! - [`OnboardingEncryptor`]: an ephemeral RSA-2048 keypair whose public
//!   half is handed to the backend, which returns the access point
//!   descriptor encrypted against it.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::{ProtocolError, Result};

/// Salt appended to the shared secret before hashing it into a key.
pub const KEY_SALT: &str = "";

/// Size of the per-message AES-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Modulus size of the onboarding keypair in bits.
pub const RSA_KEY_BITS: usize = 2048;

/// A reversible transform applied to sensitive string fields.
pub trait Encryptor: Send + Sync {
    /// Encrypt UTF-8 plaintext into raw ciphertext bytes.
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>>;

    /// Decrypt raw ciphertext bytes back into UTF-8 plaintext.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<String>;
}

// ============================================================================
// Symmetric strategy
// ============================================================================

/// AES-256-GCM keyed by `SHA-256(shared_secret + KEY_SALT)`.
///
/// Output layout is `nonce || ciphertext || tag` with a fresh random nonce
/// for every message.
pub struct MessageEncryptor {
    cipher: Aes256Gcm,
}

impl MessageEncryptor {
    /// Derive the message key from a shared secret.
    pub fn new(shared_secret: &str) -> Result<Self> {
        let key = derive_key(shared_secret);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ProtocolError::KeyCreationFailed(e.to_string()))?;
        Ok(Self { cipher })
    }
}

fn derive_key(shared_secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret.as_bytes());
    hasher.update(KEY_SALT.as_bytes());
    hasher.finalize().into()
}

impl Encryptor for MessageEncryptor {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| ProtocolError::EncryptFailed("AES-GCM seal failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(ProtocolError::DecryptFailed(format!(
                "ciphertext too short: {} bytes",
                ciphertext.len()
            )));
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        let plaintext = self.cipher.decrypt(Nonce::from_slice(nonce), sealed)?;
        String::from_utf8(plaintext).map_err(|e| ProtocolError::DecryptFailed(e.to_string()))
    }
}

impl fmt::Debug for MessageEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEncryptor")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Asymmetric strategy
// ============================================================================

/// RSA PKCS#1 v1.5 keypair for the backend exchange.
///
/// Keys live only in memory. An encryptor built from an exported public key
/// can encrypt but has no private half to decrypt with.
#[derive(Clone)]
pub struct OnboardingEncryptor {
    private_key: Option<RsaPrivateKey>,
    public_key: RsaPublicKey,
}

impl OnboardingEncryptor {
    /// Generate a fresh 2048-bit keypair.
    pub fn generate() -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| ProtocolError::KeyCreationFailed(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            private_key: Some(private_key),
            public_key,
        })
    }

    /// Encrypt-only instance from a base64 PKCS#1 DER public key.
    pub fn from_public_key_base64(encoded: &str) -> Result<Self> {
        let der = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ProtocolError::KeyCreationFailed(e.to_string()))?;
        let public_key =
            RsaPublicKey::from_pkcs1_der(&der).map_err(|_| ProtocolError::UnsupportedAlgorithm)?;
        Ok(Self {
            private_key: None,
            public_key,
        })
    }

    /// PKCS#1 DER encoding of the public key.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        let document = self
            .public_key
            .to_pkcs1_der()
            .map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Base64 of [`public_key_der`](Self::public_key_der), for distribution.
    pub fn public_key_base64(&self) -> Result<String> {
        Ok(STANDARD.encode(self.public_key_der()?))
    }

    /// Modulus size in bytes; every ciphertext is exactly this long.
    pub fn block_size(&self) -> usize {
        self.public_key.size()
    }

    /// Whether this instance holds a private key.
    pub fn can_decrypt(&self) -> bool {
        self.private_key.is_some()
    }
}

impl Encryptor for OnboardingEncryptor {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        Ok(self
            .public_key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext.as_bytes())?)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String> {
        let private_key = self.private_key.as_ref().ok_or(ProtocolError::MissingKey)?;

        let expected = self.block_size();
        if ciphertext.len() != expected {
            return Err(ProtocolError::BlockSizeMismatch {
                expected,
                got: ciphertext.len(),
            });
        }

        let plaintext = private_key.decrypt(Pkcs1v15Encrypt, ciphertext)?;
        String::from_utf8(plaintext).map_err(|e| ProtocolError::DecryptFailed(e.to_string()))
    }
}

impl fmt::Debug for OnboardingEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnboardingEncryptor")
            .field("block_size", &self.block_size())
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
