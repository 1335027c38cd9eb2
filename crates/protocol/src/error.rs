//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Serialization errors
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The frame wrapper is malformed or its declared length disagrees with the body.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    // Interaction errors
    /// The owner of a pending response went away before the response arrived.
    #[error("instance destroyed before the operation completed")]
    InstanceDestroyed,

    /// A command was issued while the outbound half of the socket was not open.
    #[error("connection is not open")]
    NotOpenConnection,

    // Cryptographic errors
    /// Key material could not be generated.
    #[error("key creation failed: {0}")]
    KeyCreationFailed(String),

    /// The key does not support the requested operation.
    #[error("unsupported algorithm for this key")]
    UnsupportedAlgorithm,

    /// Ciphertext length does not match the key's block size.
    #[error("block size mismatch: expected {expected} bytes, got {got} bytes")]
    BlockSizeMismatch {
        /// Block size of the key.
        expected: usize,
        /// Length of the supplied ciphertext.
        got: usize,
    },

    /// No key is available for the operation.
    #[error("missing key")]
    MissingKey,

    /// Encryption operation failed.
    #[error("encryption failed: {0}")]
    EncryptFailed(String),

    /// Decryption operation failed.
    #[error("decryption failed: {0}")]
    DecryptFailed(String),

    // Connection errors
    /// Connection was closed unexpectedly.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Operation timed out.
    #[error("operation timed out: {0}")]
    Timeout(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

impl From<base64::DecodeError> for ProtocolError {
    fn from(err: base64::DecodeError) -> Self {
        ProtocolError::DecryptFailed(format!("invalid base64 ciphertext: {}", err))
    }
}

impl From<rsa::Error> for ProtocolError {
    fn from(err: rsa::Error) -> Self {
        match err {
            rsa::Error::MessageTooLong => {
                ProtocolError::EncryptFailed("message too long for key size".to_string())
            }
            rsa::Error::Decryption => ProtocolError::DecryptFailed(err.to_string()),
            rsa::Error::InvalidPrime
            | rsa::Error::InvalidModulus
            | rsa::Error::InvalidExponent
            | rsa::Error::InvalidCoefficient
            | rsa::Error::NprimesTooSmall
            | rsa::Error::TooFewPrimes => ProtocolError::KeyCreationFailed(err.to_string()),
            _ => ProtocolError::EncryptFailed(err.to_string()),
        }
    }
}

impl From<aes_gcm::Error> for ProtocolError {
    fn from(_: aes_gcm::Error) -> Self {
        // The AEAD error is opaque on purpose: it never says which step failed.
        ProtocolError::DecryptFailed("authentication tag mismatch".to_string())
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut => ProtocolError::Timeout(err.to_string()),
            _ => ProtocolError::ConnectionClosed(err.to_string()),
        }
    }
}
