//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
///
/// Cryptographic failures are deliberately coarse: the remote peer must not
/// be able to distinguish a signature mismatch from a decryption failure,
/// so callers terminate the stream on any of these without elaborating.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Serialization errors
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    // Cryptographic errors
    /// Encryption operation failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption operation failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Signature verification failed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Invalid or malformed key material (public key, secret key, or
    /// encapsulated ciphertext).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    // Frame errors
    /// Frame is too short or has an unknown type byte.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    // Handshake errors
    /// A handshake control message arrived outside its expected state.
    #[error("unexpected handshake message: op {op} in state {state}")]
    UnexpectedMessage {
        /// Operation number of the offending message.
        op: u8,
        /// Name of the state the machine was in.
        state: &'static str,
    },

    /// The session key echoed by the server does not match our own.
    #[error("session key echo mismatch")]
    SessionKeyMismatch,
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ProtocolError::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ProtocolError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        ProtocolError::Deserialization(err.to_string())
    }
}

impl From<hex::FromHexError> for ProtocolError {
    fn from(err: hex::FromHexError) -> Self {
        ProtocolError::InvalidKeyMaterial(err.to_string())
    }
}
