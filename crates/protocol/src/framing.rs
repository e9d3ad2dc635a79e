//! Frame codec for the peerwire wire format.
//!
//! # Frame Format
//!
//! Every frame starts with a single type byte:
//!
//! - `0x02`: handshake control frame (payload is a MessagePack tuple,
//!   see [`crate::handshake`])
//! - `0x03`: session data frame (payload is a QoS sub-frame,
//!   see [`crate::qos`])
//!
//! Before a symmetric key is established the payload follows the type byte
//! in the clear. Once a key exists, a 16-byte random IV follows the type
//! byte and the remainder is AES-256-GCM ciphertext:
//!
//! ```text
//! no key:   [type:u8][payload...]
//! with key: [type:u8][iv:16][ciphertext...]
//! ```
//!
//! A decryption failure or malformed layout is surfaced as an error; the
//! caller terminates the stream.

use crate::crypto::{SymmetricKey, IV_LENGTH};
use crate::error::{ProtocolError, Result};

/// Type byte for handshake control frames.
pub const FRAME_TYPE_HANDSHAKE: u8 = 0x02;

/// Type byte for session data frames.
pub const FRAME_TYPE_SESSION: u8 = 0x03;

/// The kind of a wire frame, taken from its leading type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Handshake control frame (`0x02`).
    Handshake,
    /// Session data frame (`0x03`).
    SessionData,
}

impl FrameKind {
    /// Returns the wire type byte for this kind.
    pub fn as_byte(self) -> u8 {
        match self {
            FrameKind::Handshake => FRAME_TYPE_HANDSHAKE,
            FrameKind::SessionData => FRAME_TYPE_SESSION,
        }
    }

    /// Parses a wire type byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            FRAME_TYPE_HANDSHAKE => Ok(FrameKind::Handshake),
            FRAME_TYPE_SESSION => Ok(FrameKind::SessionData),
            other => Err(ProtocolError::MalformedFrame(format!(
                "unknown frame type byte {:#04x}",
                other
            ))),
        }
    }
}

/// A decoded frame: kind plus plaintext payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame kind.
    pub kind: FrameKind,
    /// The payload in plaintext form (already decrypted if a key exists).
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a handshake control frame.
    pub fn handshake(payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Handshake,
            payload,
        }
    }

    /// Creates a session data frame.
    pub fn session(payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::SessionData,
            payload,
        }
    }
}

/// Encoder and decoder for wire frames.
///
/// The codec starts in plaintext mode. Once the handshake derives a
/// symmetric key, [`FrameCodec::install_key`] switches every subsequent
/// encode/decode to AEAD mode. The codec is cheap to clone so a split
/// reader/writer pair can each hold one.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    key: Option<SymmetricKey>,
}

impl FrameCodec {
    /// Creates a codec in plaintext (pre-handshake) mode.
    pub fn new() -> Self {
        Self { key: None }
    }

    /// Installs the negotiated symmetric key, switching to AEAD mode.
    pub fn install_key(&mut self, key: SymmetricKey) {
        self.key = Some(key);
    }

    /// Returns whether a symmetric key has been installed.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Encodes a frame into its wire representation.
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(1 + IV_LENGTH + frame.payload.len() + 16);
        out.push(frame.kind.as_byte());

        match &self.key {
            Some(key) => {
                let (iv, ciphertext) = key.seal(&frame.payload)?;
                out.extend_from_slice(&iv);
                out.extend_from_slice(&ciphertext);
            }
            None => out.extend_from_slice(&frame.payload),
        }

        Ok(out)
    }

    /// Decodes a wire frame, decrypting the payload if a key is installed.
    pub fn decode(&self, data: &[u8]) -> Result<Frame> {
        let (&type_byte, rest) = data
            .split_first()
            .ok_or_else(|| ProtocolError::MalformedFrame("empty frame".to_string()))?;
        let kind = FrameKind::from_byte(type_byte)?;

        let payload = match &self.key {
            Some(key) => {
                if rest.len() < IV_LENGTH {
                    return Err(ProtocolError::MalformedFrame(format!(
                        "encrypted frame too short: {} bytes after type",
                        rest.len()
                    )));
                }
                let mut iv = [0u8; IV_LENGTH];
                iv.copy_from_slice(&rest[..IV_LENGTH]);
                key.open(&iv, &rest[IV_LENGTH..])?
            }
            None => rest.to_vec(),
        };

        Ok(Frame { kind, payload })
    }
}
