//! # Peerwire Protocol Library
//!
//! This crate provides the sans-I/O protocol layer for peerwire: a
//! peer-to-peer secure session protocol with post-quantum key
//! establishment, per-frame AEAD, and reliable (QoS1) delivery.
//!
//! ## Overview
//!
//! The protocol crate is the foundation of peerwire's communication layer,
//! providing:
//!
//! - **Frame Codec**: Type-tagged frames, encrypted once a session key exists
//! - **Handshake Messages**: The six MessagePack control tuples of the handshake
//! - **Cryptographic Identity**: ML-DSA-65 identities, ML-KEM-768 encapsulation,
//!   AES-256-GCM transport encryption
//! - **QoS Sub-frames**: Datagram, reliable-data, and ack payload shapes
//! - **Paths & Versions**: Protocol path parsing and semver negotiation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Application Payloads             │  QoS0 / QoS1 sub-frames
//! ├─────────────────────────────────────────┤
//! │        AES-256-GCM Encryption           │  16-byte IV per frame
//! ├─────────────────────────────────────────┤
//! │        Frame Type Tagging               │  0x02 handshake, 0x03 data
//! ├─────────────────────────────────────────┤
//! │        Transport (caller-supplied)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Everything here is pure: no sockets, no timers, no async runtime. The
//! companion `peerwire-node` crate drives these pieces over real streams.
//!
//! ## Modules
//!
//! - [`crypto`]: Identities, key encapsulation, and AEAD
//! - [`framing`]: Wire frame codec
//! - [`handshake`]: Handshake control tuples
//! - [`qos`]: Session payload sub-frames
//! - [`path`]: Protocol paths and version negotiation
//! - [`error`]: Error types

pub mod crypto;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod path;
pub mod qos;

pub use crypto::{
    random_challenge, IdentityKeyPair, Iv, KemKeyPair, KemPublicKey, SessionKey, Signature,
    SigningKey, SymmetricKey, VerifyingKey, CHALLENGE_LENGTH, IV_LENGTH, SYMMETRIC_KEY_LENGTH,
};
pub use error::{ProtocolError, Result};
pub use framing::{Frame, FrameCodec, FrameKind, FRAME_TYPE_HANDSHAKE, FRAME_TYPE_SESSION};
pub use handshake::HandshakeMessage;
pub use path::{ProtocolPath, PROTOCOL_NAME, SUPPORTED_VERSIONS};
pub use qos::{PacketId, QosClass, SessionPayload};
