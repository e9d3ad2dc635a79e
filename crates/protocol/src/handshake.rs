//! Handshake control messages.
//!
//! Handshake frames carry a MessagePack-encoded ordered tuple whose first
//! element is the operation number:
//!
//! | tuple                                 | direction        | meaning          |
//! |---------------------------------------|------------------|------------------|
//! | `[1]`                                 | client → server  | client hello     |
//! | `[2, serverPubKeyHex, signatureHex]`  | server → client  | server hello     |
//! | `[3, encapsulatedKeyHex]`             | client → server  | client key       |
//! | `[4, challengeString]`                | server → client  | server challenge |
//! | `[5, clientPubKeyHex, signatureHex]`  | client → server  | client auth      |
//! | `[6, sessionKeyEcho]`                 | server → client  | server accept    |
//!
//! Binary key and signature material is hex-encoded inside the tuples for
//! wire compatibility with existing deployments.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;

/// A handshake control message, one per operation of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    /// Operation 1: the client opens the handshake.
    ClientHello,
    /// Operation 2: the server presents its ephemeral KEM public key,
    /// signed by its root identity.
    ServerHello {
        /// Hex-encoded ephemeral KEM public key.
        public_key: String,
        /// Hex-encoded root signature over the raw public key bytes.
        signature: String,
    },
    /// Operation 3: the client returns the encapsulated symmetric key.
    ClientKey {
        /// Hex-encoded KEM ciphertext.
        encapsulated: String,
    },
    /// Operation 4: the server issues a random challenge, encrypted under
    /// the freshly derived key.
    Challenge {
        /// The challenge string to be signed by the client.
        challenge: String,
    },
    /// Operation 5: the client authenticates by signing the challenge with
    /// its session keypair. The public key presented here *is* the session
    /// identity (self-certifying).
    ClientAuth {
        /// Hex-encoded client public key (the session key).
        public_key: String,
        /// Hex-encoded signature over the challenge string.
        signature: String,
    },
    /// Operation 6: the server accepts, echoing the session key.
    Accept {
        /// Echo of the client's session key.
        session_key: String,
    },
}

impl HandshakeMessage {
    /// Returns the operation number of this message.
    pub fn op(&self) -> u8 {
        match self {
            HandshakeMessage::ClientHello => 1,
            HandshakeMessage::ServerHello { .. } => 2,
            HandshakeMessage::ClientKey { .. } => 3,
            HandshakeMessage::Challenge { .. } => 4,
            HandshakeMessage::ClientAuth { .. } => 5,
            HandshakeMessage::Accept { .. } => 6,
        }
    }

    /// Serializes this message to its MessagePack tuple form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Parses a message from its MessagePack tuple form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

// The tuple layout is positional, so the serde impls are written by hand
// rather than derived: a derive would tag the enum instead of emitting
// `[op, field, field]` sequences.

impl Serialize for HandshakeMessage {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            HandshakeMessage::ClientHello => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(&1u8)?;
                seq.end()
            }
            HandshakeMessage::ServerHello {
                public_key,
                signature,
            } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(&2u8)?;
                seq.serialize_element(public_key)?;
                seq.serialize_element(signature)?;
                seq.end()
            }
            HandshakeMessage::ClientKey { encapsulated } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&3u8)?;
                seq.serialize_element(encapsulated)?;
                seq.end()
            }
            HandshakeMessage::Challenge { challenge } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&4u8)?;
                seq.serialize_element(challenge)?;
                seq.end()
            }
            HandshakeMessage::ClientAuth {
                public_key,
                signature,
            } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(&5u8)?;
                seq.serialize_element(public_key)?;
                seq.serialize_element(signature)?;
                seq.end()
            }
            HandshakeMessage::Accept { session_key } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&6u8)?;
                seq.serialize_element(session_key)?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for HandshakeMessage {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MessageVisitor;

        impl<'de> Visitor<'de> for MessageVisitor {
            type Value = HandshakeMessage;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a handshake control tuple [op, ...]")
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let op: u8 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;

                fn field<'de, A: SeqAccess<'de>>(
                    seq: &mut A,
                    index: usize,
                ) -> std::result::Result<String, A::Error> {
                    seq.next_element()?
                        .ok_or_else(|| de::Error::invalid_length(index, &"a tuple element"))
                }

                let message = match op {
                    1 => HandshakeMessage::ClientHello,
                    2 => HandshakeMessage::ServerHello {
                        public_key: field(&mut seq, 1)?,
                        signature: field(&mut seq, 2)?,
                    },
                    3 => HandshakeMessage::ClientKey {
                        encapsulated: field(&mut seq, 1)?,
                    },
                    4 => HandshakeMessage::Challenge {
                        challenge: field(&mut seq, 1)?,
                    },
                    5 => HandshakeMessage::ClientAuth {
                        public_key: field(&mut seq, 1)?,
                        signature: field(&mut seq, 2)?,
                    },
                    6 => HandshakeMessage::Accept {
                        session_key: field(&mut seq, 1)?,
                    },
                    other => {
                        return Err(de::Error::custom(format!(
                            "unknown handshake operation {}",
                            other
                        )))
                    }
                };

                // Reject tuples with trailing elements.
                if seq.next_element::<serde::de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::custom("trailing elements in handshake tuple"));
                }

                Ok(message)
            }
        }

        deserializer.deserialize_seq(MessageVisitor)
    }
}
