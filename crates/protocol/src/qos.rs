//! QoS sub-frame encoding for session data.
//!
//! After decryption, a session data frame (`0x03`) carries one of three
//! payload shapes, discriminated by a leading sub-tag byte:
//!
//! ```text
//! 0x00 ‖ payload                      QoS0 datagram (fire-and-forget)
//! 0x01 ‖ id:u32be ‖ 0x00 ‖ payload    QoS1 data (at-least-once)
//! 0x01 ‖ id:u32be ‖ 0xFF              QoS1 ack (empty payload)
//! ```
//!
//! QoS1 packet identifiers are 4-byte big-endian values; the receiver acks
//! every QoS1 data packet unconditionally and uses the identifier for
//! deduplication.

use crate::error::{ProtocolError, Result};

/// Sub-tag for best-effort datagrams.
pub const SUBTAG_QOS0: u8 = 0x00;

/// Sub-tag for reliable (acknowledged) packets.
pub const SUBTAG_QOS1: u8 = 0x01;

/// Marker byte distinguishing a QoS1 ack from QoS1 data.
pub const MARKER_ACK: u8 = 0xFF;

/// Marker byte for QoS1 data.
pub const MARKER_DATA: u8 = 0x00;

/// A QoS1 packet identifier.
pub type PacketId = u32;

/// The delivery class of a data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosClass {
    /// QoS0: best effort, at most once, never retransmitted.
    Datagram,
    /// QoS1: acknowledged and deduplicated.
    Reliable,
}

/// A decoded session payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPayload {
    /// Best-effort data, delivered at most once, never retransmitted.
    Datagram(Vec<u8>),
    /// Reliable data, retransmitted until the identifier is acknowledged.
    Reliable {
        /// Deduplication identifier.
        id: PacketId,
        /// Application payload.
        payload: Vec<u8>,
    },
    /// Acknowledgment of a reliable packet.
    Ack {
        /// Identifier of the packet being acknowledged.
        id: PacketId,
    },
}

impl SessionPayload {
    /// Encodes this payload into its sub-frame form (pre-encryption).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            SessionPayload::Datagram(payload) => {
                let mut out = Vec::with_capacity(1 + payload.len());
                out.push(SUBTAG_QOS0);
                out.extend_from_slice(payload);
                out
            }
            SessionPayload::Reliable { id, payload } => {
                let mut out = Vec::with_capacity(6 + payload.len());
                out.push(SUBTAG_QOS1);
                out.extend_from_slice(&id.to_be_bytes());
                out.push(MARKER_DATA);
                out.extend_from_slice(payload);
                out
            }
            SessionPayload::Ack { id } => {
                let mut out = Vec::with_capacity(6);
                out.push(SUBTAG_QOS1);
                out.extend_from_slice(&id.to_be_bytes());
                out.push(MARKER_ACK);
                out
            }
        }
    }

    /// Decodes a sub-frame (post-decryption).
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (&subtag, rest) = data
            .split_first()
            .ok_or_else(|| ProtocolError::MalformedFrame("empty session payload".to_string()))?;

        match subtag {
            SUBTAG_QOS0 => Ok(SessionPayload::Datagram(rest.to_vec())),
            SUBTAG_QOS1 => {
                if rest.len() < 5 {
                    return Err(ProtocolError::MalformedFrame(format!(
                        "reliable sub-frame too short: {} bytes",
                        rest.len()
                    )));
                }
                let id = PacketId::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
                match rest[4] {
                    MARKER_ACK => Ok(SessionPayload::Ack { id }),
                    _ => Ok(SessionPayload::Reliable {
                        id,
                        payload: rest[5..].to_vec(),
                    }),
                }
            }
            other => Err(ProtocolError::MalformedFrame(format!(
                "unknown session sub-tag {:#04x}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datagram_layout() {
        let encoded = SessionPayload::Datagram(b"hi".to_vec()).encode();
        assert_eq!(encoded, vec![0x00, b'h', b'i']);
    }

    #[test]
    fn test_reliable_layout() {
        let encoded = SessionPayload::Reliable {
            id: 0x01020304,
            payload: b"x".to_vec(),
        }
        .encode();
        assert_eq!(encoded, vec![0x01, 0x01, 0x02, 0x03, 0x04, 0x00, b'x']);
    }

    #[test]
    fn test_ack_layout() {
        let encoded = SessionPayload::Ack { id: 7 }.encode();
        assert_eq!(encoded, vec![0x01, 0x00, 0x00, 0x00, 0x07, 0xFF]);
    }

    #[test]
    fn test_roundtrip() {
        let payloads = [
            SessionPayload::Datagram(Vec::new()),
            SessionPayload::Datagram(b"best effort".to_vec()),
            SessionPayload::Reliable {
                id: 0,
                payload: Vec::new(),
            },
            SessionPayload::Reliable {
                id: u32::MAX,
                payload: b"reliable".to_vec(),
            },
            SessionPayload::Ack { id: 1 },
        ];
        for payload in payloads {
            assert_eq!(SessionPayload::decode(&payload.encode()).unwrap(), payload);
        }
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert!(SessionPayload::decode(&[]).is_err());
    }

    #[test]
    fn test_truncated_reliable_rejected() {
        assert!(SessionPayload::decode(&[0x01, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_unknown_subtag_rejected() {
        assert!(SessionPayload::decode(&[0x02, 0x00]).is_err());
    }

    #[test]
    fn test_nonstandard_data_marker_is_data() {
        // Any marker byte other than 0xFF denotes data; the marker is not
        // part of the payload.
        let decoded = SessionPayload::decode(&[0x01, 0, 0, 0, 1, 0x01, 0xAB]).unwrap();
        assert_eq!(
            decoded,
            SessionPayload::Reliable {
                id: 1,
                payload: vec![0xAB],
            }
        );
    }
}
