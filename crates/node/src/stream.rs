//! Pumps a post-handshake byte stream into and out of a session.
//!
//! After the handshake, the stream carries only encrypted session data
//! frames. The writer task drains the session's outbound queue; the
//! reader task decrypts inbound frames and feeds them to the session.
//! When either side fails or the peer hangs up, the session is suspended
//! through the registry, which starts the resumption grace timer.

use std::sync::Arc;

use peerwire_protocol::{Frame, FrameCodec, FrameKind, SessionPayload};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::framed;
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::transport::BoxedConn;

/// Binds `session` to `conn` and spawns the reader/writer pair.
///
/// Fails without consuming the session if it already has a live stream;
/// the caller drops the new stream in that case.
pub(crate) fn attach(
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    conn: BoxedConn,
    codec: FrameCodec,
) -> Result<()> {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    session.bind(outbound_tx)?;

    let (mut read_half, mut write_half) = tokio::io::split(conn);

    let write_codec = codec.clone();
    let writer = tokio::spawn(async move {
        while let Some(subframe) = outbound_rx.recv().await {
            let wire = match write_codec.encode(&Frame::session(subframe)) {
                Ok(wire) => wire,
                Err(error) => {
                    warn!(%error, "failed to encode outbound frame");
                    break;
                }
            };
            if framed::write_frame(&mut write_half, &wire).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        loop {
            let bytes = match framed::read_frame(&mut read_half).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    debug!(session = %session.session_key(), "peer closed the stream");
                    break;
                }
                Err(error) => {
                    debug!(session = %session.session_key(), %error, "stream read failed");
                    break;
                }
            };

            let frame = match codec.decode(&bytes) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(session = %session.session_key(), %error, "dropping stream");
                    break;
                }
            };
            if frame.kind != FrameKind::SessionData {
                warn!(session = %session.session_key(), "handshake frame after establishment");
                break;
            }
            match SessionPayload::decode(&frame.payload) {
                Ok(payload) => session.handle_payload(payload),
                Err(error) => {
                    warn!(session = %session.session_key(), %error, "malformed session payload");
                    break;
                }
            }
        }

        writer.abort();
        registry.suspend(&session);
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionEvent;
    use peerwire_protocol::{IdentityKeyPair, QosClass, SymmetricKey, SYMMETRIC_KEY_LENGTH};
    use std::time::Duration;

    fn keyed_codec() -> FrameCodec {
        let mut codec = FrameCodec::new();
        codec.install_key(SymmetricKey::from_bytes([5u8; SYMMETRIC_KEY_LENGTH]));
        codec
    }

    fn setup() -> (
        Arc<Session>,
        crate::session::SessionHandle,
        Arc<SessionRegistry>,
    ) {
        let key = IdentityKeyPair::generate().session_key();
        let (session, handle) = Session::new("test-app", key);
        let registry = SessionRegistry::new(Duration::from_millis(30_000));
        registry.insert(Arc::clone(&session));
        (session, handle, registry)
    }

    #[tokio::test]
    async fn test_outbound_data_reaches_the_wire() {
        let (session, _handle, registry) = setup();
        let (local, mut remote) = tokio::io::duplex(4096);
        attach(Arc::clone(&session), registry, Box::new(local), keyed_codec()).unwrap();

        session.send_datagram(b"over the wire".to_vec());

        let wire = framed::read_frame(&mut remote).await.unwrap().unwrap();
        let frame = keyed_codec().decode(&wire).unwrap();
        assert_eq!(
            SessionPayload::decode(&frame.payload).unwrap(),
            SessionPayload::Datagram(b"over the wire".to_vec())
        );
    }

    #[tokio::test]
    async fn test_inbound_data_reaches_the_session() {
        let (session, mut handle, registry) = setup();
        let (local, mut remote) = tokio::io::duplex(4096);
        attach(Arc::clone(&session), registry, Box::new(local), keyed_codec()).unwrap();

        let payload = SessionPayload::Datagram(b"incoming".to_vec()).encode();
        let wire = keyed_codec().encode(&Frame::session(payload)).unwrap();
        framed::write_frame(&mut remote, &wire).await.unwrap();

        assert_eq!(
            handle.recv().await.unwrap(),
            SessionEvent::Data {
                qos: QosClass::Datagram,
                payload: b"incoming".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn test_peer_hangup_suspends_the_session() {
        let (session, mut handle, registry) = setup();
        let (local, remote) = tokio::io::duplex(4096);
        attach(Arc::clone(&session), registry, Box::new(local), keyed_codec()).unwrap();

        drop(remote);
        assert_eq!(handle.recv().await.unwrap(), SessionEvent::Suspended);
        assert!(!session.is_bound());
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_garbage_frame_drops_the_stream() {
        let (session, mut handle, registry) = setup();
        let (local, mut remote) = tokio::io::duplex(4096);
        attach(Arc::clone(&session), registry, Box::new(local), keyed_codec()).unwrap();

        framed::write_frame(&mut remote, &[0x03, 1, 2, 3])
            .await
            .unwrap();
        assert_eq!(handle.recv().await.unwrap(), SessionEvent::Suspended);
    }

    #[tokio::test]
    async fn test_attach_to_bound_session_fails() {
        let (session, _handle, registry) = setup();
        let (local, _remote) = tokio::io::duplex(4096);
        attach(
            Arc::clone(&session),
            Arc::clone(&registry),
            Box::new(local),
            keyed_codec(),
        )
        .unwrap();

        let (local2, _remote2) = tokio::io::duplex(4096);
        assert!(attach(session, registry, Box::new(local2), keyed_codec()).is_err());
    }
}
