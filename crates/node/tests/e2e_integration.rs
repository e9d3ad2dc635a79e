//! End-to-end integration tests over the in-memory transport fabric.
//!
//! Two full nodes (or a node plus a hand-driven client) talk through
//! `MemoryFabric`, exercising handshake, encrypted data exchange,
//! reliable delivery, stream loss, and session resumption.

use std::sync::Arc;
use std::time::Duration;

use peerwire_node::transport::{MemoryFabric, PeerRecord};
use peerwire_node::{framed, handshake, AppConfig, Config, Node, NodeEvent, Role, SessionEvent};
use peerwire_protocol::{Frame, IdentityKeyPair, QosClass, SessionPayload};
use tokio::sync::mpsc;

const APP: &str = "chat";

struct ServerSide {
    node: Arc<Node>,
    events: mpsc::UnboundedReceiver<NodeEvent>,
    root: IdentityKeyPair,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn start_server(fabric: &Arc<MemoryFabric>, addr: &str, resumption_wait_ms: u64) -> ServerSide {
    init_tracing();
    let root = IdentityKeyPair::generate();
    let config = Config {
        resumption_wait_ms,
        apps: vec![AppConfig {
            app_id: APP.to_string(),
            hidden: false,
            role: Role::Server {
                signing_public_key: root.verifying_key().to_hex(),
                signing_secret_key: root.signing_key().to_hex(),
            },
        }],
        ..Default::default()
    };
    let (dialer, inbound) = fabric.register(addr);
    let (node, events) = Node::new(config, Arc::new(dialer)).unwrap();
    let node = Arc::new(node);
    node.spawn_inbound_loop(inbound);
    ServerSide { node, events, root }
}

fn start_client(fabric: &Arc<MemoryFabric>, addr: &str, server: &ServerSide) -> Arc<Node> {
    let config = Config {
        apps: vec![AppConfig {
            app_id: APP.to_string(),
            hidden: false,
            role: Role::Client {
                trusted_keys: vec![server.root.verifying_key().to_hex()],
            },
        }],
        ..Default::default()
    };
    let (dialer, inbound) = fabric.register(addr);
    let (node, _events) = Node::new(config, Arc::new(dialer)).unwrap();
    let node = Arc::new(node);
    node.spawn_inbound_loop(inbound);
    node
}

async fn server_session(server: &mut ServerSide) -> peerwire_node::SessionHandle {
    match server.events.recv().await {
        Some(NodeEvent::SessionEstablished { app_id, session }) => {
            assert_eq!(app_id, APP);
            session
        }
        None => panic!("server event channel closed"),
    }
}

#[tokio::test]
async fn test_bidirectional_exchange() {
    let fabric = MemoryFabric::new();
    let mut server = start_server(&fabric, "server", 30_000);
    let client = start_client(&fabric, "client", &server);

    client.observe_peer(PeerRecord {
        addr: "server".to_string(),
        paths: server.node.advertised_paths(),
    });

    let mut outbound = client.connect(APP).await.unwrap();
    let mut inbound = server_session(&mut server).await;
    assert_eq!(*inbound.session_key(), outbound.identity.session_key());

    // Client → server, both QoS classes; the events carry the class.
    outbound.handle.send_reliable(b"reliable ping".to_vec()).unwrap();
    outbound.handle.send(b"best effort ping".to_vec());
    assert_eq!(
        inbound.recv().await.unwrap(),
        SessionEvent::Data {
            qos: QosClass::Reliable,
            payload: b"reliable ping".to_vec()
        }
    );
    assert_eq!(
        inbound.recv().await.unwrap(),
        SessionEvent::Data {
            qos: QosClass::Datagram,
            payload: b"best effort ping".to_vec()
        }
    );

    // Server → client.
    inbound.send_reliable(b"pong".to_vec()).unwrap();
    assert_eq!(
        outbound.handle.recv().await.unwrap(),
        SessionEvent::Data {
            qos: QosClass::Reliable,
            payload: b"pong".to_vec()
        }
    );

    // The reliable packets were acknowledged end to end.
    wait_for(|| outbound.handle.unacked() == 0).await;
    wait_for(|| inbound.unacked() == 0).await;
}

#[tokio::test]
async fn test_second_session_from_new_identity() {
    let fabric = MemoryFabric::new();
    let mut server = start_server(&fabric, "server", 30_000);
    let client = start_client(&fabric, "client", &server);
    client.observe_peer(PeerRecord {
        addr: "server".to_string(),
        paths: server.node.advertised_paths(),
    });

    let first = client.connect(APP).await.unwrap();
    let second = client.connect(APP).await.unwrap();
    assert_ne!(
        first.identity.session_key(),
        second.identity.session_key()
    );

    let a = server_session(&mut server).await;
    let b = server_session(&mut server).await;
    assert_ne!(a.session_key(), b.session_key());
    assert_eq!(server.node.session_count(), 2);
}

#[tokio::test]
async fn test_resumption_carries_buffered_packets() {
    let fabric = MemoryFabric::new();
    let mut server = start_server(&fabric, "server", 30_000);
    let trusted = vec![server.root.verifying_key().clone()];
    let (dialer, _inbound) = fabric.register("client");
    let identity = IdentityKeyPair::generate();

    // Hand-driven client: handshake, then vanish.
    use peerwire_node::Dialer;
    let mut conn = dialer
        .dial(&"server".to_string(), "/peerwire/chat/0.1.0")
        .await
        .unwrap();
    handshake::connect(&mut conn, &identity, &trusted)
        .await
        .unwrap();

    let mut session = server_session(&mut server).await;
    drop(conn);
    assert_eq!(session.recv().await.unwrap(), SessionEvent::Suspended);

    // Queued while no stream is bound.
    session.send_reliable(b"queued while away".to_vec()).unwrap();
    assert_eq!(session.unacked(), 1);

    // Reconnect with the same identity inside the grace window.
    let mut conn = dialer
        .dial(&"server".to_string(), "/peerwire/chat/0.1.0")
        .await
        .unwrap();
    let codec = handshake::connect(&mut conn, &identity, &trusted)
        .await
        .unwrap();
    assert_eq!(session.recv().await.unwrap(), SessionEvent::Resumed);

    // The buffered packet is flushed on rebind; ack it.
    let wire = framed::read_frame(&mut conn).await.unwrap().unwrap();
    let frame = codec.decode(&wire).unwrap();
    let SessionPayload::Reliable { id, payload } = SessionPayload::decode(&frame.payload).unwrap()
    else {
        panic!("expected the buffered reliable packet");
    };
    assert_eq!(payload, b"queued while away");

    let ack = codec
        .encode(&Frame::session(SessionPayload::Ack { id }.encode()))
        .unwrap();
    framed::write_frame(&mut conn, &ack).await.unwrap();

    wait_for(|| session.unacked() == 0).await;
    assert_eq!(server.node.session_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_grace_window_expiry_destroys_session() {
    let fabric = MemoryFabric::new();
    let mut server = start_server(&fabric, "server", 30_000);
    let trusted = vec![server.root.verifying_key().clone()];
    let (dialer, _inbound) = fabric.register("client");
    let identity = IdentityKeyPair::generate();

    use peerwire_node::Dialer;
    let mut conn = dialer
        .dial(&"server".to_string(), "/peerwire/chat/0.1.0")
        .await
        .unwrap();
    handshake::connect(&mut conn, &identity, &trusted)
        .await
        .unwrap();

    let mut session = server_session(&mut server).await;
    assert_eq!(server.node.session_count(), 1);

    drop(conn);
    assert_eq!(session.recv().await.unwrap(), SessionEvent::Suspended);
    // Paused time auto-advances through the 30s window.
    assert_eq!(session.recv().await.unwrap(), SessionEvent::Closed);
    assert_eq!(server.node.session_count(), 0);

    // A reconnect with the same identity now yields a brand new session.
    let mut conn = dialer
        .dial(&"server".to_string(), "/peerwire/chat/0.1.0")
        .await
        .unwrap();
    handshake::connect(&mut conn, &identity, &trusted)
        .await
        .unwrap();
    let fresh = server_session(&mut server).await;
    assert_eq!(*fresh.session_key(), identity.session_key());
}

#[tokio::test]
async fn test_duplicate_reliable_packet_delivered_once() {
    let fabric = MemoryFabric::new();
    let mut server = start_server(&fabric, "server", 30_000);
    let trusted = vec![server.root.verifying_key().clone()];
    let (dialer, _inbound) = fabric.register("client");
    let identity = IdentityKeyPair::generate();

    use peerwire_node::Dialer;
    let mut conn = dialer
        .dial(&"server".to_string(), "/peerwire/chat/0.1.0")
        .await
        .unwrap();
    let codec = handshake::connect(&mut conn, &identity, &trusted)
        .await
        .unwrap();
    let mut session = server_session(&mut server).await;

    // Send the same packet id twice, as a retransmitting sender would.
    for _ in 0..2 {
        let wire = codec
            .encode(&Frame::session(
                SessionPayload::Reliable {
                    id: 7,
                    payload: b"exactly once".to_vec(),
                }
                .encode(),
            ))
            .unwrap();
        framed::write_frame(&mut conn, &wire).await.unwrap();
    }

    // Two acks come back.
    for _ in 0..2 {
        let wire = framed::read_frame(&mut conn).await.unwrap().unwrap();
        let frame = codec.decode(&wire).unwrap();
        assert_eq!(
            SessionPayload::decode(&frame.payload).unwrap(),
            SessionPayload::Ack { id: 7 }
        );
    }

    // One delivery happens.
    assert_eq!(
        session.recv().await.unwrap(),
        SessionEvent::Data {
            qos: QosClass::Reliable,
            payload: b"exactly once".to_vec()
        }
    );
    session.close();
    assert_eq!(session.recv().await.unwrap(), SessionEvent::Closed);
}

#[tokio::test]
async fn test_shutdown_closes_established_sessions() {
    let fabric = MemoryFabric::new();
    let mut server = start_server(&fabric, "server", 30_000);
    let client = start_client(&fabric, "client", &server);
    client.observe_peer(PeerRecord {
        addr: "server".to_string(),
        paths: server.node.advertised_paths(),
    });

    let _outbound = client.connect(APP).await.unwrap();
    let mut inbound = server_session(&mut server).await;

    server.node.shutdown();
    assert_eq!(inbound.recv().await.unwrap(), SessionEvent::Closed);
    assert_eq!(server.node.session_count(), 0);
}

/// Polls `condition` until it holds, yielding between attempts.
async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
