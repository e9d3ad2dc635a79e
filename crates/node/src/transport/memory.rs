//! In-memory transport fabric.
//!
//! Connects any number of endpoints through paired [`tokio::io::duplex`]
//! streams. Used by the integration tests and by embeddings that pump
//! streams between co-located nodes.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{BoxedConn, DialFuture, Dialer, Inbound, PeerAddr};
use crate::error::{NodeError, Result};

/// Buffer size of each duplex half.
const STREAM_CAPACITY: usize = 64 * 1024;

/// A hub of in-memory endpoints addressable by name.
#[derive(Default)]
pub struct MemoryFabric {
    endpoints: DashMap<PeerAddr, mpsc::UnboundedSender<Inbound>>,
}

impl MemoryFabric {
    /// Creates an empty fabric.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers an endpoint under `addr`.
    ///
    /// Returns a dialer bound to that address (dials appear to remote
    /// endpoints as coming from `addr`) and the receiver of inbound
    /// streams dialed to it.
    pub fn register(
        self: &Arc<Self>,
        addr: impl Into<PeerAddr>,
    ) -> (MemoryDialer, mpsc::UnboundedReceiver<Inbound>) {
        let addr = addr.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.insert(addr.clone(), tx);
        let dialer = MemoryDialer {
            local: addr,
            fabric: Arc::clone(self),
        };
        (dialer, rx)
    }

    /// Removes an endpoint; subsequent dials to it fail.
    pub fn unregister(&self, addr: &PeerAddr) {
        self.endpoints.remove(addr);
    }

    fn connect(&self, from: PeerAddr, to: &PeerAddr, path: String) -> Result<BoxedConn> {
        let endpoint = self
            .endpoints
            .get(to)
            .ok_or_else(|| NodeError::NoRoute(format!("{}{}", to, path)))?;

        let (local, remote) = tokio::io::duplex(STREAM_CAPACITY);
        endpoint
            .send(Inbound {
                peer: from,
                path,
                conn: Box::new(remote),
            })
            .map_err(|_| NodeError::StreamClosed)?;
        Ok(Box::new(local))
    }
}

/// The dialing half of a registered endpoint.
#[derive(Clone)]
pub struct MemoryDialer {
    local: PeerAddr,
    fabric: Arc<MemoryFabric>,
}

impl Dialer for MemoryDialer {
    fn dial(&self, peer: &PeerAddr, path: &str) -> DialFuture {
        let fabric = Arc::clone(&self.fabric);
        let from = self.local.clone();
        let to = peer.clone();
        let path = path.to_string();
        Box::pin(async move { fabric.connect(from, &to, path) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_dial_delivers_inbound_with_peer_and_path() {
        let fabric = MemoryFabric::new();
        let (alice, _alice_rx) = fabric.register("alice");
        let (_bob, mut bob_rx) = fabric.register("bob");

        let mut conn = alice.dial(&"bob".to_string(), "/peerwire/chat").await.unwrap();
        let inbound = bob_rx.recv().await.unwrap();
        assert_eq!(inbound.peer, "alice");
        assert_eq!(inbound.path, "/peerwire/chat");

        conn.write_all(b"ping").await.unwrap();
        let mut remote = inbound.conn;
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_dial_unknown_endpoint_fails() {
        let fabric = MemoryFabric::new();
        let (alice, _rx) = fabric.register("alice");
        assert!(alice.dial(&"nobody".to_string(), "/peerwire").await.is_err());
    }

    #[tokio::test]
    async fn test_unregister_breaks_dialing() {
        let fabric = MemoryFabric::new();
        let (alice, _alice_rx) = fabric.register("alice");
        let (_bob, _bob_rx) = fabric.register("bob");
        fabric.unregister(&"bob".to_string());
        assert!(alice.dial(&"bob".to_string(), "/peerwire").await.is_err());
    }
}
