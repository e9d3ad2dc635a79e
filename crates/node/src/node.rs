//! The node orchestrator.
//!
//! A [`Node`] is the process-level object tying everything together: it
//! owns the configuration, the session registry, the capability cache,
//! and the version table, and exposes the inbound/outbound entry points
//! the transport embedding drives. There is no global state; multiple
//! nodes can coexist in one process, which is what the integration tests
//! do.

use std::sync::Arc;

use peerwire_protocol::{IdentityKeyPair, SessionKey};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::connector::{ClientSession, Connector};
use crate::discovery::CapabilityCache;
use crate::error::{NodeError, Result};
use crate::registry::SessionRegistry;
use crate::router::Router;
use crate::session::SessionHandle;
use crate::transport::{BoxedConn, Dialer, Inbound, PeerAddr, PeerRecord};

/// Events surfaced by a node.
#[derive(Debug)]
pub enum NodeEvent {
    /// A new inbound session finished its handshake. Emitted once per
    /// session; resumption rebinds the existing handle instead.
    SessionEstablished {
        /// The application the session belongs to.
        app_id: String,
        /// The handle the application reads and writes through.
        session: SessionHandle,
    },
}

/// A peerwire node.
pub struct Node {
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    cache: Arc<CapabilityCache>,
    router: Arc<Router>,
    connector: Connector,
    shutdown: CancellationToken,
}

impl Node {
    /// Creates a node from a validated configuration and a dialer into
    /// the transport fabric.
    pub fn new(
        config: Config,
        dialer: Arc<dyn Dialer>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NodeEvent>)> {
        config
            .validate()
            .map_err(|e| NodeError::Config(e.to_string()))?;

        let config = Arc::new(config);
        let registry = SessionRegistry::new(config.resumption_wait());
        let cache = Arc::new(CapabilityCache::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let router = Arc::new(Router::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            events_tx,
        ));
        let connector = Connector::new(
            Arc::clone(&config),
            Arc::clone(&cache),
            Arc::clone(&registry),
            dialer,
        );

        info!(
            apps = config.apps.len(),
            resumption_wait_ms = config.resumption_wait_ms,
            "node ready"
        );
        Ok((
            Self {
                config,
                registry,
                cache,
                router,
                connector,
                shutdown: CancellationToken::new(),
            },
            events_rx,
        ))
    }

    /// The configuration this node runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Paths the transport must accept inbound streams on.
    pub fn listen_paths(&self) -> Vec<String> {
        self.router.listen_paths()
    }

    /// Paths to announce on the discovery feed (hidden apps withheld).
    pub fn advertised_paths(&self) -> Vec<String> {
        self.router.advertised_paths()
    }

    /// Feeds one discovery record into the capability cache.
    pub fn observe_peer(&self, record: PeerRecord) {
        self.cache.observe(record);
    }

    /// Drops a peer from the capability cache.
    pub fn forget_peer(&self, addr: &PeerAddr) {
        self.cache.forget(addr);
    }

    /// Accepts one inbound stream. Handshake and attachment run in the
    /// background; failures are logged and the stream dropped.
    pub fn handle_inbound(&self, peer: PeerAddr, path: String, conn: BoxedConn) {
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            if let Err(error) = router.handle_inbound(&peer, &path, conn).await {
                warn!(%peer, %path, %error, "inbound stream rejected");
            }
        });
    }

    /// Consumes a transport's inbound stream channel until shutdown.
    pub fn spawn_inbound_loop(&self, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
        let router = Arc::clone(&self.router);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = inbound.recv() => {
                        let Some(stream) = next else { break };
                        let router = Arc::clone(&router);
                        tokio::spawn(async move {
                            if let Err(error) = router
                                .handle_inbound(&stream.peer, &stream.path, stream.conn)
                                .await
                            {
                                warn!(peer = %stream.peer, path = %stream.path, %error,
                                    "inbound stream rejected");
                            }
                        });
                    }
                }
            }
        });
    }

    /// Establishes a fresh outbound session for a client-role app.
    ///
    /// Retries until a candidate succeeds or the node shuts down.
    pub async fn connect(&self, app_id: &str) -> Result<ClientSession> {
        self.connector.connect(app_id, &self.shutdown).await
    }

    /// Resumes a suspended outbound session with its original identity.
    pub async fn resume(&self, app_id: &str, identity: &IdentityKeyPair) -> Result<()> {
        self.connector.resume(app_id, identity, &self.shutdown).await
    }

    /// Destroys one session immediately, grace window notwithstanding.
    pub fn close_session(&self, app_id: &str, key: &SessionKey) -> bool {
        self.registry.close(app_id, key)
    }

    /// Number of registered sessions (bound or suspended).
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Stops outbound retry loops and destroys every session.
    pub fn shutdown(&self) {
        info!("node shutting down");
        self.shutdown.cancel();
        self.registry.close_all();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("apps", &self.config.apps.len())
            .field("sessions", &self.registry.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Role};
    use crate::transport::MemoryFabric;

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let fabric = MemoryFabric::new();
        let (dialer, _rx) = fabric.register("node");
        let config = Config {
            resumption_wait_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            Node::new(config, Arc::new(dialer)),
            Err(NodeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_paths_reflect_configuration() {
        let fabric = MemoryFabric::new();
        let (dialer, _rx) = fabric.register("node");
        let root = peerwire_protocol::IdentityKeyPair::generate();
        let config = Config {
            apps: vec![AppConfig {
                app_id: "chat".to_string(),
                hidden: false,
                role: Role::Server {
                    signing_public_key: root.verifying_key().to_hex(),
                    signing_secret_key: root.signing_key().to_hex(),
                },
            }],
            ..Default::default()
        };
        let (node, _events) = Node::new(config, Arc::new(dialer)).unwrap();

        assert!(node
            .listen_paths()
            .contains(&"/peerwire/chat/0.1.0".to_string()));
        assert!(node.advertised_paths().contains(&"/peerwire".to_string()));
        assert_eq!(node.session_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_connect() {
        let fabric = MemoryFabric::new();
        let (dialer, _rx) = fabric.register("node");
        let root = peerwire_protocol::IdentityKeyPair::generate();
        let config = Config {
            apps: vec![AppConfig {
                app_id: "chat".to_string(),
                hidden: false,
                role: Role::Client {
                    trusted_keys: vec![root.verifying_key().to_hex()],
                },
            }],
            ..Default::default()
        };
        let (node, _events) = Node::new(config, Arc::new(dialer)).unwrap();
        let node = Arc::new(node);

        let pending = {
            let node = Arc::clone(&node);
            tokio::spawn(async move { node.connect("chat").await })
        };
        // No candidates exist; the connect loop parks on its retry sleep.
        tokio::task::yield_now().await;
        node.shutdown();

        assert!(matches!(
            pending.await.unwrap(),
            Err(NodeError::Cancelled)
        ));
    }
}
