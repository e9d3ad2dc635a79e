//! Inbound stream routing and the protocol version table.
//!
//! At startup the router registers one route per server-role application
//! and supported protocol version, plus the unversioned alias that
//! resolves to the highest supported version. An inbound stream is
//! matched on its exact dial path, handshaken, and then attached to a
//! new or resumed session.

use std::sync::Arc;

use dashmap::DashMap;
use peerwire_protocol::path;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{NodeError, Result};
use crate::handshake;
use crate::node::NodeEvent;
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::stream;
use crate::transport::{BoxedConn, PeerAddr};

struct Route {
    app_id: String,
}

/// Dispatches inbound streams to application sessions.
pub struct Router {
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    events: mpsc::UnboundedSender<NodeEvent>,
    routes: DashMap<String, Route>,
}

impl Router {
    /// Builds the version table from the configuration.
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SessionRegistry>,
        events: mpsc::UnboundedSender<NodeEvent>,
    ) -> Self {
        let routes = DashMap::new();
        for app in config.apps.iter().filter(|app| app.is_server()) {
            for route in path::app_routes(&app.app_id) {
                routes.insert(
                    route,
                    Route {
                        app_id: app.app_id.clone(),
                    },
                );
            }
        }
        Self {
            config,
            registry,
            events,
            routes,
        }
    }

    /// Every path the transport should accept streams on.
    pub fn listen_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.routes.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// The paths to announce on the discovery feed: the base protocol
    /// paths plus the routes of every non-hidden server application.
    pub fn advertised_paths(&self) -> Vec<String> {
        let mut paths = path::base_routes();
        for app in &self.config.apps {
            if app.is_server() && !app.hidden {
                paths.extend(path::app_routes(&app.app_id));
            }
        }
        paths.sort();
        paths
    }

    /// Accepts one inbound stream: handshake, then session attach.
    ///
    /// Returns the session key on success. A stream that fails at any
    /// point is simply dropped; the peer learns nothing beyond the
    /// disconnect.
    pub async fn handle_inbound(
        &self,
        peer: &PeerAddr,
        dial_path: &str,
        mut conn: BoxedConn,
    ) -> Result<()> {
        let app_id = match self.routes.get(dial_path) {
            Some(route) => route.app_id.clone(),
            None => return Err(NodeError::NoRoute(dial_path.to_string())),
        };
        let app = self
            .config
            .app(&app_id)
            .ok_or_else(|| NodeError::UnknownApp(app_id.clone()))?;
        let identity = app.server_identity()?;

        let (session_key, codec) = handshake::serve(&mut conn, &identity).await?;

        match self.registry.get(&app_id, &session_key) {
            Some(session) if !session.is_closed() => {
                stream::attach(
                    Arc::clone(&session),
                    Arc::clone(&self.registry),
                    conn,
                    codec,
                )?;
                info!(session = %session_key, %app_id, %peer, "session resumed");
            }
            _ => {
                let (session, handle) = Session::new(app_id.clone(), session_key.clone());
                self.registry.insert(Arc::clone(&session));
                stream::attach(session, Arc::clone(&self.registry), conn, codec)?;
                info!(session = %session_key, %app_id, %peer, "session established");
                if self
                    .events
                    .send(NodeEvent::SessionEstablished {
                        app_id,
                        session: handle,
                    })
                    .is_err()
                {
                    warn!("node event receiver dropped");
                }
            }
        }
        Ok(())
    }
}
