//! Outbound connection establishment.
//!
//! The connector turns "connect me to application X" into a live session:
//! it walks the capability cache's candidates for the application, dials
//! and handshakes each in turn, and on a full-sweep failure sleeps a fixed
//! interval before sweeping again. It retries indefinitely; the caller's
//! [`CancellationToken`] is the only way out.

use std::sync::Arc;

use peerwire_protocol::{FrameCodec, IdentityKeyPair, VerifyingKey, PROTOCOL_NAME};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::discovery::CapabilityCache;
use crate::error::{NodeError, Result};
use crate::handshake;
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionHandle};
use crate::stream;
use crate::transport::{BoxedConn, Dialer};

/// An established outbound session.
///
/// The identity is handed back to the caller because it is the ticket for
/// resumption: reconnecting with the same keypair reattaches this session.
pub struct ClientSession {
    /// The session keypair used in the handshake.
    pub identity: IdentityKeyPair,
    /// The application-facing session handle.
    pub handle: SessionHandle,
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.handle.fmt(f)
    }
}

/// Dials out and establishes sessions for client-role applications.
pub struct Connector {
    config: Arc<Config>,
    cache: Arc<CapabilityCache>,
    registry: Arc<SessionRegistry>,
    dialer: Arc<dyn Dialer>,
}

impl Connector {
    pub fn new(
        config: Arc<Config>,
        cache: Arc<CapabilityCache>,
        registry: Arc<SessionRegistry>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self {
            config,
            cache,
            registry,
            dialer,
        }
    }

    /// Establishes a fresh session for `app_id` under a new identity.
    ///
    /// Unknown or non-client application ids fail immediately; everything
    /// past that point retries until cancelled.
    pub async fn connect(
        &self,
        app_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ClientSession> {
        let trusted = self.trusted_roots(app_id)?;
        let identity = IdentityKeyPair::generate();

        let (conn, codec) = self
            .dial_until(app_id, &identity, &trusted, cancel)
            .await?;

        let (session, handle) = Session::new(app_id, identity.session_key());
        self.registry.insert(Arc::clone(&session));
        stream::attach(session, Arc::clone(&self.registry), conn, codec)?;

        info!(session = %identity.session_key(), %app_id, "outbound session established");
        Ok(ClientSession { identity, handle })
    }

    /// Reconnects a suspended session using its original identity.
    ///
    /// Fails with [`NodeError::SessionClosed`] if the grace window already
    /// expired locally; callers fall back to [`Connector::connect`].
    pub async fn resume(
        &self,
        app_id: &str,
        identity: &IdentityKeyPair,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let session = self
            .registry
            .get(app_id, &identity.session_key())
            .filter(|session| !session.is_closed())
            .ok_or(NodeError::SessionClosed)?;
        if session.is_bound() {
            return Err(NodeError::AlreadyBound);
        }

        let trusted = self.trusted_roots(app_id)?;
        let (conn, codec) = self
            .dial_until(app_id, identity, &trusted, cancel)
            .await?;
        stream::attach(session, Arc::clone(&self.registry), conn, codec)?;

        info!(session = %identity.session_key(), %app_id, "outbound session resumed");
        Ok(())
    }

    fn trusted_roots(&self, app_id: &str) -> Result<Vec<VerifyingKey>> {
        let app = self
            .config
            .app(app_id)
            .ok_or_else(|| NodeError::UnknownApp(app_id.to_string()))?;
        app.trusted_roots()
    }

    async fn dial_until(
        &self,
        app_id: &str,
        identity: &IdentityKeyPair,
        trusted: &[VerifyingKey],
        cancel: &CancellationToken,
    ) -> Result<(BoxedConn, FrameCodec)> {
        loop {
            for candidate in self.cache.candidates(app_id) {
                let dial_path =
                    format!("/{}/{}/{}", PROTOCOL_NAME, app_id, candidate.version);
                match self
                    .try_candidate(&candidate.addr, &dial_path, identity, trusted)
                    .await
                {
                    Ok(established) => return Ok(established),
                    Err(error) => {
                        debug!(peer = %candidate.addr, %app_id, %error, "candidate failed");
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(NodeError::Cancelled),
                _ = tokio::time::sleep(self.config.retry_interval()) => {}
            }
        }
    }

    async fn try_candidate(
        &self,
        addr: &str,
        dial_path: &str,
        identity: &IdentityKeyPair,
        trusted: &[VerifyingKey],
    ) -> Result<(BoxedConn, FrameCodec)> {
        let mut conn = self.dialer.dial(&addr.to_string(), dial_path).await?;
        let codec = handshake::connect(&mut conn, identity, trusted).await?;
        Ok((conn, codec))
    }
}
