//! Session registry and resumption grace window.
//!
//! Sessions are keyed by `(app id, session key)`. When a carrying stream
//! drops, the session stays registered for the configured grace window;
//! a handshake presenting the same session key within that window rebinds
//! it with all buffered state intact. If the window elapses first, the
//! session is destroyed and its buffers are dropped.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use peerwire_protocol::SessionKey;
use tracing::debug;

use crate::session::Session;

type RegistryKey = (String, SessionKey);

/// Thread-safe registry of live and suspended sessions.
pub struct SessionRegistry {
    sessions: DashMap<RegistryKey, Arc<Session>>,
    resumption_wait: Duration,
}

impl SessionRegistry {
    /// Creates a registry with the given grace window.
    pub fn new(resumption_wait: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            resumption_wait,
        })
    }

    /// The configured grace window.
    pub fn resumption_wait(&self) -> Duration {
        self.resumption_wait
    }

    /// Looks up a session.
    pub fn get(&self, app_id: &str, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions
            .get(&(app_id.to_string(), key.clone()))
            .map(|entry| Arc::clone(&entry))
    }

    /// Registers a session.
    pub fn insert(&self, session: Arc<Session>) {
        let key = (
            session.app_id().to_string(),
            session.session_key().clone(),
        );
        self.sessions.insert(key, session);
    }

    /// Number of registered sessions (bound or suspended).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Detaches the session's stream and starts the grace timer.
    ///
    /// If the session is not rebound before the window elapses it is
    /// removed and destroyed. A rebind bumps the session generation, which
    /// invalidates this timer even if the session is suspended again later.
    pub fn suspend(self: &Arc<Self>, session: &Arc<Session>) {
        let generation = session.unbind();
        if session.is_closed() {
            return;
        }

        let registry = Arc::downgrade(self);
        let key: RegistryKey = (
            session.app_id().to_string(),
            session.session_key().clone(),
        );
        let wait = self.resumption_wait;

        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let removed = registry.sessions.remove_if(&key, |_, session| {
                !session.is_bound() && session.generation() == generation
            });
            if let Some((_, session)) = removed {
                debug!(
                    session = %session.session_key(),
                    app_id = %session.app_id(),
                    "resumption window elapsed"
                );
                session.destroy();
            }
        });
    }

    /// Removes and destroys a session immediately.
    pub fn close(&self, app_id: &str, key: &SessionKey) -> bool {
        match self.sessions.remove(&(app_id.to_string(), key.clone())) {
            Some((_, session)) => {
                session.destroy();
                true
            }
            None => false,
        }
    }

    /// Destroys every session. Used on node shutdown.
    pub fn close_all(&self) {
        self.sessions.retain(|_, session| {
            session.destroy();
            false
        });
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("resumption_wait", &self.resumption_wait)
            .finish()
    }
}
