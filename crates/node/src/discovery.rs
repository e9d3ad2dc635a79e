//! Discovery feed processing and the capability cache.
//!
//! The transport surfaces discovery records: a peer address plus the
//! paths it advertises. Records are parsed, semver-matched against the
//! locally supported versions, and folded into a per-peer capability
//! entry. Peers with no mutually satisfying version are excluded
//! entirely; the outbound connector never tries them.

use std::collections::HashSet;

use dashmap::DashMap;
use peerwire_protocol::path::{self, ProtocolPath};
use semver::Version;
use tracing::{debug, trace};

use crate::transport::{PeerAddr, PeerRecord};

/// What one peer offers: the negotiated version and the applications it
/// serves.
#[derive(Debug, Clone)]
pub struct PeerCapability {
    /// Transport-level address.
    pub addr: PeerAddr,
    /// Highest protocol version both sides support.
    pub version: Version,
    /// Application ids the peer advertised.
    pub apps: HashSet<String>,
}

/// Cache of peer capabilities, fed by discovery records.
#[derive(Default)]
pub struct CapabilityCache {
    peers: DashMap<PeerAddr, PeerCapability>,
}

impl CapabilityCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a discovery record into the cache.
    ///
    /// Replaces any previous entry for the peer. A peer advertising no
    /// version in common is removed from the cache.
    pub fn observe(&self, record: PeerRecord) {
        let mut advertised_versions: Vec<Version> = Vec::new();
        let mut apps = HashSet::new();

        for raw in &record.paths {
            let Some(parsed) = ProtocolPath::parse(raw) else {
                trace!(peer = %record.addr, path = %raw, "ignoring foreign path");
                continue;
            };
            match parsed {
                ProtocolPath::Base => {}
                ProtocolPath::Versioned(version) => advertised_versions.push(version),
                ProtocolPath::App { app_id } => {
                    apps.insert(app_id);
                }
                ProtocolPath::AppVersioned { app_id, version } => {
                    apps.insert(app_id);
                    advertised_versions.push(version);
                }
            }
        }

        match path::negotiate(&advertised_versions) {
            Some(version) => {
                debug!(peer = %record.addr, %version, apps = apps.len(), "peer capability updated");
                self.peers.insert(
                    record.addr.clone(),
                    PeerCapability {
                        addr: record.addr,
                        version,
                        apps,
                    },
                );
            }
            None => {
                debug!(peer = %record.addr, "no mutually supported version");
                self.peers.remove(&record.addr);
            }
        }
    }

    /// Drops a peer from the cache.
    pub fn forget(&self, addr: &PeerAddr) {
        self.peers.remove(addr);
    }

    /// Peers currently known to serve `app_id`.
    pub fn candidates(&self, app_id: &str) -> Vec<PeerCapability> {
        self.peers
            .iter()
            .filter(|entry| entry.apps.contains(app_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of cached peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
