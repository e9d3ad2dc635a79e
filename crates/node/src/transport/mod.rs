//! Transport boundary.
//!
//! The node does not own a network fabric. An embedding supplies two
//! things: a [`Dialer`] for opening outbound byte streams to a peer at a
//! protocol path, and delivery of inbound streams plus discovery records
//! into the node (see [`crate::Node::handle_inbound`] and
//! [`crate::Node::observe_peer`]). The node assumes nothing about the
//! fabric beyond ordered byte streams per dial.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

pub mod memory;

pub use memory::MemoryFabric;

/// Transport-level address of a peer on the fabric.
pub type PeerAddr = String;

/// An ordered, bidirectional byte stream.
pub trait Conn: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Conn for T {}

/// A boxed byte stream, as handed across the transport boundary.
pub type BoxedConn = Box<dyn Conn>;

/// Future returned by [`Dialer::dial`].
pub type DialFuture = Pin<Box<dyn Future<Output = Result<BoxedConn>> + Send>>;

/// Opens outbound byte streams.
///
/// A dial addresses a peer by its transport-level address and a protocol
/// path; the remote side sees the stream arrive tagged with that path.
pub trait Dialer: Send + Sync {
    /// Opens a stream to `peer` at `path`.
    fn dial(&self, peer: &PeerAddr, path: &str) -> DialFuture;
}

/// A discovery record: one peer and the paths it advertises.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// Transport-level address of the peer.
    pub addr: PeerAddr,
    /// Paths the peer announced on the discovery feed.
    pub paths: Vec<String>,
}

/// An inbound stream delivered by the fabric.
pub struct Inbound {
    /// Transport-level address of the dialing peer.
    pub peer: PeerAddr,
    /// The path the peer dialed.
    pub path: String,
    /// The byte stream.
    pub conn: BoxedConn,
}

impl std::fmt::Debug for Inbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbound")
            .field("peer", &self.peer)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
