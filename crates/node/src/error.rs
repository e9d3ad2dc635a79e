//! Error types for the node crate.

use peerwire_protocol::ProtocolError;
use thiserror::Error;

/// Errors produced by the node layer.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A protocol-level failure (framing, crypto, handshake encoding).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An I/O failure on the underlying byte stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A wire frame exceeded the size limit.
    #[error("wire frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// The peer closed the stream before the exchange completed.
    #[error("stream closed by peer")]
    StreamClosed,

    /// The application id is not present in the configuration.
    #[error("unknown application id: {0}")]
    UnknownApp(String),

    /// The application is not configured for the client role.
    #[error("application {0} is not configured as a client")]
    NotAClient(String),

    /// The application is not configured for the server role.
    #[error("application {0} is not configured as a server")]
    NotAServer(String),

    /// No inbound handler is registered for the requested path.
    #[error("no route for path {0}")]
    NoRoute(String),

    /// The session already has a live bound stream.
    #[error("session is already bound to a live stream")]
    AlreadyBound,

    /// The session was destroyed (grace window expired or explicit close).
    #[error("session closed")]
    SessionClosed,

    /// The outbound connect loop was cancelled.
    #[error("connect cancelled")]
    Cancelled,

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
