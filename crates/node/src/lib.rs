//! # Peerwire Node Library
//!
//! This crate provides the stateful, async half of peerwire: sessions
//! with reliable delivery, the session registry with resumption, inbound
//! routing, discovery, and outbound connection establishment, all on top
//! of the pure `peerwire-protocol` crate.
//!
//! ## Overview
//!
//! A node is driven by a transport embedding, which supplies:
//!
//! - **A dialer**: opens outbound byte streams to a peer at a path
//! - **Inbound streams**: delivered to [`Node::handle_inbound`]
//! - **Discovery records**: fed to [`Node::observe_peer`]
//!
//! In return the node gives the embedding:
//!
//! - **Sessions**: authenticated, encrypted, with QoS0 and QoS1 delivery
//! - **Resumption**: a session survives its stream for a grace window
//! - **Routing**: inbound paths dispatched per application and version
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Node                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐  │
//! │  │   Session    │  │  Capability  │  │     Version      │  │
//! │  │   Registry   │  │    Cache     │  │  Table (Router)  │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘  │
//! │                                                             │
//! │  ┌────────────────────────┐  ┌──────────────────────────┐  │
//! │  │   Handshake Drivers    │  │    Outbound Connector    │  │
//! │  └────────────────────────┘  └──────────────────────────┘  │
//! │                                                             │
//! │  ┌────────────────────────────────────────────────────── ┐ │
//! │  │        Transport Boundary (dialer + inbound)          │ │
//! │  └────────────────────────────────────────────────────── ┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use peerwire_node::{Config, Node};
//! use peerwire_node::transport::MemoryFabric;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("peerwire.toml")?;
//!
//!     let fabric = MemoryFabric::new();
//!     let (dialer, inbound) = fabric.register("local");
//!
//!     let (node, mut events) = Node::new(config, Arc::new(dialer))?;
//!     node.spawn_inbound_loop(inbound);
//!
//!     while let Some(event) = events.recv().await {
//!         // Hand new sessions to the application...
//!         let _ = event;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`node`]: The orchestrator
//! - [`session`]: Sessions, QoS1 delivery, retransmission
//! - [`registry`]: Session registry and resumption
//! - [`router`]: Version table and inbound dispatch
//! - [`discovery`]: Capability cache
//! - [`connector`]: Outbound connection establishment
//! - [`handshake`]: Handshake drivers
//! - [`transport`]: Transport boundary and in-memory fabric
//! - [`config`]: Configuration
//! - [`error`]: Error types

pub mod config;
pub mod connector;
pub mod discovery;
pub mod error;
pub mod framed;
pub mod handshake;
pub mod node;
pub mod registry;
pub mod router;
pub mod session;
mod stream;
pub mod transport;

pub use config::{AppConfig, Config, ConfigError, Role};
pub use connector::{ClientSession, Connector};
pub use discovery::{CapabilityCache, PeerCapability};
pub use error::{NodeError, Result};
pub use node::{Node, NodeEvent};
pub use registry::SessionRegistry;
pub use session::{Session, SessionEvent, SessionHandle, RETRANSMIT_INTERVAL};
pub use transport::{BoxedConn, Dialer, Inbound, PeerAddr, PeerRecord};
