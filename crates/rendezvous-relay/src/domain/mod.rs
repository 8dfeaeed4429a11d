//! Domain layer for rendezvous-relay.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or async runtimes, so they can be tested in isolation.
//!
//! # What belongs in the domain layer?
//!
//! - Identifier types (client-supplied ids, server-assigned connection ids)
//! - The signaling vocabulary: control messages, responses, close requests
//! - Frame classification (control vs. opaque relay traffic)
//! - Configuration structures
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod identity;
pub mod messages;

pub use config::ServerConfig;
pub use identity::{ClientId, ConnectionId, Role};
pub use messages::{CloseRequest, ControlMessage, Frame, InboundFrame, ServerResponse};
