//! Infrastructure layer for rendezvous-relay.
//!
//! The infrastructure layer handles all I/O.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener and performing the WebSocket upgrade
//! - Spawning the reader and writer tasks of each connection
//! - Idle timeouts and the graceful shutdown signal
//! - Recorder backends (log, JSON-lines file)
//! - Loading the optional TOML configuration file
//!
//! # What does NOT belong here?
//!
//! - Pairing and relay decisions (that is the application layer)
//! - Message type definitions (that is the domain layer)

pub mod config_file;
pub mod recorder;
pub mod ws_server;

pub use config_file::{ConfigError, FileConfig};
pub use recorder::{JsonLinesRecorder, LogRecorder};
pub use ws_server::{run_server, serve};
