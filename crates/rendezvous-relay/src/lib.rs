//! rendezvous-relay library crate.
//!
//! This crate pairs two WebSocket clients that want to open a direct
//! peer-to-peer session and relays their signaling frames (offers, answers,
//! ICE candidates) between them until either side disconnects.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Client A (JSON / binary over WebSocket)      Client B
//!         ↕                                        ↕
//! [rendezvous-relay]
//!   ├── domain/           Pure types: identifiers, frames, control messages, ServerConfig
//!   ├── application/
//!   │     ├── registry/   WaitingPool: clients waiting for a peer
//!   │     ├── pairing/    PairingTable: symmetric caller ↔ callee links
//!   │     ├── rendezvous/ RendezvousService: pairing, relay, lifecycle
//!   │     └── recorder/   SessionRecorder trait + detached recording
//!   └── infrastructure/
//!         ├── ws_server/   WebSocket accept loop (tokio-tungstenite)
//!         ├── recorder/    Log and JSON-lines recorder implementations
//!         └── config_file/ Optional TOML configuration file
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async code.
//! - `application` depends on `domain`; it only touches tokio for its lock,
//!   its outbound queues and the detached recorder task.
//! - `infrastructure` depends on all other layers plus `tokio-tungstenite`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: registry, pairing and relay logic.
pub mod application;

/// Infrastructure layer: WebSocket server, recorders and config loading.
pub mod infrastructure;
