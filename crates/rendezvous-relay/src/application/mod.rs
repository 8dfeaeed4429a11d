//! Application layer for rendezvous-relay.
//!
//! The application layer knows *what* to do with each connection event; the
//! infrastructure layer decides *how* bytes reach the sockets.
//!
//! # Responsibilities
//!
//! - Keeping the waiting pool and the pairing table consistent
//! - Deciding whether a request waits, pairs, or is rejected
//! - Routing opaque frames to the paired peer
//! - Unwinding state when a connection closes
//! - Handing pairing records to the recorder without waiting for it
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or performing the WebSocket handshake
//! - Writing files or choosing a recorder backend

pub mod pairing;
pub mod recorder;
pub mod registry;
pub mod rendezvous;

pub use pairing::{PairLink, PairingError, PairingTable};
pub use recorder::{spawn_record, PairingRecord, RecorderError, SessionRecorder};
pub use registry::WaitingPool;
pub use rendezvous::{
    CloseSummary, ConnectionHandle, ConnectionState, FrameOutcome, PairingOutcome, RejectReason,
    RelayOutcome, RendezvousService, StateSnapshot,
};
