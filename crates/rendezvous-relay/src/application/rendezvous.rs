//! RendezvousService: pairing engine, relay router and lifecycle manager.
//!
//! The service owns every piece of shared state (the open connections, the
//! [`WaitingPool`] and the [`PairingTable`]) behind one `tokio::sync::Mutex`.
//! Every open, frame and close event takes that lock once, so concurrent
//! events on different sockets are applied one at a time and the invariants
//! below hold between any two events:
//!
//! 1. A connection is in at most one of {waiting pool, pairing table}.
//! 2. Pairings are symmetric.
//! 3. No connection is paired with itself.
//!
//! Nothing under the lock waits on I/O.  Replies and relayed frames are pushed
//! onto the target connection's unbounded outbound queue, which a per-socket
//! writer task drains; recorder calls run on detached tasks.
//!
//! # Connection state machine
//!
//! ```text
//!                 REQUEST_TO_CONNECT            REQUEST_TO_CONNECT
//!                 (no other waiter)             (from another client)
//! Unregistered ───────────────────► Waiting ───────────────────────► Paired (callee)
//!      │                                                                 ▲
//!      └─────────────────────────────────────────────────────────────────┘
//!         REQUEST_TO_CONNECT with a waiter available   → Paired (caller)
//! ```
//!
//! Close removes the connection from wherever it is.  The surviving peer of a
//! pairing drops back to `Unregistered` and must send a new request.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::application::pairing::{PairLink, PairingTable};
use crate::application::recorder::{spawn_record, PairingRecord, SessionRecorder};
use crate::application::registry::WaitingPool;
use crate::domain::messages::REASON_NOT_GIVEN;
use crate::domain::{
    ClientId, CloseRequest, ConnectionId, ControlMessage, Frame, InboundFrame, Role,
    ServerResponse,
};

/// Sending half of a connection's outbound queue.
pub type Outbound = mpsc::UnboundedSender<Frame>;

/// What the service knows about one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: Outbound,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbound: Outbound) -> Self {
        Self { id, outbound }
    }

    /// Creates a handle with a fresh id and returns the receiving end of its
    /// outbound queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(ConnectionId::new(), tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Where a connection currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unregistered,
    Waiting(ClientId),
    Paired { peer: ConnectionId, role: Role },
}

/// Why a `REQUEST_TO_CONNECT` was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The picked waiter presented the same client id as the requester.
    SelfPairing,
    /// The requester is already in a pairing.
    AlreadyPaired,
    /// The connection was never opened or is already closed.
    UnknownConnection,
}

/// Result of a `REQUEST_TO_CONNECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// No peer available; the requester is waiting.
    Waiting,
    /// The requester (caller) was paired with a waiting callee.
    Paired {
        callee: ConnectionId,
        callee_id: ClientId,
    },
    Rejected(RejectReason),
}

impl PairingOutcome {
    /// The response sent back to the requester.
    pub fn response(&self) -> ServerResponse {
        match self {
            PairingOutcome::Waiting => ServerResponse::Waiting,
            PairingOutcome::Paired { .. } => ServerResponse::SendOffer,
            PairingOutcome::Rejected(_) => ServerResponse::Rejected,
        }
    }
}

/// Result of relaying one opaque frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Queued for the peer.
    Forwarded { peer: ConnectionId },
    /// The sender is not paired; the frame was dropped.
    NoAssociation,
    /// The peer's writer has already gone away; the frame was dropped.
    PeerGone { peer: ConnectionId },
}

/// Result of handling any inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Pairing(PairingOutcome),
    /// A `DONE` or `WS_CLOSE` control message: logged, not relayed.
    Acknowledged,
    Relay(RelayOutcome),
}

/// What [`RendezvousService::close`] cleaned up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseSummary {
    /// The reason from the close payload, or "Reason not given".
    pub reason: String,
    /// The ids the connection was removed from the waiting pool under.
    pub left_waiting_pool: Vec<ClientId>,
    /// The peer whose association was torn down, if the connection was paired.
    pub released_peer: Option<ConnectionId>,
}

/// Read-only view of the service state, for diagnostics and tests.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    pub connections: usize,
    pub waiting: Vec<(ClientId, ConnectionId)>,
    pub links: Vec<(ConnectionId, PairLink)>,
}

#[derive(Default)]
struct RendezvousState {
    connections: HashMap<ConnectionId, Outbound>,
    waiting: WaitingPool,
    pairings: PairingTable,
}

impl RendezvousState {
    fn reply(&self, conn: ConnectionId, response: ServerResponse) {
        let Some(tx) = self.connections.get(&conn) else {
            debug!(conn = %conn, "reply dropped: connection not open");
            return;
        };
        match response.to_frame() {
            Ok(frame) => {
                if tx.send(frame).is_err() {
                    debug!(conn = %conn, "reply dropped: writer already closed");
                }
            }
            Err(e) => warn!(conn = %conn, "failed to encode {response:?}: {e}"),
        }
    }
}

/// The rendezvous core.  Build one at startup and share it with `Arc`.
pub struct RendezvousService {
    state: Mutex<RendezvousState>,
    recorder: Arc<dyn SessionRecorder>,
}

impl RendezvousService {
    pub fn new(recorder: Arc<dyn SessionRecorder>) -> Self {
        Self {
            state: Mutex::new(RendezvousState::default()),
            recorder,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Records a newly accepted connection in the unregistered state.
    pub async fn open(&self, handle: ConnectionHandle) {
        let mut state = self.state.lock().await;
        state.connections.insert(handle.id, handle.outbound);
        info!(conn = %handle.id, open = state.connections.len(), "connection opened");
    }

    /// Removes every trace of `conn`.
    ///
    /// `close_payload` is the reason text of the client's close frame, if it
    /// sent one.  When it parses as a [`CloseRequest`] whose id maps to this
    /// connection, that key is removed directly; otherwise the waiting pool is
    /// scanned.  Never fails.
    pub async fn close(&self, conn: ConnectionId, close_payload: Option<&str>) -> CloseSummary {
        let request = close_payload.and_then(CloseRequest::parse);
        let reason = request
            .as_ref()
            .map(|r| r.reason().to_string())
            .unwrap_or_else(|| REASON_NOT_GIVEN.to_string());

        let mut state = self.state.lock().await;
        let mut left_waiting_pool = Vec::new();

        // Only honour the id if it really belongs to this connection: ids are
        // not unique and another socket may be waiting under the same one.
        if let Some(id) = request.as_ref().and_then(CloseRequest::client_id) {
            if state.waiting.get(&id) == Some(conn) {
                state.waiting.unregister_by_id(&id);
                left_waiting_pool.push(id);
            }
        }
        if state.waiting.contains_conn(conn) {
            left_waiting_pool.extend(state.waiting.unregister_by_conn(conn));
        }

        let released_peer = state.pairings.unlink(conn).map(|link| link.peer);
        state.connections.remove(&conn);

        info!(
            conn = %conn,
            reason = %reason,
            was_waiting = !left_waiting_pool.is_empty(),
            released_peer = ?released_peer.map(|p| p.to_string()),
            "connection closed"
        );

        CloseSummary {
            reason,
            left_waiting_pool,
            released_peer,
        }
    }

    // ── Inbound frames ────────────────────────────────────────────────────────

    /// Classifies and handles one inbound frame.
    pub async fn handle_frame(&self, conn: ConnectionId, frame: Frame) -> FrameOutcome {
        match InboundFrame::classify(frame) {
            InboundFrame::Control(ControlMessage::RequestToConnect { id }) => {
                FrameOutcome::Pairing(self.request_to_connect(conn, id).await)
            }
            InboundFrame::Control(msg) => {
                info!(conn = %conn, id = %msg.client_id(), verb = msg.verb(), "control message acknowledged");
                FrameOutcome::Acknowledged
            }
            InboundFrame::Opaque(frame) => FrameOutcome::Relay(self.relay(conn, frame).await),
        }
    }

    /// Pairing engine: queue `conn` under `id`, or match it with a waiter.
    ///
    /// The response frame is queued for `conn` before this returns.
    pub async fn request_to_connect(&self, conn: ConnectionId, id: ClientId) -> PairingOutcome {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let outcome = if !state.connections.contains_key(&conn) {
            PairingOutcome::Rejected(RejectReason::UnknownConnection)
        } else if state.pairings.is_paired(conn) {
            PairingOutcome::Rejected(RejectReason::AlreadyPaired)
        } else if let Some((peer_id, peer)) = state.waiting.pick_random_waiting_except(conn) {
            if peer_id == id {
                PairingOutcome::Rejected(RejectReason::SelfPairing)
            } else {
                match state.pairings.link(conn, peer) {
                    Ok(()) => {
                        state.waiting.unregister_by_id(&peer_id);
                        // Non-load-bearing: the requester can only be in the pool
                        // under its own id if it asked before while alone.
                        if state.waiting.get(&id) == Some(conn) {
                            state.waiting.unregister_by_id(&id);
                        }
                        state.waiting.unregister_by_conn(conn);

                        spawn_record(
                            Arc::clone(&self.recorder),
                            PairingRecord::now(id.clone(), peer_id.clone()),
                        );

                        PairingOutcome::Paired {
                            callee: peer,
                            callee_id: peer_id,
                        }
                    }
                    Err(e) => {
                        // Unreachable while invariant 1 holds; refuse rather than corrupt.
                        warn!(conn = %conn, "pairing refused: {e}");
                        PairingOutcome::Rejected(RejectReason::AlreadyPaired)
                    }
                }
            }
        } else {
            // Re-key if this connection was waiting under a different id.
            if state.waiting.get(&id) != Some(conn) {
                state.waiting.unregister_by_conn(conn);
                state.waiting.register(id.clone(), conn);
            }
            PairingOutcome::Waiting
        };

        match &outcome {
            PairingOutcome::Waiting => {
                info!(conn = %conn, id = %id, waiting = state.waiting.len(), "client waiting for a peer");
            }
            PairingOutcome::Paired { callee, callee_id } => {
                info!(caller = %conn, caller_id = %id, callee = %callee, callee_id = %callee_id, "clients paired");
            }
            PairingOutcome::Rejected(reason) => {
                info!(conn = %conn, id = %id, reason = ?reason, "connect request rejected");
            }
        }

        state.reply(conn, outcome.response());
        outcome
    }

    // ── Relay ─────────────────────────────────────────────────────────────────

    /// Relay router: forwards `frame` unchanged to the peer of `conn`.
    ///
    /// Never blocks on the peer: the frame is appended to the peer's outbound
    /// queue and written when its socket is ready.
    pub async fn relay(&self, conn: ConnectionId, frame: Frame) -> RelayOutcome {
        let state = self.state.lock().await;

        let Some(link) = state.pairings.peer_of(conn) else {
            warn!(conn = %conn, kind = frame.kind(), bytes = frame.len(), "no peer to relay to; frame dropped");
            return RelayOutcome::NoAssociation;
        };

        let delivered = state
            .connections
            .get(&link.peer)
            .is_some_and(|tx| tx.send(frame).is_ok());

        if delivered {
            debug!(from = %conn, to = %link.peer, role = %link.role, "frame relayed");
            RelayOutcome::Forwarded { peer: link.peer }
        } else {
            warn!(from = %conn, to = %link.peer, "peer outbound closed; frame dropped");
            RelayOutcome::PeerGone { peer: link.peer }
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Current state of `conn`, or `None` if it is not open.
    pub async fn connection_state(&self, conn: ConnectionId) -> Option<ConnectionState> {
        let state = self.state.lock().await;
        if !state.connections.contains_key(&conn) {
            return None;
        }
        if let Some(link) = state.pairings.peer_of(conn) {
            return Some(ConnectionState::Paired {
                peer: link.peer,
                role: link.role,
            });
        }
        Some(match state.waiting.id_of(conn) {
            Some(id) => ConnectionState::Waiting(id),
            None => ConnectionState::Unregistered,
        })
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        let state = self.state.lock().await;
        StateSnapshot {
            connections: state.connections.len(),
            waiting: state.waiting.entries(),
            links: state.pairings.links(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
