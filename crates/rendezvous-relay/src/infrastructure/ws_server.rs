//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections.
//! 3. Upgrading each connection to a WebSocket session on the configured path
//!    (any other path is refused with HTTP 404).
//! 4. Running two tasks per connection:
//!    - **Reader**: reads frames from the socket and hands them to the
//!      [`RendezvousService`] (pairing, relay).
//!    - **Writer**: drains the connection's outbound queue into the socket.
//! 5. Telling the service when a connection goes away, whatever the reason
//!    (close frame, socket error, idle timeout, handler panic).
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Backpressure
//!
//! The reader of one socket never writes to another socket directly.  Relayed
//! frames are pushed onto the peer's unbounded outbound queue and the peer's
//! writer sends them when its socket accepts more data, so a peer with a full
//! TCP buffer only slows down its own writer.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        Error as WsError, Message as WsMessage,
    },
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::application::{ConnectionHandle, RendezvousService};
use crate::domain::{ConnectionId, Frame, ServerConfig};

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves connections until `running` is
/// cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.  This is the only
/// failure that stops the server; per-connection errors are logged.
pub async fn run_server(
    config: ServerConfig,
    service: Arc<RendezvousService>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    serve(listener, config, service, running).await
}

/// Runs the accept loop on an already bound listener.
///
/// Split from [`run_server`] so tests can bind port 0 and learn the address.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    service: Arc<RendezvousService>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!("rendezvous relay listening on ws://{local_addr}{}", config.path);

    let config = Arc::new(config);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the loop notices the shutdown flag even when idle.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new TCP connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                let svc = Arc::clone(&service);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, cfg, svc).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g. too many open file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Event boundary for one connection.
///
/// Runs the session on its own task so that an error or even a panic inside
/// it stays local, then always unwinds the connection's rendezvous state.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    service: Arc<RendezvousService>,
) {
    let conn = ConnectionId::new();
    let session = tokio::spawn(run_connection(
        stream,
        peer_addr,
        conn,
        config,
        Arc::clone(&service),
    ));

    let close_payload = match session.await {
        Ok(Ok(payload)) => payload,
        Ok(Err(e)) => {
            warn!(conn = %conn, "session {peer_addr} ended with error: {e:#}");
            None
        }
        Err(e) => {
            error!(conn = %conn, "session {peer_addr} handler failed: {e}");
            None
        }
    };

    service.close(conn, close_payload.as_deref()).await;
}

/// Runs one WebSocket session.
///
/// Returns the reason text of the client's close frame, if one arrived.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails or times out.
async fn run_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    conn: ConnectionId,
    config: Arc<ServerConfig>,
    service: Arc<RendezvousService>,
) -> anyhow::Result<Option<String>> {
    let expected_path = config.path.clone();
    let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == expected_path {
            Ok(resp)
        } else {
            let mut refusal =
                ErrorResponse::new(Some(format!("no WebSocket endpoint at {}", req.uri().path())));
            *refusal.status_mut() = StatusCode::NOT_FOUND;
            Err(refusal)
        }
    };

    let handshake = accept_hdr_async(raw_stream, check_path);
    let ws_stream = match config.idle_timeout {
        Some(limit) => timeout(limit, handshake)
            .await
            .with_context(|| format!("WebSocket handshake with {peer_addr} timed out"))?,
        None => handshake.await,
    }
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (ws_tx, mut ws_rx) = ws_stream.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    service
        .open(ConnectionHandle::new(conn, outbound_tx))
        .await;
    info!(conn = %conn, "WebSocket session established with {peer_addr}");

    // Detached: the writer ends once the service drops the connection's
    // sender on close, after flushing whatever is still queued.
    tokio::spawn(write_outbound(ws_tx, outbound_rx, conn));

    Ok(read_inbound(&mut ws_rx, conn, config.idle_timeout, &service).await)
}

/// Drains the outbound queue into the socket.
///
/// Frames are fed without flushing while more are queued and flushed once the
/// queue runs dry, so a burst of relayed ICE candidates costs one flush.
async fn write_outbound(
    mut sink: WsSink,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    conn: ConnectionId,
) {
    let mut backlog = 0usize;

    while let Some(frame) = outbound.recv().await {
        let msg = match frame {
            Frame::Text(text) => WsMessage::Text(text),
            Frame::Binary(bytes) => WsMessage::Binary(bytes),
        };
        if let Err(e) = sink.feed(msg).await {
            debug!(conn = %conn, "WebSocket send failed: {e}");
            return;
        }
        backlog += 1;

        if outbound.is_empty() {
            if let Err(e) = sink.flush().await {
                debug!(conn = %conn, "WebSocket flush failed: {e}");
                return;
            }
            if backlog > 1 {
                debug!(conn = %conn, frames = backlog, "outbound backlog drained");
            }
            backlog = 0;
        }
    }

    // Queue closed: the connection has been unregistered.
    let _ = sink.close().await;
}

/// Reads frames until the client closes, errors, or goes idle.
async fn read_inbound(
    ws_rx: &mut WsSource,
    conn: ConnectionId,
    idle_timeout: Option<Duration>,
    service: &RendezvousService,
) -> Option<String> {
    loop {
        let next = match idle_timeout {
            Some(limit) => match timeout(limit, ws_rx.next()).await {
                Ok(next) => next,
                Err(_) => {
                    info!(conn = %conn, "idle for {}s; closing", limit.as_secs());
                    return None;
                }
            },
            None => ws_rx.next().await,
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!(conn = %conn, "WebSocket closed without close frame");
                return None;
            }
            Some(Err(e)) => {
                warn!(conn = %conn, "WebSocket error: {e}");
                return None;
            }
            None => {
                debug!(conn = %conn, "WebSocket stream ended");
                return None;
            }
        };

        match msg {
            WsMessage::Text(text) => {
                service.handle_frame(conn, Frame::Text(text)).await;
            }
            WsMessage::Binary(bytes) => {
                service.handle_frame(conn, Frame::Binary(bytes)).await;
            }
            WsMessage::Ping(data) => {
                // tokio-tungstenite queues the Pong reply itself.
                debug!(conn = %conn, "WebSocket ping ({} bytes)", data.len());
            }
            WsMessage::Pong(_) => {
                debug!(conn = %conn, "WebSocket pong");
            }
            WsMessage::Close(frame) => {
                let payload = frame.map(|f| {
                    debug!(conn = %conn, code = u16::from(f.code), "close frame received");
                    f.reason.into_owned()
                });
                return payload.filter(|reason| !reason.is_empty());
            }
            WsMessage::Frame(_) => {
                debug!(conn = %conn, "raw frame (ignored)");
            }
        }
    }
}
