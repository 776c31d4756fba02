//! WebSocket connection handling
//!
//! Upgrades requests on any path, then runs one task per socket that feeds
//! inbound frames to the dispatcher and drains the connection's outbound
//! queue onto the wire.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::relay::{ConnectionHandle, ConnectionId, DispatchError, Outbound, Relay};

/// Middleware that accepts a WebSocket upgrade on any path and lets every
/// other request through to the HTTP routes
pub async fn upgrade_any_path(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !is_websocket_upgrade(request.headers()) {
        return next.run(request).await;
    }

    let (mut parts, _body) = request.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => {
            // Subscribe before the 101 goes out so a shutdown can't slip past
            let shutdown_rx = state.shutdown_tx.subscribe();
            ws.on_upgrade(move |socket| handle_socket(socket, state, peer, shutdown_rx))
        }
        Err(rejection) => {
            warn!("Rejected WebSocket upgrade: {}", rejection);
            rejection.into_response()
        }
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Upper bound on delivering the Close frame to a client that stopped reading
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Drive a single WebSocket connection until either side closes it
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    peer: Option<SocketAddr>,
    shutdown_rx: broadcast::Receiver<()>,
) {
    let (handle, outbound) = ConnectionHandle::channel(state.outbound_capacity);
    let id = handle.id();
    match peer {
        Some(addr) => info!("New WebSocket connection {} from {}", id, addr),
        None => info!("New WebSocket connection {}", id),
    }

    state.relay.registry().connect(handle).await;

    if let Err(e) = run_connection(socket, id, outbound, &state.relay, shutdown_rx).await {
        error!("Connection error on {}: {}", id, e);
    }

    // Unconditional, whether or not the client ever registered
    let registration = state.relay.registry().unregister(id).await;
    match registration {
        Some(r) => info!(
            "Client {} ({}, registered {}) disconnected",
            id,
            r.role,
            r.last_activity.format("%H:%M:%S")
        ),
        None => info!("Client {} disconnected", id),
    }
}

async fn run_connection(
    socket: WebSocket,
    id: ConnectionId,
    outbound: Outbound,
    relay: &Relay,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let Outbound {
        mut frames,
        overflow,
    } = outbound;
    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            // Receive frames from the client
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(relay, id, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        match std::str::from_utf8(&data) {
                            Ok(text) => handle_frame(relay, id, text).await,
                            Err(_) => warn!(
                                "Received non-UTF-8 binary frame from {} ({} bytes), ignoring",
                                id,
                                data.len()
                            ),
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Pongs are answered by the socket itself
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("Client {} requested close", id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", id, e);
                        break;
                    }
                    None => {
                        debug!("Connection {} closed by peer", id);
                        break;
                    }
                }
            }
            // Forward broadcast frames to the client. A client that stops
            // reading stalls the write, so overflow and shutdown are raced
            // against it.
            Some(frame) = frames.recv() => {
                tokio::select! {
                    sent = ws_sender.send(Message::Text(frame.to_string().into())) => sent?,
                    _ = overflow.notified() => {
                        warn!("Closing connection {}: client stopped reading", id);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Shutdown signal received, dropping stalled connection {}", id);
                        break;
                    }
                }
            }
            // Outbound queue overflowed
            _ = overflow.notified() => {
                warn!("Closing connection {}: client is not keeping up", id);
                send_close(&mut ws_sender, id).await;
                break;
            }
            // Handle shutdown signal
            _ = shutdown_rx.recv() => {
                debug!("Shutdown signal received, closing connection {}", id);
                send_close(&mut ws_sender, id).await;
                break;
            }
        }
    }

    Ok(())
}

async fn send_close(ws_sender: &mut SplitSink<WebSocket, Message>, id: ConnectionId) {
    match tokio::time::timeout(CLOSE_TIMEOUT, ws_sender.send(Message::Close(None))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Close frame to {} failed: {}", id, e),
        Err(_) => debug!("Close frame to {} timed out", id),
    }
}

/// Dispatch one frame; failures are logged and the frame dropped
async fn handle_frame(relay: &Relay, id: ConnectionId, text: &str) {
    debug!("Received frame from {} ({} bytes)", id, text.len());

    match relay.dispatch(id, text).await {
        Ok(outcome) => debug!("Frame from {} handled: {:?}", id, outcome),
        Err(DispatchError::Protocol(e)) => {
            error!("Error processing message from {}: {}", id, e)
        }
        Err(e @ DispatchError::RoleMismatch { .. }) => info!("Dropped frame from {}: {}", id, e),
    }
}
