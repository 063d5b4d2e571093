//! Per-connection actor tasks for student and admin WebSockets.
//!
//! Each connection is split into reader and writer halves: a writer task owns
//! the sink and forwards frames from an mpsc channel, the reader loop drives
//! the connection's state. Registry updates happen only from the reader loop,
//! so each connection's lifecycle events are processed in order.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::protocol::{self, ClientMessage};
use crate::ws::ConnectionSender;

/// Server sends a WebSocket ping on this interval to detect abrupt
/// disconnects (closed laptop, dropped wifi) that never send a Close frame.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// If no pong arrives within this window after a ping, the connection is
/// considered gone and is closed.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of a student connection. A connection owns a roster entry only
/// while identified; closing from either state removes it (a no-op when
/// anonymous).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Anonymous,
    Identified,
}

/// Run the actor for a student connection.
///
/// The connection starts anonymous; a roster entry appears only once the
/// client sends its `identify` message. On any exit path the entry is removed
/// and the roster re-broadcast, so the registry invariant (entry iff
/// identified and still connected) holds for clean and abrupt closes alike.
pub async fn run_student_connection(socket: WebSocket, state: AppState) {
    let conn_id = state.roster.allocate_conn_id();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));
    let (ping_handle, pong_tx) = spawn_keepalive(tx.clone());

    tracing::info!(conn_id = %conn_id, "student connected, awaiting identification");

    let mut conn_state = ConnState::Anonymous;
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => match ClientMessage::parse(&text) {
                    Some(msg @ ClientMessage::Identify { .. }) => {
                        let student = msg.into_student();
                        tracing::info!(
                            conn_id = %conn_id,
                            nom = %student.nom,
                            option = ?student.option,
                            "student identified"
                        );
                        // Re-identification overwrites the existing entry and
                        // re-broadcasts.
                        state.roster.identify(conn_id, student);
                        conn_state = ConnState::Identified;
                    }
                    None => {
                        tracing::warn!(
                            conn_id = %conn_id,
                            "ignoring unrecognized message: {}",
                            text.chars().take(100).collect::<String>()
                        );
                    }
                },
                Message::Binary(_) => {
                    tracing::debug!(conn_id = %conn_id, "ignoring binary frame");
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(conn_id = %conn_id, reason = ?frame, "client initiated close");
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                tracing::info!(conn_id = %conn_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    // Remove-then-broadcast runs even for anonymous connections; the removal
    // is a no-op and observers receive an unchanged (idempotent) snapshot.
    state.roster.disconnect(conn_id);

    tracing::info!(
        conn_id = %conn_id,
        identified = conn_state == ConnState::Identified,
        "student disconnected"
    );
}

/// Run the actor for an admin observer connection.
///
/// Subscribing delivers the current roster snapshot immediately; afterwards
/// every roster mutation and relayed result arrives on the observer queue and
/// is forwarded to the socket as a JSON text frame.
pub async fn run_admin_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let (observer_id, mut events) = state.roster.subscribe();
    tracing::info!(observer = ?observer_id, "admin dashboard connected");

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));
    let (ping_handle, pong_tx) = spawn_keepalive(tx.clone());

    // Forward observer events to the connection's outbound channel.
    let event_tx = tx.clone();
    let forward_handle = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(frame) = protocol::encode_event(&event) else {
                continue;
            };
            if event_tx.send(frame).is_err() {
                break;
            }
        }
    });

    // Admins send nothing application-level; the reader loop only services
    // keepalive traffic and detects close.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(observer = ?observer_id, reason = ?frame, "admin closed");
                    break;
                }
                Message::Text(_) | Message::Binary(_) => {
                    tracing::debug!(observer = ?observer_id, "ignoring inbound admin frame");
                }
            },
            Some(Err(e)) => {
                tracing::warn!(observer = ?observer_id, error = %e, "WebSocket receive error");
                break;
            }
            None => break,
        }
    }

    writer_handle.abort();
    ping_handle.abort();
    forward_handle.abort();
    state.roster.unsubscribe(observer_id);

    tracing::info!(observer = ?observer_id, "admin dashboard disconnected");
}

/// Writer task: receives frames from the mpsc channel and forwards them to
/// the WebSocket sink.
async fn writer_task(mut ws_sender: SplitSink<WebSocket, Message>, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            break;
        }
    }
}

/// Spawn the keepalive task: periodic pings, close on pong timeout.
/// Returns the task handle and the channel the reader loop feeds pongs into.
fn spawn_keepalive(tx: ConnectionSender) -> (JoinHandle<()>, mpsc::UnboundedSender<()>) {
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("pong timeout, closing connection");
                    let _ = tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    (handle, pong_tx)
}
