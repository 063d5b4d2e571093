use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// GET /ws/student
/// WebSocket upgrade for a student connection. No authentication; identity
/// arrives as the first protocol message on the socket.
pub async fn student_ws_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| actor::run_student_connection(socket, state))
}

/// GET /ws/admin
/// WebSocket upgrade for an admin dashboard observer. The current roster
/// snapshot is pushed immediately after the upgrade completes.
pub async fn admin_ws_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| actor::run_admin_connection(socket, state))
}
