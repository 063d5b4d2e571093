use axum::Router;

use crate::results;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    // WebSocket endpoints: persistent student connections and admin observers
    let ws_routes = Router::new()
        .route("/ws/student", axum::routing::get(ws_handler::student_ws_upgrade))
        .route("/ws/admin", axum::routing::get(ws_handler::admin_ws_upgrade));

    // One-shot result submission (not connection-bound)
    let webhook_routes = Router::new().route(
        "/webhook/submit",
        axum::routing::post(results::submit_results),
    );

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(ws_routes)
        .merge(webhook_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
