//! Result submission webhook.
//!
//! Stateless relay: the payload is stamped with the local wall-clock time and
//! pushed to all admin observers as a `new_result` event. Nothing is stored;
//! the roster is not involved.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
    pub message: String,
}

/// POST /webhook/submit
/// Accepts an arbitrary JSON object (expected to carry at least `nom` and
/// `score_global`, but nothing is required). Extra fields pass through
/// verbatim. Non-object bodies are relayed as-is without a timestamp.
pub async fn submit_results(
    State(state): State<AppState>,
    Json(mut payload): Json<Value>,
) -> (StatusCode, Json<SubmitResponse>) {
    if let Some(map) = payload.as_object_mut() {
        map.insert("timestamp".to_string(), Value::String(current_time_hms()));
    }

    // Log line is best-effort: missing fields display as placeholders.
    let nom = payload
        .get("nom")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>");
    let score = payload
        .get("score_global")
        .map(Value::to_string)
        .unwrap_or_else(|| "-".to_string());
    tracing::info!(nom = %nom, score_global = %score, "result submission received");

    state.roster.publish_result(payload);

    (
        StatusCode::OK,
        Json(SubmitResponse {
            status: "success",
            message: "results received".to_string(),
        }),
    )
}

/// Local wall-clock time formatted as HH:MM:SS.
fn current_time_hms() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
