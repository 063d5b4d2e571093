pub mod actor;
pub mod handler;
pub mod protocol;

use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// The actor's side tasks clone this to push frames to the client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;
