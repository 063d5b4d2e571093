use std::sync::Arc;

use crate::roster::Roster;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide presence roster and admin broadcast hub
    pub roster: Arc<Roster>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            roster: Arc::new(Roster::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
