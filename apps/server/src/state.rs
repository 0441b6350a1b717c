use std::time::Instant;

use crate::verification::VerificationProvider;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub gateway_secret: String,
    pub verifier: Box<dyn VerificationProvider>,
    pub started_at: Instant,
}
