use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::{ApiResponse, BookingStatus};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The targeted (service profile, date, slot) is already held by an
    /// active booking. Recoverable: pick another slot and re-fetch occupancy.
    #[error("slot no longer available, please pick another")]
    SlotConflict,

    /// A status change was attempted from a state that does not permit it.
    /// Usually stale client state; the caller should re-fetch the booking.
    #[error("action not available for a {from} booking")]
    InvalidTransition { from: BookingStatus },

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("identity verification required")]
    Unverified,

    #[error("missing or invalid actor token")]
    Unauthorized,

    #[error("not allowed for this account")]
    Forbidden,

    #[error("verification provider error: {0}")]
    Verification(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::SlotConflict => "slot_conflict",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Unverified => "unverified",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::Verification(_) => "verification_unavailable",
            AppError::Database(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::SlotConflict | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unverified | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Verification(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {e}");
                ApiResponse::<()>::error_coded("database error", self.code())
            }
            other => ApiResponse::<()>::error_coded(other.to_string(), other.code()),
        };
        (status, Json(body)).into_response()
    }
}

/// Map a unique-constraint violation on the active-slot index to the
/// user-facing conflict; anything else stays a database error.
pub fn conflict_on_unique(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::SlotConflict,
        _ => AppError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_codes_are_distinct() {
        // Both map to 409; the code field is what tells them apart.
        let conflict = AppError::SlotConflict;
        let transition = AppError::InvalidTransition {
            from: BookingStatus::Completed,
        };
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(transition.status(), StatusCode::CONFLICT);
        assert_ne!(conflict.code(), transition.code());
    }

    #[test]
    fn test_invalid_transition_names_current_status() {
        let err = AppError::InvalidTransition {
            from: BookingStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "action not available for a cancelled booking"
        );
    }
}
