use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

use crate::auth;
use crate::errors::AppError;
use crate::models::{ApiResponse, VerifyRequest};
use crate::state::AppState;
use crate::verification::{self, ID_NUMBER_DIGITS};

/// POST /api/verify — run identity verification for the acting user.
///
/// The raw id number is handed to the verification collaborator and then
/// discarded; only its hash is stored, to catch reuse across accounts.
pub async fn verify_identity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    let actor = auth::require_actor(&headers, &state.gateway_secret)?;

    let digits = verification::normalize_id_number(&body.id_number);
    if digits.len() != ID_NUMBER_DIGITS {
        return Err(AppError::Validation(
            "id number must be exactly 12 digits".into(),
        ));
    }

    let already_verified: bool =
        sqlx::query_scalar("SELECT id_verified FROM profiles WHERE user_id = ?")
            .bind(&actor.user_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or(AppError::NotFound("profile"))?;
    if already_verified {
        return Err(AppError::Validation("identity is already verified".into()));
    }

    let hash = verification::hash_id_number(&digits);
    let duplicate: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM profiles WHERE id_hash = ? AND user_id != ?")
            .bind(&hash)
            .bind(&actor.user_id)
            .fetch_one(&state.db)
            .await?;
    if duplicate {
        return Err(AppError::Validation(
            "this id number is already linked to another account".into(),
        ));
    }

    let outcome = state
        .verifier
        .verify(&digits)
        .await
        .map_err(|e| AppError::Verification(e.to_string()))?;
    if !outcome.verified {
        return Err(AppError::Validation(
            outcome
                .reason
                .unwrap_or_else(|| "identity verification failed".into()),
        ));
    }

    sqlx::query(
        "UPDATE profiles SET id_verified = 1, id_hash = ?, id_verified_at = datetime('now')
         WHERE user_id = ?",
    )
    .bind(&hash)
    .bind(&actor.user_id)
    .execute(&state.db)
    .await?;

    tracing::info!(user = %actor.user_id, "identity verified");
    Ok(Json(ApiResponse::success("identity verified")))
}
