use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{self, Actor};
use crate::errors::AppError;
use crate::models::*;
use crate::state::AppState;

fn require_provider(headers: &HeaderMap, state: &AppState) -> Result<Actor, AppError> {
    let actor = auth::require_actor(headers, &state.gateway_secret)?;
    auth::require_role(&actor, Role::Provider)?;
    Ok(actor)
}

async fn own_service_profile_id(state: &AppState, actor: &Actor) -> Result<String, AppError> {
    sqlx::query_scalar("SELECT id FROM service_profiles WHERE user_id = ?")
        .bind(&actor.user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("service profile"))
}

const SERVICE_PROFILE_SELECT: &str =
    "SELECT id, user_id, service_type, bio, experience_years, is_available, rating, review_count, created_at
     FROM service_profiles WHERE user_id = ?";

/// PUT /api/provider/profile — publish or update the provider's offering.
pub async fn upsert_service_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpsertServiceProfileRequest>,
) -> Result<Json<ApiResponse<ServiceProfile>>, AppError> {
    let actor = require_provider(&headers, &state)?;
    if body.experience_years < 0 {
        return Err(AppError::Validation(
            "experience_years cannot be negative".into(),
        ));
    }

    // One offering per provider account; the id survives re-publication.
    sqlx::query(
        "INSERT INTO service_profiles (id, user_id, service_type, bio, experience_years, is_available)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
             service_type = excluded.service_type,
             bio = excluded.bio,
             experience_years = excluded.experience_years,
             is_available = excluded.is_available",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&actor.user_id)
    .bind(body.service_type)
    .bind(&body.bio)
    .bind(body.experience_years)
    .bind(body.is_available)
    .execute(&state.db)
    .await?;

    let service_profile = sqlx::query_as::<_, ServiceProfile>(SERVICE_PROFILE_SELECT)
        .bind(&actor.user_id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(ApiResponse::success(service_profile)))
}

const TEMPLATE_SELECT: &str =
    "SELECT service_profile_id, day_of_week, is_available, start_hour, end_hour, slot_duration_minutes
     FROM provider_availability WHERE service_profile_id = ?
     ORDER BY day_of_week ASC";

/// GET /api/provider/availability — the provider's weekly templates.
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<AvailabilityTemplate>>>, AppError> {
    let actor = require_provider(&headers, &state)?;
    let service_profile_id = own_service_profile_id(&state, &actor).await?;

    let templates = sqlx::query_as::<_, AvailabilityTemplate>(TEMPLATE_SELECT)
        .bind(&service_profile_id)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(ApiResponse::success(templates)))
}

/// PUT /api/provider/availability — upsert weekly templates, one row per
/// weekday (0 = Sunday). Days without a row keep the default schedule.
pub async fn set_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SetAvailabilityRequest>,
) -> Result<Json<ApiResponse<Vec<AvailabilityTemplate>>>, AppError> {
    let actor = require_provider(&headers, &state)?;
    let service_profile_id = own_service_profile_id(&state, &actor).await?;

    for entry in &body.templates {
        validate_template(entry)?;
    }

    for entry in &body.templates {
        sqlx::query(
            "INSERT INTO provider_availability
                 (service_profile_id, day_of_week, is_available, start_hour, end_hour, slot_duration_minutes)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(service_profile_id, day_of_week) DO UPDATE SET
                 is_available = excluded.is_available,
                 start_hour = excluded.start_hour,
                 end_hour = excluded.end_hour,
                 slot_duration_minutes = excluded.slot_duration_minutes",
        )
        .bind(&service_profile_id)
        .bind(entry.day_of_week)
        .bind(entry.is_available)
        .bind(entry.start_hour)
        .bind(entry.end_hour)
        .bind(entry.slot_duration_minutes)
        .execute(&state.db)
        .await?;
    }

    let templates = sqlx::query_as::<_, AvailabilityTemplate>(TEMPLATE_SELECT)
        .bind(&service_profile_id)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(ApiResponse::success(templates)))
}

fn validate_template(entry: &TemplateEntry) -> Result<(), AppError> {
    if !(0..=6).contains(&entry.day_of_week) {
        return Err(AppError::Validation("day_of_week must be 0-6".into()));
    }
    if !entry.is_available {
        // Hours are ignored on a day off.
        return Ok(());
    }
    if !(0..=24).contains(&entry.start_hour)
        || !(0..=24).contains(&entry.end_hour)
        || entry.start_hour >= entry.end_hour
    {
        return Err(AppError::Validation(
            "working hours must satisfy 0 <= start < end <= 24".into(),
        ));
    }
    if entry.slot_duration_minutes <= 0
        || entry.start_hour * 60 + entry.slot_duration_minutes > entry.end_hour * 60
    {
        return Err(AppError::Validation(
            "slot duration must fit within the working hours".into(),
        ));
    }
    Ok(())
}

/// GET /api/provider/bookings — every booking against this provider.
pub async fn provider_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<ProviderBookingView>>>, AppError> {
    let actor = require_provider(&headers, &state)?;

    let bookings = sqlx::query_as::<_, ProviderBookingView>(
        "SELECT b.id, b.booking_code, b.booking_date, b.time_slot, b.status, b.service_note,
                COALESCE(p.name, 'Customer') AS customer_name, b.created_at
         FROM bookings b
         LEFT JOIN profiles p ON p.user_id = b.customer_id
         WHERE b.provider_user_id = ?
         ORDER BY b.booking_date ASC, b.time_slot ASC",
    )
    .bind(&actor.user_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(bookings)))
}

/// POST /api/provider/bookings/{id}/accept — pending → confirmed.
pub async fn accept_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<BookingStatus>>, AppError> {
    transition(&state, &headers, &id, BookingStatus::Pending, BookingStatus::Confirmed).await
}

/// POST /api/provider/bookings/{id}/decline — pending → cancelled. No
/// reason is required from the provider side, unlike customer cancellation.
pub async fn decline_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<BookingStatus>>, AppError> {
    transition(&state, &headers, &id, BookingStatus::Pending, BookingStatus::Cancelled).await
}

/// POST /api/provider/bookings/{id}/complete — confirmed → completed.
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<BookingStatus>>, AppError> {
    transition(&state, &headers, &id, BookingStatus::Confirmed, BookingStatus::Completed).await
}

async fn transition(
    state: &AppState,
    headers: &HeaderMap,
    id: &str,
    source: BookingStatus,
    target: BookingStatus,
) -> Result<Json<ApiResponse<BookingStatus>>, AppError> {
    debug_assert!(source.can_transition_to(target));
    let actor = require_provider(headers, state)?;

    let current: BookingStatus =
        sqlx::query_scalar("SELECT status FROM bookings WHERE id = ? AND provider_user_id = ?")
            .bind(id)
            .bind(&actor.user_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or(AppError::NotFound("booking"))?;
    if current != source {
        return Err(AppError::InvalidTransition { from: current });
    }

    // Conditional update: a concurrent caller that got here first wins and
    // this one changes nothing.
    let result = sqlx::query(
        "UPDATE bookings SET status = ?
         WHERE id = ? AND provider_user_id = ? AND status = ?",
    )
    .bind(target)
    .bind(id)
    .bind(&actor.user_id)
    .bind(source)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        let from: BookingStatus = sqlx::query_scalar("SELECT status FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
        return Err(AppError::InvalidTransition { from });
    }

    tracing::info!(booking = id, from = %source, to = %target, "booking status changed");
    Ok(Json(ApiResponse::success(target)))
}
