use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{Days, FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{self, Actor};
use crate::errors::{conflict_on_unique, AppError};
use crate::models::*;
use crate::scheduling;
use crate::state::AppState;

// ── Constants ──

/// India Standard Time offset (UTC+5:30).
const IST_OFFSET_SECS: i32 = 5 * 3600 + 1800;

/// Bookings are accepted from today up to this many days ahead.
const BOOKING_HORIZON_DAYS: u64 = 30;

/// Service notes are capped at the same length the booking form allows.
const MAX_NOTE_CHARS: usize = 500;

fn ist_now() -> chrono::DateTime<FixedOffset> {
    let ist = FixedOffset::east_opt(IST_OFFSET_SECS).unwrap();
    Utc::now().with_timezone(&ist)
}

fn ist_today() -> NaiveDate {
    ist_now().date_naive()
}

fn now_stamp() -> String {
    ist_now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn require_customer(headers: &HeaderMap, state: &AppState) -> Result<Actor, AppError> {
    let actor = auth::require_actor(headers, &state.gateway_secret)?;
    auth::require_role(&actor, Role::Customer)?;
    Ok(actor)
}

/// Parse and bound a booking date, returning it with its canonical form.
fn validate_booking_window(raw: &str) -> Result<(NaiveDate, String), AppError> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::Validation("booking_date must be YYYY-MM-DD".into()))?;
    let today = ist_today();
    if date < today {
        return Err(AppError::Validation("booking_date is in the past".into()));
    }
    if date > today + Days::new(BOOKING_HORIZON_DAYS) {
        return Err(AppError::Validation(format!(
            "bookings are accepted at most {BOOKING_HORIZON_DAYS} days ahead"
        )));
    }
    Ok((date, date.format("%Y-%m-%d").to_string()))
}

const PROVIDER_SUMMARY_SELECT: &str =
    "SELECT sp.id AS service_profile_id, sp.user_id, p.name, sp.service_type, p.city, p.area,
            sp.bio, sp.experience_years, p.photo_url, p.id_verified AS verified,
            sp.is_available, sp.rating, sp.review_count
     FROM service_profiles sp
     JOIN profiles p ON p.user_id = sp.user_id";

// ── Catalog & discovery ──

/// GET /api/service-types — the fixed trade catalog.
pub async fn list_service_types() -> Json<ApiResponse<Vec<ServiceTypeInfo>>> {
    let types = ServiceType::ALL
        .iter()
        .map(|t| ServiceTypeInfo {
            name: t.as_str(),
            icon: t.icon(),
        })
        .collect();
    Json(ApiResponse::success(types))
}

/// GET /api/providers — search providers, best-rated first.
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProviderQuery>,
) -> Result<Json<ApiResponse<Vec<ProviderSummary>>>, AppError> {
    let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(PROVIDER_SUMMARY_SELECT);
    qb.push(" WHERE 1 = 1");
    if let Some(service_type) = query.service_type {
        qb.push(" AND sp.service_type = ").push_bind(service_type);
    }
    if let Some(city) = &query.city {
        qb.push(" AND p.city = ").push_bind(city.clone());
    }
    if let Some(min_rating) = query.min_rating {
        qb.push(" AND sp.rating >= ").push_bind(min_rating);
    }
    if query.verified_only {
        qb.push(" AND p.id_verified = 1");
    }
    if let Some(q) = &query.q {
        let pattern = format!("%{}%", q);
        qb.push(" AND (p.name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR sp.bio LIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.area LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    qb.push(" ORDER BY sp.rating DESC, sp.review_count DESC");

    let providers = qb
        .build_query_as::<ProviderSummary>()
        .fetch_all(&state.db)
        .await?;

    Ok(Json(ApiResponse::success(providers)))
}

/// GET /api/providers/{id} — one provider with their reviews.
pub async fn provider_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ProviderDetail>>, AppError> {
    let query = format!("{PROVIDER_SUMMARY_SELECT} WHERE sp.id = ?");
    let provider = sqlx::query_as::<_, ProviderSummary>(&query)
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("service profile"))?;

    let reviews = sqlx::query_as::<_, ReviewView>(
        "SELECT r.id, COALESCE(p.name, 'Customer') AS customer_name, r.rating, r.comment, r.created_at
         FROM reviews r
         LEFT JOIN profiles p ON p.user_id = r.customer_id
         WHERE r.service_profile_id = ?
         ORDER BY r.created_at DESC",
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(ProviderDetail { provider, reviews })))
}

/// GET /api/providers/{id}/slots?date=YYYY-MM-DD — the day's slot board.
///
/// Template resolution and occupancy narrow what the UI offers; the
/// write-time guard in Create stays the authority on conflicts.
pub async fn day_slots(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<ApiResponse<DaySlots>>, AppError> {
    let date = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|_| AppError::Validation("date must be YYYY-MM-DD".into()))?;
    let date_str = date.format("%Y-%m-%d").to_string();

    let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM service_profiles WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(AppError::NotFound("service profile"));
    }

    let schedule = scheduling::resolve_day(&state.db, &id, date).await;
    let taken = scheduling::occupied_slots(&state.db, &id, &date_str).await?;
    let slots = schedule
        .slots
        .iter()
        .map(|slot| {
            let label = slot.label();
            SlotStatus {
                taken: taken.contains(&label),
                label,
            }
        })
        .collect();

    Ok(Json(ApiResponse::success(DaySlots {
        date: date_str,
        available: schedule.available,
        slots,
    })))
}

// ── Booking lifecycle ──

/// POST /api/bookings — reserve a slot.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Json<ApiResponse<BookingConfirmation>>, AppError> {
    let actor = require_customer(&headers, &state)?;
    let (date, date_str) = validate_booking_window(&body.booking_date)?;
    if body.service_note.chars().count() > MAX_NOTE_CHARS {
        return Err(AppError::Validation(format!(
            "service note is limited to {MAX_NOTE_CHARS} characters"
        )));
    }

    let service_profile = sqlx::query_as::<_, ServiceProfile>(
        "SELECT id, user_id, service_type, bio, experience_years, is_available, rating, review_count, created_at
         FROM service_profiles WHERE id = ?",
    )
    .bind(&body.service_profile_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("service profile"))?;
    if !service_profile.is_available {
        return Err(AppError::Validation(
            "provider is not accepting bookings".into(),
        ));
    }

    // Both sides of the transaction must be verified.
    ensure_verified(&state, &actor.user_id).await?;
    ensure_verified(&state, &service_profile.user_id).await?;

    let schedule = scheduling::resolve_day(&state.db, &service_profile.id, date).await;
    if !schedule.contains_label(&body.time_slot) {
        return Err(AppError::Validation(
            "time_slot is not bookable on this date".into(),
        ));
    }

    // Advisory pre-check so doomed slots are refused cheaply. The unique
    // index over active bookings decides races.
    let taken = scheduling::occupied_slots(&state.db, &service_profile.id, &date_str).await?;
    if taken.contains(&body.time_slot) {
        return Err(AppError::SlotConflict);
    }

    let id = Uuid::new_v4().to_string();
    let code = new_booking_code();
    sqlx::query(
        "INSERT INTO bookings (id, booking_code, customer_id, provider_user_id, service_profile_id,
                               booking_date, time_slot, status, service_note, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
    )
    .bind(&id)
    .bind(&code)
    .bind(&actor.user_id)
    .bind(&service_profile.user_id)
    .bind(&service_profile.id)
    .bind(&date_str)
    .bind(&body.time_slot)
    .bind(&body.service_note)
    .bind(now_stamp())
    .execute(&state.db)
    .await
    .map_err(conflict_on_unique)?;

    tracing::info!(booking = %code, date = %date_str, slot = %body.time_slot, "slot reserved");

    Ok(Json(ApiResponse::success(BookingConfirmation {
        id,
        booking_code: code,
        status: BookingStatus::Pending,
        booking_date: date_str,
        time_slot: body.time_slot,
    })))
}

/// GET /api/bookings/my — the customer's bookings, newest first.
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<CustomerBookingView>>>, AppError> {
    let actor = require_customer(&headers, &state)?;

    let bookings = sqlx::query_as::<_, CustomerBookingView>(
        "SELECT b.id, b.booking_code, b.booking_date, b.time_slot, b.status, b.service_note,
                b.cancellation_reason, COALESCE(p.name, 'Provider') AS provider_name,
                sp.service_type, b.service_profile_id, b.created_at
         FROM bookings b
         JOIN service_profiles sp ON sp.id = b.service_profile_id
         LEFT JOIN profiles p ON p.user_id = b.provider_user_id
         WHERE b.customer_id = ?
         ORDER BY b.created_at DESC",
    )
    .bind(&actor.user_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(bookings)))
}

/// POST /api/bookings/{id}/cancel — customer cancellation, reason required.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CancelBookingRequest>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    let actor = require_customer(&headers, &state)?;
    let reason = body.reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation("cancellation reason is required".into()));
    }

    let booking = fetch_own_booking(&state, &id, &actor).await?;
    if !booking.status.is_active() {
        return Err(AppError::InvalidTransition {
            from: booking.status,
        });
    }

    let result = sqlx::query(
        "UPDATE bookings SET status = 'cancelled', cancellation_reason = ?
         WHERE id = ? AND status IN ('pending', 'confirmed')",
    )
    .bind(reason)
    .bind(&booking.id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::InvalidTransition {
            from: current_status(&state, &booking.id).await?,
        });
    }

    tracing::info!(booking = %booking.booking_code, "booking cancelled by customer");
    Ok(Json(ApiResponse::success("booking cancelled")))
}

/// POST /api/bookings/{id}/reschedule — move to a new (date, slot).
///
/// The booking re-enters the provider's acceptance queue as pending, even
/// when it was already confirmed.
pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RescheduleBookingRequest>,
) -> Result<Json<ApiResponse<BookingConfirmation>>, AppError> {
    let actor = require_customer(&headers, &state)?;
    let (date, date_str) = validate_booking_window(&body.booking_date)?;

    let booking = fetch_own_booking(&state, &id, &actor).await?;
    if !booking.status.is_active() {
        return Err(AppError::InvalidTransition {
            from: booking.status,
        });
    }

    let schedule = scheduling::resolve_day(&state.db, &booking.service_profile_id, date).await;
    if !schedule.contains_label(&body.time_slot) {
        return Err(AppError::Validation(
            "time_slot is not bookable on this date".into(),
        ));
    }

    // The booking is moving, so its own slot does not count against it.
    let taken = scheduling::occupied_slots_excluding(
        &state.db,
        &booking.service_profile_id,
        &date_str,
        &booking.id,
    )
    .await?;
    if taken.contains(&body.time_slot) {
        return Err(AppError::SlotConflict);
    }

    let result = sqlx::query(
        "UPDATE bookings SET booking_date = ?, time_slot = ?, status = 'pending'
         WHERE id = ? AND status IN ('pending', 'confirmed')",
    )
    .bind(&date_str)
    .bind(&body.time_slot)
    .bind(&booking.id)
    .execute(&state.db)
    .await
    .map_err(conflict_on_unique)?;
    if result.rows_affected() == 0 {
        return Err(AppError::InvalidTransition {
            from: current_status(&state, &booking.id).await?,
        });
    }

    tracing::info!(booking = %booking.booking_code, date = %date_str, slot = %body.time_slot, "booking rescheduled");

    Ok(Json(ApiResponse::success(BookingConfirmation {
        id: booking.id,
        booking_code: booking.booking_code,
        status: BookingStatus::Pending,
        booking_date: date_str,
        time_slot: body.time_slot,
    })))
}

// ── Profile & reviews ──

/// PUT /api/profile — upsert the acting user's profile, either role.
pub async fn upsert_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpsertProfileRequest>,
) -> Result<Json<ApiResponse<Profile>>, AppError> {
    let actor = auth::require_actor(&headers, &state.gateway_secret)?;
    if body.name.trim().is_empty() {
        return Err(AppError::Validation("name is required".into()));
    }

    // Role is pinned on first write; the identity collaborator owns it.
    sqlx::query(
        "INSERT INTO profiles (user_id, name, role, contact, city, area, photo_url)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
             name = excluded.name,
             contact = excluded.contact,
             city = excluded.city,
             area = excluded.area,
             photo_url = excluded.photo_url",
    )
    .bind(&actor.user_id)
    .bind(body.name.trim())
    .bind(actor.role)
    .bind(&body.contact)
    .bind(&body.city)
    .bind(&body.area)
    .bind(&body.photo_url)
    .execute(&state.db)
    .await?;

    let profile = sqlx::query_as::<_, Profile>(
        "SELECT user_id, name, role, contact, city, area, photo_url, id_verified, id_verified_at, created_at
         FROM profiles WHERE user_id = ?",
    )
    .bind(&actor.user_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(profile)))
}

/// POST /api/reviews — leave a rating, updating the profile aggregate.
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateReviewRequest>,
) -> Result<Json<ApiResponse<ReviewView>>, AppError> {
    let actor = require_customer(&headers, &state)?;
    if !(1..=5).contains(&body.rating) {
        return Err(AppError::Validation("rating must be between 1 and 5".into()));
    }
    if body.comment.trim().is_empty() {
        return Err(AppError::Validation("review comment is required".into()));
    }

    let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM service_profiles WHERE id = ?")
        .bind(&body.service_profile_id)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(AppError::NotFound("service profile"));
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO reviews (id, service_profile_id, customer_id, rating, comment)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&body.service_profile_id)
    .bind(&actor.user_id)
    .bind(body.rating)
    .bind(body.comment.trim())
    .execute(&state.db)
    .await?;

    // Keep the denormalised aggregate in step with the review rows.
    sqlx::query(
        "UPDATE service_profiles
         SET review_count = (SELECT COUNT(*) FROM reviews WHERE service_profile_id = ?),
             rating = (SELECT ROUND(AVG(rating), 1) FROM reviews WHERE service_profile_id = ?)
         WHERE id = ?",
    )
    .bind(&body.service_profile_id)
    .bind(&body.service_profile_id)
    .bind(&body.service_profile_id)
    .execute(&state.db)
    .await?;

    let review = sqlx::query_as::<_, ReviewView>(
        "SELECT r.id, COALESCE(p.name, 'Customer') AS customer_name, r.rating, r.comment, r.created_at
         FROM reviews r
         LEFT JOIN profiles p ON p.user_id = r.customer_id
         WHERE r.id = ?",
    )
    .bind(&id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(review)))
}

// ── Private helpers ──

async fn ensure_verified(state: &AppState, user_id: &str) -> Result<(), AppError> {
    let verified: bool = sqlx::query_scalar("SELECT id_verified FROM profiles WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("profile"))?;
    if verified {
        Ok(())
    } else {
        Err(AppError::Unverified)
    }
}

async fn fetch_own_booking(state: &AppState, id: &str, actor: &Actor) -> Result<Booking, AppError> {
    sqlx::query_as::<_, Booking>(
        "SELECT id, booking_code, customer_id, provider_user_id, service_profile_id, booking_date,
                time_slot, status, service_note, cancellation_reason, created_at
         FROM bookings WHERE id = ? AND customer_id = ?",
    )
    .bind(id)
    .bind(&actor.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("booking"))
}

async fn current_status(state: &AppState, id: &str) -> Result<BookingStatus, AppError> {
    Ok(
        sqlx::query_scalar("SELECT status FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_one(&state.db)
            .await?,
    )
}

/// Short uppercase code customers quote over the phone. The column's
/// unique constraint backs up the negligible collision odds.
fn new_booking_code() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("BK-{}", hex[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_code_shape() {
        let code = new_booking_code();
        assert!(code.starts_with("BK-"));
        assert_eq!(code.len(), 11);
        assert_eq!(code, code.to_uppercase());
    }

    #[test]
    fn test_booking_codes_are_unique_enough() {
        let a = new_booking_code();
        let b = new_booking_code();
        assert_ne!(a, b);
    }

    #[test]
    fn test_booking_window_rejects_garbage() {
        assert!(validate_booking_window("not-a-date").is_err());
        assert!(validate_booking_window("2026-13-40").is_err());
    }

    #[test]
    fn test_booking_window_accepts_near_future() {
        let date = ist_today() + Days::new(3);
        let raw = date.format("%Y-%m-%d").to_string();
        let (parsed, canonical) = validate_booking_window(&raw).unwrap();
        assert_eq!(parsed, date);
        assert_eq!(canonical, raw);
    }

    #[test]
    fn test_booking_window_rejects_past_and_far_future() {
        let past = (ist_today() - Days::new(1)).format("%Y-%m-%d").to_string();
        assert!(validate_booking_window(&past).is_err());

        let far = (ist_today() + Days::new(BOOKING_HORIZON_DAYS + 1))
            .format("%Y-%m-%d")
            .to_string();
        assert!(validate_booking_window(&far).is_err());
    }
}
