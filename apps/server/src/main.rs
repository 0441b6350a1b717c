use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use karigar_server::db;
use karigar_server::handlers;
use karigar_server::rate_limit::{limit_account, limit_booking, limit_public, RateLimiter};
use karigar_server::state::AppState;
use karigar_server::verification::FormatCheckVerifier;

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // ── Required env vars ──
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:karigar.db?mode=rwc".into());
    let gateway_secret = std::env::var("GATEWAY_SECRET").expect("GATEWAY_SECRET must be set");

    // ── Tracing ──
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let allowed_origin = std::env::var("ALLOWED_ORIGIN").unwrap_or_default();

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    db::run_migrations(&pool).await?;

    let state = Arc::new(AppState {
        db: pool,
        gateway_secret,
        verifier: Box::new(FormatCheckVerifier),
        started_at: Instant::now(),
    });

    // ── Rate limiter + background cleanup ──
    let rate_limiter = RateLimiter::new();
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    // ── CORS: whitelist ALLOWED_ORIGIN when configured, otherwise allow any ──
    let cors = if allowed_origin.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = vec![
            allowed_origin
                .parse()
                .expect("ALLOWED_ORIGIN must be a valid origin"),
            "http://localhost:5173".parse().unwrap(), // Vite dev server
        ];
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // ── Router (4 groups with per-group rate limits) ──

    // 1. No-limit: health checks
    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // 2. Public: discovery endpoints (no auth, 60 req/min)
    let public_routes = Router::new()
        .route(
            "/api/service-types",
            get(handlers::customer::list_service_types),
        )
        .route("/api/providers", get(handlers::customer::list_providers))
        .route(
            "/api/providers/{id}",
            get(handlers::customer::provider_detail),
        )
        .route(
            "/api/providers/{id}/slots",
            get(handlers::customer::day_slots),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), limit_public));

    // 3. Booking writes: strictest limit (5 req/5min)
    let booking_routes = Router::new()
        .route("/api/bookings", post(handlers::customer::create_booking))
        .route(
            "/api/bookings/{id}/reschedule",
            post(handlers::customer::reschedule_booking),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), limit_booking));

    // 4. Account: authenticated endpoints, both roles (30 req/min)
    let account_routes = Router::new()
        .route("/api/bookings/my", get(handlers::customer::my_bookings))
        .route(
            "/api/bookings/{id}/cancel",
            post(handlers::customer::cancel_booking),
        )
        .route("/api/profile", put(handlers::customer::upsert_profile))
        .route("/api/reviews", post(handlers::customer::create_review))
        .route("/api/verify", post(handlers::verify::verify_identity))
        .route(
            "/api/provider/profile",
            put(handlers::provider::upsert_service_profile),
        )
        .route(
            "/api/provider/availability",
            get(handlers::provider::get_availability),
        )
        .route(
            "/api/provider/availability",
            put(handlers::provider::set_availability),
        )
        .route(
            "/api/provider/bookings",
            get(handlers::provider::provider_bookings),
        )
        .route(
            "/api/provider/bookings/{id}/accept",
            post(handlers::provider::accept_booking),
        )
        .route(
            "/api/provider/bookings/{id}/decline",
            post(handlers::provider::decline_booking),
        )
        .route(
            "/api/provider/bookings/{id}/complete",
            post(handlers::provider::complete_booking),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), limit_account));

    let app = Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(account_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Karigar server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
