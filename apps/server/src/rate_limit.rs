use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

// ── Tiers ──

/// Route groups with distinct rate budgets. Booking creation is the
/// strictest: a burst of create calls is either abuse or a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Public,
    Account,
    Booking,
}

impl Tier {
    fn config(self) -> RateLimitConfig {
        match self {
            Tier::Public => RateLimitConfig {
                max_requests: 60,
                window: Duration::from_secs(60),
            },
            Tier::Account => RateLimitConfig {
                max_requests: 30,
                window: Duration::from_secs(60),
            },
            Tier::Booking => RateLimitConfig {
                max_requests: 5,
                window: Duration::from_secs(300),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum requests allowed within the sliding window.
    pub max_requests: u32,
    /// Duration of the sliding window.
    pub window: Duration,
}

// ── Core limiter ──

/// In-memory per-IP sliding-window limiter. Keys are (tier, client IP);
/// values are the timestamps of requests still inside the window.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    hits: Arc<DashMap<(Tier, IpAddr), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Ok(())` if allowed, `Err(retry_after_secs)` if limited.
    pub fn check(&self, tier: Tier, ip: IpAddr) -> Result<(), u64> {
        self.check_config(tier.config(), (tier, ip))
    }

    fn check_config(&self, config: RateLimitConfig, key: (Tier, IpAddr)) -> Result<(), u64> {
        let now = Instant::now();
        let window_start = now - config.window;

        let mut entry = self.hits.entry(key).or_default();
        entry.retain(|t| *t > window_start);

        if entry.len() >= config.max_requests as usize {
            // Time until the oldest request leaves the window
            let oldest = entry[0];
            let retry_after = (oldest + config.window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }

    /// Drop entries idle for more than 2× their tier's window.
    /// Call periodically from a background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.hits.retain(|&(tier, _), timestamps| {
            let cutoff = tier.config().window * 2;
            timestamps.retain(|t| now.duration_since(*t) < cutoff);
            !timestamps.is_empty()
        });
    }
}

// ── IP extraction ──

/// Client IP from X-Forwarded-For (reverse proxy) or ConnectInfo.
fn client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| "127.0.0.1".parse().unwrap())
}

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "Too many requests. Try again in {} seconds",
        retry_after
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

async fn enforce(
    tier: Tier,
    limiter: &RateLimiter,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = client_ip(&req);
    limiter.check(tier, ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

// ── Middleware functions (one per tier) ──

/// Public read-only endpoints (60 req/min).
pub async fn limit_public(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(Tier::Public, &limiter, req, next).await
}

/// Authenticated account endpoints (30 req/min).
pub async fn limit_account(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(Tier::Account, &limiter, req, next).await
}

/// Booking creation and rescheduling (5 req/5min — strictest).
pub async fn limit_booking(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(Tier::Booking, &limiter, req, next).await
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread::sleep;

    fn test_ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn tiny(max_requests: u32, window_ms: u64) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            window: Duration::from_millis(window_ms),
        }
    }

    #[test]
    fn test_allows_requests_under_limit() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..5 {
            assert!(limiter.check(Tier::Booking, ip).is_ok());
        }
    }

    #[test]
    fn test_rejects_over_limit() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..5 {
            limiter.check(Tier::Booking, ip).unwrap();
        }
        assert!(limiter.check(Tier::Booking, ip).is_err());
    }

    #[test]
    fn test_returns_retry_after() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..5 {
            limiter.check(Tier::Booking, ip).unwrap();
        }
        let retry_after = limiter.check(Tier::Booking, ip).unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 300);
    }

    #[test]
    fn test_different_ips_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            limiter.check(Tier::Booking, test_ip(1)).unwrap();
        }
        assert!(limiter.check(Tier::Booking, test_ip(1)).is_err());
        assert!(limiter.check(Tier::Booking, test_ip(2)).is_ok());
    }

    #[test]
    fn test_tiers_tracked_independently() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..5 {
            limiter.check(Tier::Booking, ip).unwrap();
        }
        assert!(limiter.check(Tier::Booking, ip).is_err());
        assert!(limiter.check(Tier::Account, ip).is_ok());
    }

    #[test]
    fn test_window_expiry_allows_again() {
        let limiter = RateLimiter::new();
        let key = (Tier::Public, test_ip(1));
        let config = tiny(1, 100);
        assert!(limiter.check_config(config, key).is_ok());
        assert!(limiter.check_config(config, key).is_err());

        sleep(Duration::from_millis(150));

        assert!(limiter.check_config(config, key).is_ok());
    }

    #[test]
    fn test_cleanup_removes_stale_entries() {
        let limiter = RateLimiter::new();
        // Account window is 60s; anything older than 2× that is stale.
        let Some(old) = Instant::now().checked_sub(Duration::from_secs(200)) else {
            return;
        };
        limiter.hits.insert((Tier::Account, test_ip(1)), vec![old]);

        limiter.cleanup();

        assert!(limiter.hits.is_empty());
    }

    #[test]
    fn test_cleanup_preserves_active_entries() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..5 {
            limiter.check(Tier::Booking, ip).unwrap();
        }

        limiter.cleanup();

        // Limit is 5 within the window; all five still count.
        assert!(limiter.check(Tier::Booking, ip).is_err());
    }
}
