use axum::http::{header, HeaderMap};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::AppError;
use crate::models::Role;

type HmacSha256 = Hmac<Sha256>;

/// Current actor-token format version.
const TOKEN_VERSION: &str = "v1";

/// Maximum age of a token before it is considered expired (24 hours).
const MAX_TOKEN_AGE_SECS: i64 = 86400;

/// The authenticated identity the gateway attaches to every request.
/// Handlers receive it explicitly; the core keeps no ambient user state.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

/// Sign an actor token: `v1:<user_id>:<role>:<issued_at>:<hex sig>` where
/// the signature is HMAC-SHA256 over the preceding fields with the shared
/// gateway secret. The gateway issues these; tests use this too.
pub fn sign_actor_token(user_id: &str, role: Role, issued_at: i64, secret: &str) -> String {
    let payload = format!("{TOKEN_VERSION}:{user_id}:{}:{issued_at}", role.as_str());
    let sig = sign(&payload, secret);
    format!("{payload}:{sig}")
}

fn sign(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Validate a token's signature and freshness and extract the actor.
pub fn verify_actor_token(token: &str, secret: &str) -> Option<Actor> {
    let (payload, sig) = token.rsplit_once(':')?;
    if sign(payload, secret) != sig {
        tracing::warn!("actor token signature mismatch");
        return None;
    }

    let mut parts = payload.split(':');
    if parts.next()? != TOKEN_VERSION {
        return None;
    }
    let user_id = parts.next()?;
    let role = Role::parse(parts.next()?)?;
    let issued_at: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || user_id.is_empty() {
        return None;
    }

    let now = chrono::Utc::now().timestamp();
    if (now - issued_at) > MAX_TOKEN_AGE_SECS {
        tracing::warn!("actor token expired: issued_at={}, age={}s", issued_at, now - issued_at);
        return None;
    }

    Some(Actor {
        user_id: user_id.to_string(),
        role,
    })
}

/// Extract the actor from the Authorization header.
/// Header format: `Bearer <token>`
pub fn extract_actor_from_header(auth_header: &str, secret: &str) -> Option<Actor> {
    let token = auth_header.strip_prefix("Bearer ")?;
    verify_actor_token(token, secret)
}

pub fn require_actor(headers: &HeaderMap, secret: &str) -> Result<Actor, AppError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    extract_actor_from_header(header, secret).ok_or(AppError::Unauthorized)
}

pub fn require_role(actor: &Actor, role: Role) -> Result<(), AppError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

// ── Tests ──
