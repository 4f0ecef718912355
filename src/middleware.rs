use std::net::SocketAddr;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::errors::AppError;
use crate::models::AuditInfo;
use crate::services::rate_limit::RateDecision;
use crate::state::AppState;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Client address: last `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer, else `"unknown"`.
///
/// One trusted proxy sits in front of the service. Only the hop it appended
/// is trusted; anything before it came from the client.
pub fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Who made the request, recorded on every booking.
pub struct ClientMeta(pub AuditInfo);

#[async_trait]
impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = client_ip(&parts.headers, parts.extensions.get());
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Ok(Self(AuditInfo {
            ip_address: (ip != "unknown").then_some(ip),
            user_agent,
        }))
    }
}

/// Fixed-window limit per client IP over the `/api` routes.
pub async fn rate_limit(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let ip = client_ip(req.headers(), req.extensions().get());

    let (limit, remaining, reset_after) = match state.rate_limiter.check(&ip).await {
        RateDecision::Bypassed => return next.run(req).await,
        RateDecision::Allowed {
            limit,
            remaining,
            reset_after,
        } => (limit, remaining, reset_after),
        RateDecision::Limited { limit, retry_after } => {
            let mut response = AppError::RateLimited {
                limit,
                retry_after_secs: retry_after.as_secs(),
            }
            .into_response();
            insert_limit_headers(response.headers_mut(), limit, 0, retry_after);
            return response;
        }
    };

    let mut response = next.run(req).await;
    insert_limit_headers(response.headers_mut(), limit, remaining, reset_after);
    response
}

fn insert_limit_headers(
    headers: &mut HeaderMap,
    limit: u64,
    remaining: u64,
    reset_after: std::time::Duration,
) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));

    let reset_at = chrono::Duration::from_std(reset_after)
        .ok()
        .and_then(|d| chrono::Utc::now().checked_add_signed(d));
    if let Some(reset_at) = reset_at {
        let value = reset_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(RATE_LIMIT_RESET, value);
        }
    }
}
