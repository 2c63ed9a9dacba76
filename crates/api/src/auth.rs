use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::attempts::client_fingerprint;
use crate::{ApiError, AppState};

/// API key from `X-Api-Key` or an `Authorization: Bearer` header.
fn presented_key(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let from_bearer = || {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    from_header.or_else(from_bearer).map(str::to_string)
}

/// Compare digests so the comparison time does not depend on the key prefix.
fn key_matches(presented: &str, configured: &[String]) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    configured
        .iter()
        .filter(|key| !key.is_empty())
        .fold(false, |found, key| found | (Sha256::digest(key.as_bytes()) == presented))
}

fn reject(status: StatusCode, message: &str, detail: &str) -> (StatusCode, axum::Json<ApiError>) {
    (status, axum::Json(ApiError::new(message, detail)))
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, axum::Json<ApiError>)> {
    let fingerprint = client_fingerprint(request.headers());

    if state.attempts.is_blocked(&fingerprint) {
        tracing::warn!(fingerprint = %&fingerprint[..12], "admin access blocked after repeated failures");
        return Err(reject(
            StatusCode::TOO_MANY_REQUESTS,
            "too_many_attempts",
            "Too many failed attempts, try again later",
        ));
    }

    let Some(api_key) = presented_key(request.headers()) else {
        state.attempts.record_failure(&fingerprint);
        return Err(reject(
            StatusCode::UNAUTHORIZED,
            "missing_api_key",
            "X-Api-Key header is required",
        ));
    };

    if !key_matches(&api_key, &state.config.admin_api_keys) {
        let failures = state.attempts.record_failure(&fingerprint);
        tracing::warn!(failures, "invalid admin api key");
        return Err(reject(
            StatusCode::UNAUTHORIZED,
            "invalid_api_key",
            "API key is invalid",
        ));
    }

    state.attempts.reset(&fingerprint);
    Ok(next.run(request).await)
}
