use axum::http::HeaderMap;
use quire_core::protocol::PROTOCOL_HEADER;

use crate::error::AppError;

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

/// Reject clients older than `minimum`. A missing or unparseable version
/// header counts as outdated.
pub fn check_protocol_version(headers: &HeaderMap, minimum: u32) -> Result<u32, AppError> {
    let version = headers
        .get(PROTOCOL_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u32>().ok())
        .ok_or_else(|| AppError::client_outdated("Missing protocol version"))?;

    if version < minimum {
        return Err(AppError::client_outdated(format!(
            "protocol {version} is older than {minimum}"
        )));
    }
    Ok(version)
}
