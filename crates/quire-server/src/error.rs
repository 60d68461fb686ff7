use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use quire_core::protocol::ErrorBody;
use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Client outdated: {0}")]
    ClientOutdated(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn client_outdated(message: impl Into<String>) -> Self {
        Self::ClientOutdated(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::ClientOutdated(_) => "client_outdated",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<EngineError> for AppError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Unauthorized => Self::unauthorized("Unknown client token"),
            EngineError::InvalidInput(message) => Self::BadRequest(message),
            EngineError::Sqlite(error) => {
                tracing::error!(%error, "Merge engine database failure");
                Self::internal("storage failure")
            }
            EngineError::Io(error) => {
                tracing::error!(%error, "Merge engine IO failure");
                Self::internal("storage failure")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ClientOutdated(_) => StatusCode::UPGRADE_REQUIRED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
            kind: Some(self.kind().to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_statuses() {
        let response = AppError::from(EngineError::Unauthorized).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AppError::from(EngineError::InvalidInput("empty".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::client_outdated("protocol 0").into_response();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    }
}
