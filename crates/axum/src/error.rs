// HTTP error responses for authentication failures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gatehouse_core::AuthError;
use serde::Serialize;

/// Authentication error rendered as `{"error": "..."}`
#[derive(Debug, Clone, Serialize)]
pub struct HttpAuthError {
    pub error: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl HttpAuthError {
    pub fn unauthorized(message: &str) -> Self {
        Self {
            error: message.to_string(),
            status: StatusCode::UNAUTHORIZED,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self {
            error: message.to_string(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    pub fn internal(message: &str) -> Self {
        Self {
            error: message.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpAuthError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<AuthError> for HttpAuthError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Unauthenticated { .. } => Self::unauthorized("Authentication required"),
            AuthError::InvalidToken(_) | AuthError::TokenExpired => {
                Self::unauthorized("Invalid or expired token")
            }
            AuthError::Configuration(msg) => {
                tracing::error!("Authentication misconfigured: {}", msg);
                Self::internal("Authentication is misconfigured")
            }
            other => {
                tracing::error!("Authentication failed: {}", other);
                Self::internal("Internal server error")
            }
        }
    }
}
