use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

use crate::{auth::AuthError, registration::RegistrationError};

pub(crate) const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub(crate) const INVALID_REFRESH_TOKEN: &str = "Invalid or expired refresh token";

#[derive(Debug)]
pub struct ErrorResponse {
    status: StatusCode,
    message: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub(crate) fn registration_error(error: RegistrationError) -> ErrorResponse {
    match error {
        RegistrationError::Validation(message) => {
            ErrorResponse::new(StatusCode::BAD_REQUEST, message)
        }
        RegistrationError::Conflict => ErrorResponse::new(
            StatusCode::CONFLICT,
            "Handle or email is already in use",
        ),
        RegistrationError::Upload(source) => {
            error!(?source, "media upload failed during registration");
            ErrorResponse::new(StatusCode::BAD_GATEWAY, "Media upload failed")
        }
        RegistrationError::Password(source) => {
            error!(?source, "password hashing failed during registration");
            ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
        RegistrationError::Store(source) => {
            error!(?source, "account persistence failed during registration");
            ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
        RegistrationError::InconsistentRead => {
            ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
    }
}

/// Login failures for missing accounts and wrong passwords share one 401 so
/// the response does not reveal which identifiers exist.
pub(crate) fn login_error(error: AuthError) -> ErrorResponse {
    match error {
        AuthError::NotFound | AuthError::InvalidCredentials => {
            ErrorResponse::new(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS)
        }
        AuthError::Store(source) => {
            error!(?source, "account lookup failed during login");
            ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
        other => {
            error!(?other, "login failed");
            ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

pub(crate) fn refresh_error(error: AuthError) -> ErrorResponse {
    match error {
        AuthError::Jwt(source) => {
            warn!(?source, "refresh token rejected");
            ErrorResponse::new(StatusCode::UNAUTHORIZED, INVALID_REFRESH_TOKEN)
        }
        AuthError::NotFound | AuthError::Unauthorized => {
            ErrorResponse::new(StatusCode::UNAUTHORIZED, INVALID_REFRESH_TOKEN)
        }
        AuthError::Store(source) => {
            error!(?source, "session lookup failed during refresh");
            ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
        other => {
            error!(?other, "token refresh failed");
            ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
