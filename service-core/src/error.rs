use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-level error taxonomy shared by every service.
///
/// Each variant maps to one HTTP status category; the boundary serializes
/// errors into the uniform `{success, message, errors?}` envelope so no raw
/// internal detail escapes beyond the message text.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation error")]
    ValidationErrors(#[from] validator::ValidationErrors),

    #[error("Forbidden: {0}")]
    Ownership(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Invalid signature: {0}")]
    Signature(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorEnvelope {
            success: bool,
            message: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            errors: Option<serde_json::Value>,
        }

        let (status, message, errors) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::ValidationErrors(errs) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                serde_json::to_value(&errs).ok(),
            ),
            AppError::Ownership(msg) => (StatusCode::FORBIDDEN, msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::InvalidState(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Gateway(msg) => (StatusCode::BAD_GATEWAY, msg, None),
            AppError::Signature(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                )
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        (
            status,
            Json(ErrorEnvelope {
                success: false,
                message,
                errors,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_client_statuses() {
        let cases = [
            (
                AppError::Validation("amount must be positive".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Ownership("not your charge".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::NotFound("charge not found".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::InvalidState("only pending payments can be confirmed".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Gateway("provider timeout".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::Signature("signature mismatch".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn internal_errors_hide_detail() {
        let response =
            AppError::Internal(anyhow::anyhow!("connection pool exhausted")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
