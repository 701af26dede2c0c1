use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::api::middleware::auth::AuthError;
use crate::services::{
    auth_client::AuthClientError, billing::WebhookError, check_in::CheckInError,
    enrollment::EnrollmentError,
    point_of_sale::SaleError, qr_generator::QrGenerationError, staff::StaffRuleError,
    storage::StorageError, tokens::TokenError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment required")]
    PaymentRequired,

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<AuthClientError> for AppError {
    fn from(e: AuthClientError) -> Self {
        match e {
            AuthClientError::InvalidCredentials => {
                AppError::Validation("Invalid email or password".to_string())
            }
            AuthClientError::Rejected(msg) => AppError::Validation(msg),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthorized => AppError::Unauthorized,
            AuthError::SessionError => {
                AppError::Internal(anyhow::anyhow!("Failed to read the session"))
            }
        }
    }
}

impl From<EnrollmentError> for AppError {
    fn from(e: EnrollmentError) -> Self {
        match e {
            EnrollmentError::MemberNotFound | EnrollmentError::PlanNotFound => {
                AppError::NotFound(e.to_string())
            }
            EnrollmentError::Overlap { .. } => AppError::Conflict(e.to_string()),
            EnrollmentError::PlanInactive
            | EnrollmentError::NothingToRenew
            | EnrollmentError::OpenEnded
            | EnrollmentError::InvalidPeriod
            | EnrollmentError::InvalidPayment(_) => AppError::Validation(e.to_string()),
            EnrollmentError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<SaleError> for AppError {
    fn from(e: SaleError) -> Self {
        match e {
            SaleError::ProductNotFound(_) | SaleError::MemberNotFound(_) => {
                AppError::NotFound(e.to_string())
            }
            SaleError::InsufficientStock { .. } => AppError::Conflict(e.to_string()),
            SaleError::Database(e) => AppError::Database(e),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<CheckInError> for AppError {
    fn from(e: CheckInError) -> Self {
        match e {
            CheckInError::MemberNotFound => AppError::NotFound(e.to_string()),
            CheckInError::Database(e) => AppError::Database(e),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<StaffRuleError> for AppError {
    fn from(e: StaffRuleError) -> Self {
        AppError::Forbidden(e.to_string())
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::MissingSignature | WebhookError::InvalidSignature(_) => {
                tracing::warn!(error = %e, "Rejected billing webhook");
                AppError::Unauthorized
            }
            WebhookError::Malformed(_) => AppError::Validation(e.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        AppError::Internal(anyhow::Error::new(e))
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::Upstream(e.to_string())
    }
}

impl From<QrGenerationError> for AppError {
    fn from(e: QrGenerationError) -> Self {
        AppError::Internal(anyhow::Error::new(e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_debug = format!("{:?}", self);

        let (status, error_message) = match self {
            AppError::Database(sqlx::Error::RowNotFound) => {
                (StatusCode::NOT_FOUND, "Record not found".to_string())
            }
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::PaymentRequired => (
                StatusCode::PAYMENT_REQUIRED,
                "The gym subscription has expired".to_string(),
            ),
            AppError::Upstream(msg) => {
                tracing::warn!(error = %msg, "Upstream service error");
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::Session(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session error".to_string(),
            ),
            AppError::Template(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_debug,
            "message": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("gym".into()), StatusCode::NOT_FOUND),
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT),
            (AppError::PaymentRequired, StatusCode::PAYMENT_REQUIRED),
            (
                AppError::Database(sqlx::Error::RowNotFound),
                StatusCode::NOT_FOUND,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_invalid_credentials_maps_to_validation() {
        let error: AppError = AuthClientError::InvalidCredentials.into();
        assert!(matches!(error, AppError::Validation(_)));
    }
}
