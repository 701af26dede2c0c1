use axum::{extract::State, http::HeaderMap, routing::get, Json, Router};
use chrono::Utc;
use ring::constant_time::verify_slices_are_equal;
use secrecy::ExposeSecret;

use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::jobs::subscription_expiry::{self, ExpiryStats};

/// Checks `Authorization: Bearer <CRON_SECRET>`
fn authorize(headers: &HeaderMap, secret: &str) -> Result<()> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    verify_slices_are_equal(token.trim().as_bytes(), secret.as_bytes())
        .map_err(|_| AppError::Unauthorized)
}

/// Runs the expiry sweep on demand for an external scheduler
async fn expire_subscriptions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ExpiryStats>> {
    if let Err(e) = authorize(&headers, state.config.cron_secret.expose_secret()) {
        tracing::warn!("Rejected cron request with missing or invalid secret");
        return Err(e);
    }

    let stats = subscription_expiry::expire_subscriptions(&state.pool, Utc::now()).await?;

    Ok(Json(stats))
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/cron/expire-subscriptions",
        get(expire_subscriptions).post(expire_subscriptions),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use axum::{body::Body, http::Request, http::StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    fn app() -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/gymdesk_test")
            .unwrap();
        router().with_state(AppState::new(pool, test_config()))
    }

    #[test]
    fn test_authorize() {
        let mut headers = HeaderMap::new();
        assert!(authorize(&headers, "s3cret").is_err());

        headers.insert("authorization", "Bearer wrong".parse().unwrap());
        assert!(authorize(&headers, "s3cret").is_err());

        headers.insert("authorization", "Basic s3cret".parse().unwrap());
        assert!(authorize(&headers, "s3cret").is_err());

        headers.insert("authorization", "Bearer s3cret".parse().unwrap());
        assert!(authorize(&headers, "s3cret").is_ok());
    }

    #[tokio::test]
    async fn test_cron_without_secret_is_unauthorized() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/cron/expire-subscriptions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cron_with_wrong_secret_is_unauthorized() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/cron/expire-subscriptions")
                    .header("authorization", "Bearer not-the-cron-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
