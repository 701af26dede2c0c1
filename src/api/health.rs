use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Instant;

use crate::api::middleware::session::AppState;
use crate::services::auth_client::AuthClient;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub database: ServiceHealth,
    pub auth_api: ServiceHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    fn from_result<E: std::fmt::Display>(start: Instant, result: Result<(), E>, label: &str) -> Self {
        let response_time_ms = start.elapsed().as_millis();
        match result {
            Ok(()) => Self {
                status: "healthy".to_string(),
                response_time_ms,
                error: None,
            },
            Err(e) => Self {
                status: "unhealthy".to_string(),
                response_time_ms,
                error: Some(format!("{} error: {}", label, e)),
            },
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Health check endpoint
/// Returns 503 when the database is down; an unreachable auth API only degrades the status
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();

    let (database, auth_api) = tokio::join!(check_database(&state.pool), check_auth_api(&state.auth));

    let status_code = if database.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: overall_status(&database, &auth_api).to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dependencies: DependencyStatus { database, auth_api },
    };

    tracing::info!(
        status = %response.status,
        duration_ms = start.elapsed().as_millis(),
        "Health check completed"
    );

    (status_code, Json(response))
}

fn overall_status(database: &ServiceHealth, auth_api: &ServiceHealth) -> &'static str {
    match (database.is_healthy(), auth_api.is_healthy()) {
        (true, true) => "healthy",
        (true, false) => "degraded",
        (false, _) => "unhealthy",
    }
}

async fn check_database(pool: &PgPool) -> ServiceHealth {
    let start = Instant::now();
    let result = sqlx::query("SELECT 1").fetch_one(pool).await.map(|_| ());
    ServiceHealth::from_result(start, result, "Database")
}

async fn check_auth_api(auth: &AuthClient) -> ServiceHealth {
    let start = Instant::now();
    let result = auth.health().await;
    ServiceHealth::from_result(start, result, "Auth API")
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(healthy: bool) -> ServiceHealth {
        ServiceHealth {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            response_time_ms: 1,
            error: None,
        }
    }

    #[test]
    fn test_overall_status() {
        assert_eq!(overall_status(&service(true), &service(true)), "healthy");
        assert_eq!(overall_status(&service(true), &service(false)), "degraded");
        assert_eq!(overall_status(&service(false), &service(true)), "unhealthy");
    }

    #[tokio::test]
    async fn test_auth_api_health_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = AuthClient::new(&server.uri(), Secret::new("anon".to_string()));
        let health = check_auth_api(&client).await;

        assert!(health.is_healthy());
        assert!(health.error.is_none());
    }

    #[tokio::test]
    async fn test_auth_api_outage_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = AuthClient::new(&server.uri(), Secret::new("anon".to_string()));
        let health = check_auth_api(&client).await;

        assert!(!health.is_healthy());
        assert!(health.error.unwrap().starts_with("Auth API error"));
    }
}
