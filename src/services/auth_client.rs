//! Client for the hosted auth API.
//!
//! Sign-up, password sign-in, user lookup and sign-out are delegated to the
//! platform; this service only keeps the resulting identity in its session.

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum AuthClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Rejected(String),

    #[error("Auth API error (status {status}): {message}")]
    ApiError { status: StatusCode, message: String },

    #[error("Unexpected auth API response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

/// Sign-up either logs the user in right away or waits for email confirmation
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    ConfirmationRequired(AuthUser),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(AuthSession),
    User(AuthUser),
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ApiErrorBody {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.error_description)
            .or(self.message)
            .or(self.error)
    }
}

#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    base_url: String,
    api_key: Secret<String>,
}

impl AuthClient {
    pub fn new(base_url: &str, api_key: Secret<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthClientError> {
        let response = self
            .http
            .post(format!("{}/signup", self.base_url))
            .header("apikey", self.api_key.expose_secret())
            .json(&Credentials { email, password })
            .send()
            .await?;

        let response = Self::check_status(response).await?;

        let body: SignUpResponse = response
            .json()
            .await
            .map_err(|e| AuthClientError::InvalidResponse(e.to_string()))?;

        Ok(match body {
            SignUpResponse::Session(session) => SignUpOutcome::SignedIn(session),
            SignUpResponse::User(user) => SignUpOutcome::ConfirmationRequired(user),
        })
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession, AuthClientError> {
        let response = self
            .http
            .post(format!("{}/token", self.base_url))
            .query(&[("grant_type", "password")])
            .header("apikey", self.api_key.expose_secret())
            .json(&Credentials { email, password })
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        ) {
            return Err(AuthClientError::InvalidCredentials);
        }

        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| AuthClientError::InvalidResponse(e.to_string()))
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), AuthClientError> {
        let response = self
            .http
            .post(format!("{}/logout", self.base_url))
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    /// Reachability check for the health endpoint
    pub async fn health(&self) -> Result<(), AuthClientError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .header("apikey", self.api_key.expose_secret())
            .timeout(std::time::Duration::from_secs(3))
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AuthClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(ApiErrorBody::into_message)
            .unwrap_or_else(|| body.clone());

        tracing::warn!(status = %status, error = %message, "Auth API request failed");

        if status == StatusCode::UNPROCESSABLE_ENTITY || status == StatusCode::BAD_REQUEST {
            return Err(AuthClientError::Rejected(message));
        }

        Err(AuthClientError::ApiError { status, message })
    }
}
