use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use uuid::Uuid;

use super::session::{SESSION_KEY_ACCESS_TOKEN, SESSION_KEY_EMAIL, SESSION_KEY_USER_ID};
use crate::services::auth_client::AuthSession;

/// Authentication error responses
#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
    SessionError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required. Please log in.",
            )
                .into_response(),
            AuthError::SessionError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Session error occurred.").into_response()
            }
        }
    }
}

/// Middleware that requires the user to be authenticated
pub async fn require_auth(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user_id: Option<Uuid> = session
        .get(SESSION_KEY_USER_ID)
        .await
        .map_err(|_| AuthError::SessionError)?;

    if user_id.is_none() {
        return Err(AuthError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Identity of the signed-in user, as issued by the hosted auth API
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: Option<String>,
}

/// Extracts the authenticated user from the session
pub async fn get_authenticated_user(session: &Session) -> Result<AuthenticatedUser, AuthError> {
    let user_id: Uuid = session
        .get(SESSION_KEY_USER_ID)
        .await
        .map_err(|_| AuthError::SessionError)?
        .ok_or(AuthError::Unauthorized)?;

    let email: String = session
        .get(SESSION_KEY_EMAIL)
        .await
        .map_err(|_| AuthError::SessionError)?
        .unwrap_or_default();

    let access_token: Option<String> = session
        .get(SESSION_KEY_ACCESS_TOKEN)
        .await
        .map_err(|_| AuthError::SessionError)?;

    Ok(AuthenticatedUser {
        user_id,
        email,
        access_token,
    })
}

/// Stores a fresh auth session, rotating the session id first
pub async fn start_user_session(
    session: &Session,
    auth: &AuthSession,
    fallback_email: &str,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(SESSION_KEY_USER_ID, auth.user.id).await?;
    session
        .insert(
            SESSION_KEY_EMAIL,
            auth.user.email.clone().unwrap_or_else(|| fallback_email.to_string()),
        )
        .await?;
    session
        .insert(SESSION_KEY_ACCESS_TOKEN, auth.access_token.clone())
        .await?;
    Ok(())
}
