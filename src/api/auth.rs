use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::{
    auth::{get_authenticated_user, start_user_session},
    session::AppState,
};
use crate::error::{AppError, Result};
use crate::services::auth_client::{AuthClientError, SignUpOutcome};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Template)]
#[template(path = "auth/login.html")]
struct LoginTemplate {
    email: String,
    notice: Option<String>,
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "auth/signup.html")]
struct SignupTemplate {
    email: String,
    error: Option<String>,
}

#[derive(Deserialize)]
struct CredentialsForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginQuery {
    notice: Option<String>,
}

pub fn validate_credentials(email: &str, password: &str) -> std::result::Result<(), String> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err("Please enter a valid email address".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    Ok(())
}

fn notice_text(key: &str) -> Option<String> {
    match key {
        "confirm-email" => Some("Check your inbox to confirm your email, then sign in.".to_string()),
        "signed-out" => Some("You have been signed out.".to_string()),
        _ => None,
    }
}

async fn index(session: Session) -> Redirect {
    match get_authenticated_user(&session).await {
        Ok(_) => Redirect::to("/gyms"),
        Err(_) => Redirect::to("/login"),
    }
}

async fn login_page(Query(query): Query<LoginQuery>) -> Result<Html<String>> {
    let template = LoginTemplate {
        email: String::new(),
        notice: query.notice.as_deref().and_then(notice_text),
        error: None,
    };
    Ok(Html(template.render()?))
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Result<Response> {
    let email = form.email.trim().to_lowercase();

    let auth_session = match state.auth.sign_in_with_password(&email, &form.password).await {
        Ok(auth_session) => auth_session,
        Err(AuthClientError::InvalidCredentials) => {
            tracing::info!(email = %email, "Sign-in rejected");
            let template = LoginTemplate {
                email,
                notice: None,
                error: Some("Invalid email or password".to_string()),
            };
            return Ok((StatusCode::UNAUTHORIZED, Html(template.render()?)).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    start_user_session(&session, &auth_session, &email).await?;

    tracing::info!(user_id = %auth_session.user.id, "User signed in");

    Ok(Redirect::to("/gyms").into_response())
}

async fn signup_page() -> Result<Html<String>> {
    let template = SignupTemplate {
        email: String::new(),
        error: None,
    };
    Ok(Html(template.render()?))
}

async fn signup(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Result<Response> {
    let email = form.email.trim().to_lowercase();

    let rejected = |email: String, message: String| -> Result<Response> {
        let template = SignupTemplate {
            email,
            error: Some(message),
        };
        Ok((StatusCode::BAD_REQUEST, Html(template.render()?)).into_response())
    };

    if let Err(message) = validate_credentials(&email, &form.password) {
        return rejected(email, message);
    }

    match state.auth.sign_up(&email, &form.password).await {
        Ok(SignUpOutcome::SignedIn(auth_session)) => {
            start_user_session(&session, &auth_session, &email).await?;
            tracing::info!(user_id = %auth_session.user.id, "User signed up");
            Ok(Redirect::to("/gyms").into_response())
        }
        Ok(SignUpOutcome::ConfirmationRequired(user)) => {
            tracing::info!(user_id = %user.id, "User signed up, awaiting email confirmation");
            Ok(Redirect::to("/login?notice=confirm-email").into_response())
        }
        Err(AuthClientError::Rejected(message)) => rejected(email, message),
        Err(e) => Err(AppError::from(e)),
    }
}

async fn logout(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    if let Ok(user) = get_authenticated_user(&session).await {
        if let Some(token) = user.access_token.as_deref() {
            // The local session is dropped either way
            if let Err(e) = state.auth.sign_out(token).await {
                tracing::warn!(error = %e, "Upstream sign-out failed");
            }
        }
    }

    session.flush().await?;

    Ok(Redirect::to("/login?notice=signed-out"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login_page).post(login))
        .route("/signup", get(signup_page).post(signup))
        .route("/logout", post(logout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials("coach@example.com", "longenough").is_ok());
        assert!(validate_credentials("  ", "longenough").is_err());
        assert!(validate_credentials("coach.example.com", "longenough").is_err());
        assert!(validate_credentials("coach@example.com", "short").is_err());
    }

    #[test]
    fn test_notice_text() {
        assert!(notice_text("confirm-email").is_some());
        assert!(notice_text("<script>").is_none());
    }

    #[test]
    fn test_login_template_escapes_email() {
        let html = LoginTemplate {
            email: "\"><script>".to_string(),
            notice: None,
            error: Some("Invalid email or password".to_string()),
        }
        .render()
        .unwrap();

        assert!(!html.contains("<script>"));
        assert!(html.contains("Invalid email or password"));
    }
}
