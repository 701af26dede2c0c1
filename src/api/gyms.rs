use askama::Template;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{auth::get_authenticated_user, gym_access::GymAccess, session::AppState};
use crate::error::{AppError, Result};
use crate::models::gym::{CreateGymData, Gym, GymWithRole, UpdateGymData};
use crate::services::roles::Permission;

#[derive(Template)]
#[template(path = "gyms/list.html")]
struct GymListTemplate {
    email: String,
    gyms: Vec<GymWithRole>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct CreateGymForm {
    name: String,
    address: Option<String>,
    phone: Option<String>,
    currency: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Currency codes are three ASCII letters, stored upper-case
fn normalize_currency(value: Option<String>) -> std::result::Result<Option<String>, String> {
    match non_empty(value) {
        None => Ok(None),
        Some(code) if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) => {
            Ok(Some(code.to_ascii_uppercase()))
        }
        Some(code) => Err(format!("Invalid currency code: {}", code)),
    }
}

async fn list_gyms_page(State(state): State<AppState>, session: Session) -> Result<Response> {
    let user = match get_authenticated_user(&session).await {
        Ok(user) => user,
        Err(_) => return Ok(Redirect::to("/login").into_response()),
    };

    let gyms = Gym::list_for_user(&state.pool, user.user_id).await?;

    let template = GymListTemplate {
        email: user.email,
        gyms,
        error: None,
    };
    Ok(Html(template.render()?).into_response())
}

async fn create_gym(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CreateGymForm>,
) -> Result<Response> {
    let user = get_authenticated_user(&session).await?;

    let name = form.name.trim().to_string();
    let currency = normalize_currency(form.currency);

    let error = if name.is_empty() {
        Some("Gym name is required".to_string())
    } else {
        currency.as_ref().err().cloned()
    };

    if let Some(error) = error {
        let gyms = Gym::list_for_user(&state.pool, user.user_id).await?;
        let template = GymListTemplate {
            email: user.email,
            gyms,
            error: Some(error),
        };
        return Ok((StatusCode::BAD_REQUEST, Html(template.render()?)).into_response());
    }

    let gym = Gym::create_with_owner(
        &state.pool,
        CreateGymData {
            name,
            address: non_empty(form.address),
            phone: non_empty(form.phone),
            currency: currency.map_err(AppError::Validation)?,
            owner_user_id: user.user_id,
            owner_email: user.email.clone(),
            trial_days: state.config.trial_days,
        },
    )
    .await?;

    tracing::info!(gym_id = %gym.id, user_id = %user.user_id, "Gym created");

    Ok(Redirect::to(&format!("/gyms/{}", gym.id)).into_response())
}

async fn list_gyms(State(state): State<AppState>, session: Session) -> Result<Json<Vec<GymWithRole>>> {
    let user = get_authenticated_user(&session).await?;
    let gyms = Gym::list_for_user(&state.pool, user.user_id).await?;
    Ok(Json(gyms))
}

async fn get_gym(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
) -> Result<Json<Gym>> {
    let access = GymAccess::load(&state, &session, gym_id).await?;
    Ok(Json(access.gym))
}

async fn update_gym(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Json(mut data): Json<UpdateGymData>,
) -> Result<Json<Gym>> {
    let access = GymAccess::load(&state, &session, gym_id).await?;
    access.require(Permission::ManageGym)?;

    if let Some(name) = &data.name {
        if name.trim().is_empty() {
            return Err(AppError::Validation("Gym name cannot be empty".to_string()));
        }
    }
    data.currency = normalize_currency(data.currency).map_err(AppError::Validation)?;

    let gym = Gym::update(&state.pool, gym_id, data).await?;

    tracing::info!(gym_id = %gym.id, "Gym updated");

    Ok(Json(gym))
}

async fn ensure_deletable(pool: &PgPool, gym_id: Uuid) -> Result<()> {
    let (members, plans) = Gym::count_dependents(pool, gym_id).await?;
    if members > 0 || plans > 0 {
        return Err(AppError::Conflict(format!(
            "The gym still has {} member(s) and {} subscription plan(s)",
            members, plans
        )));
    }
    Ok(())
}

async fn delete_gym(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
) -> Result<StatusCode> {
    let access = GymAccess::load(&state, &session, gym_id).await?;
    access.require(Permission::ManageGym)?;

    ensure_deletable(&state.pool, gym_id).await?;

    Gym::delete(&state.pool, gym_id).await?;

    tracing::info!(gym_id = %gym_id, user_id = %access.user_id(), "Gym deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/gyms", get(list_gyms_page).post(create_gym))
        .route("/api/gyms", get(list_gyms))
        .route(
            "/api/gyms/:gym_id",
            get(get_gym).put(update_gym).delete(delete_gym),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    #[tokio::test]
    async fn test_gym_with_members_or_plans_cannot_be_deleted() {
        let Some(pool) = test_support::pool().await else {
            return;
        };

        let empty = test_support::gym(&pool).await;
        assert!(ensure_deletable(&pool, empty.id).await.is_ok());

        let with_member = test_support::gym(&pool).await;
        test_support::member(&pool, with_member.id).await;
        assert!(matches!(
            ensure_deletable(&pool, with_member.id).await,
            Err(AppError::Conflict(_))
        ));

        let with_plan = test_support::gym(&pool).await;
        test_support::period_plan(&pool, with_plan.id, 30).await;
        assert!(matches!(
            ensure_deletable(&pool, with_plan.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency(None), Ok(None));
        assert_eq!(normalize_currency(Some("  ".into())), Ok(None));
        assert_eq!(normalize_currency(Some("usd".into())), Ok(Some("USD".to_string())));
        assert!(normalize_currency(Some("EURO".into())).is_err());
        assert!(normalize_currency(Some("E1R".into())).is_err());
    }

    #[test]
    fn test_non_empty_trims() {
        assert_eq!(non_empty(Some("  Main St ".into())), Some("Main St".to_string()));
        assert_eq!(non_empty(Some("".into())), None);
    }
}
