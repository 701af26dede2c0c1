use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::day_range;
use crate::api::middleware::{gym_access::GymAccess, session::AppState};
use crate::error::{AppError, Result};
use crate::models::check_in::{CheckIn, CheckInView};
use crate::services::{
    check_in::{self, CheckInOutcome},
    roles::Permission,
};

/// Either a scanned badge or a member picked by hand at the desk
#[derive(Debug, Deserialize)]
struct CheckInRequest {
    badge: Option<String>,
    member_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct ListQuery {
    date: Option<NaiveDate>,
}

async fn check_in(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Json(req): Json<CheckInRequest>,
) -> Result<Json<CheckInOutcome>> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageMembers)).await?;
    let today = Utc::now().date_naive();

    let outcome = match (req.badge.as_deref(), req.member_id) {
        (Some(badge), _) if !badge.trim().is_empty() => {
            check_in::check_in_with_badge(
                &state.pool,
                gym_id,
                access.user_id(),
                badge,
                &state.badge_key,
                today,
            )
            .await?
        }
        (_, Some(member_id)) => {
            check_in::check_in_member(&state.pool, gym_id, access.user_id(), member_id, today).await?
        }
        _ => {
            return Err(AppError::Validation(
                "Provide either a badge or a member_id".to_string(),
            ))
        }
    };

    tracing::info!(
        gym_id = %gym_id,
        member_id = %outcome.member.id,
        allowed = outcome.allowed,
        "Check-in attempt"
    );

    Ok(Json(outcome))
}

async fn list_check_ins(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CheckInView>>> {
    GymAccess::load_active(&state, &session, gym_id, None).await?;

    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let (from, to) = day_range(date);
    let check_ins = CheckIn::list_between(&state.pool, gym_id, from, to).await?;

    Ok(Json(check_ins))
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/gyms/:gym_id/check-ins",
        get(list_check_ins).post(check_in),
    )
}
