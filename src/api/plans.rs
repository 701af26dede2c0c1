use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{gym_access::GymAccess, session::AppState};
use crate::error::{AppError, Result};
use crate::models::{
    payment,
    subscription::{CreateSubscriptionData, Subscription, UpdateSubscriptionData},
};
use crate::services::roles::Permission;

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    include_inactive: bool,
}

async fn list_plans(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Subscription>>> {
    GymAccess::load_active(&state, &session, gym_id, None).await?;

    let plans = Subscription::list_by_gym(&state.pool, gym_id, query.include_inactive).await?;

    Ok(Json(plans))
}

async fn create_plan(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Json(mut data): Json<CreateSubscriptionData>,
) -> Result<(StatusCode, Json<Subscription>)> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManagePlans)).await?;

    data.name = data.name.trim().to_string();
    data.validate().map_err(AppError::Validation)?;

    let plan = Subscription::create(&state.pool, gym_id, data).await?;

    tracing::info!(gym_id = %gym_id, plan_id = %plan.id, name = %plan.name, "Subscription plan created");

    Ok((StatusCode::CREATED, Json(plan)))
}

async fn get_plan(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, plan_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Subscription>> {
    GymAccess::load_active(&state, &session, gym_id, None).await?;

    let plan = Subscription::find(&state.pool, gym_id, plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription plan not found".to_string()))?;

    Ok(Json(plan))
}

/// Only descriptive fields, price and availability change; the length of a plan is fixed
async fn update_plan(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, plan_id)): Path<(Uuid, Uuid)>,
    Json(data): Json<UpdateSubscriptionData>,
) -> Result<Json<Subscription>> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManagePlans)).await?;

    if data.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(AppError::Validation("Plan name cannot be empty".to_string()));
    }
    if data.price_cents.is_some_and(|price| !payment::is_valid_price(price)) {
        return Err(AppError::Validation(format!(
            "Price must be between 0 and {} cents",
            payment::MAX_AMOUNT_CENTS
        )));
    }

    let plan = Subscription::update(&state.pool, gym_id, plan_id, data)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription plan not found".to_string()))?;

    Ok(Json(plan))
}

async fn ensure_deletable(pool: &PgPool, plan_id: Uuid) -> Result<()> {
    let assigned = Subscription::count_member_subscriptions(pool, plan_id).await?;
    if assigned > 0 {
        return Err(AppError::Conflict(format!(
            "Plan is assigned to {} member subscription(s); deactivate it instead",
            assigned
        )));
    }
    Ok(())
}

async fn delete_plan(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, plan_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManagePlans)).await?;

    Subscription::find(&state.pool, gym_id, plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription plan not found".to_string()))?;

    ensure_deletable(&state.pool, plan_id).await?;

    Subscription::delete(&state.pool, gym_id, plan_id).await?;

    tracing::info!(gym_id = %gym_id, plan_id = %plan_id, "Subscription plan deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/gyms/:gym_id/subscriptions",
            get(list_plans).post(create_plan),
        )
        .route(
            "/api/gyms/:gym_id/subscriptions/:plan_id",
            get(get_plan).put(update_plan).delete(delete_plan),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    #[tokio::test]
    async fn test_assigned_plan_cannot_be_deleted() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let gym = test_support::gym(&pool).await;
        let member = test_support::member(&pool, gym.id).await;
        let monthly = test_support::period_plan(&pool, gym.id, 30).await;

        assert!(ensure_deletable(&pool, monthly.id).await.is_ok());

        let today = test_support::today();
        test_support::member_subscription(&pool, &member, &monthly, today, Some(today), None).await;

        assert!(matches!(
            ensure_deletable(&pool, monthly.id).await,
            Err(AppError::Conflict(_))
        ));
    }
}
