use askama::Template;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::json;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{gym_access::GymAccess, session::AppState};
use crate::error::{AppError, Result};
use crate::services::{
    billing::{self, SIGNATURE_HEADER},
    roles::Permission,
};

#[derive(Template)]
#[template(path = "gyms/billing.html")]
struct BillingTemplate {
    gym_id: Uuid,
    gym_name: String,
    billing_status: String,
    billing_period_end: String,
    can_pay: bool,
}

#[derive(Serialize)]
struct BillingSummary {
    gym_id: Uuid,
    status: String,
    period_end: DateTime<Utc>,
    active: bool,
    can_manage_billing: bool,
}

async fn billing_summary(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
) -> Result<Json<BillingSummary>> {
    let access = GymAccess::load(&state, &session, gym_id).await?;

    Ok(Json(BillingSummary {
        gym_id,
        active: access.gym.has_active_billing(Utc::now()),
        can_manage_billing: access.role.can(Permission::ManageBilling),
        status: access.gym.billing_status,
        period_end: access.gym.billing_period_end,
    }))
}

async fn billing_page(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
) -> Result<Response> {
    let access = match GymAccess::load(&state, &session, gym_id).await {
        Ok(access) => access,
        Err(AppError::Unauthorized) => return Ok(Redirect::to("/login").into_response()),
        Err(e) => return Err(e),
    };

    let template = BillingTemplate {
        gym_id,
        gym_name: access.gym.name.clone(),
        billing_status: access.gym.billing_status.clone(),
        billing_period_end: access.gym.billing_period_end.format("%Y-%m-%d").to_string(),
        can_pay: access.role.can(Permission::ManageBilling)
            && state.config.billing_checkout_url.is_some(),
    };

    Ok(Html(template.render()?).into_response())
}

/// Sends the owner to the payment provider's hosted checkout
async fn checkout(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
) -> Result<Redirect> {
    let access = GymAccess::load(&state, &session, gym_id).await?;
    access.require(Permission::ManageBilling)?;

    let base = state
        .config
        .billing_checkout_url
        .as_deref()
        .ok_or_else(|| AppError::Upstream("Billing checkout is not configured".to_string()))?;

    let url = billing::checkout_url(base, gym_id, &access.user.email)
        .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

    tracing::info!(gym_id = %gym_id, user_id = %access.user_id(), "Redirecting to billing checkout");

    Ok(Redirect::to(&url))
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let event = billing::parse_event(
        &body,
        signature,
        state.config.billing_webhook_secret.expose_secret(),
    )?;

    let gym = billing::apply_event(&state.pool, &event).await?;

    Ok(Json(json!({
        "received": true,
        "gym_id": gym.map(|g| g.id),
    })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/gyms/:gym_id/billing", get(billing_summary))
        .route("/gyms/:gym_id/billing", get(billing_page))
        .route("/gyms/:gym_id/billing/checkout", get(checkout))
        .route("/api/billing/webhook", post(webhook))
}
