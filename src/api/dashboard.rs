use askama::Template;
use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{gym_access::GymAccess, session::AppState};
use crate::api::payments::{revenue_between, Revenue};
use crate::api::{day_range, month_range};
use crate::error::{AppError, Result};
use crate::models::{
    check_in::CheckIn, member::Member, member_subscription::MemberSubscription,
    member_subscription::MemberSubscriptionView, product::Product,
};
use crate::services::roles::Permission;

const EXPIRING_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub member_count: i64,
    pub active_members: i64,
    pub check_ins_today: i64,
    pub expiring: Vec<MemberSubscriptionView>,
    pub low_stock: Vec<Product>,
}

#[derive(Serialize)]
struct DashboardResponse {
    gym_id: Uuid,
    role: String,
    #[serde(flatten)]
    stats: DashboardStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    revenue_this_month: Option<Revenue>,
}

#[derive(Template)]
#[template(path = "gyms/dashboard.html")]
struct DashboardTemplate {
    gym_id: Uuid,
    gym_name: String,
    role: String,
    billing_period_end: String,
    stats: DashboardStats,
    revenue: Option<String>,
    expiring_window_days: i64,
}

/// Formats an amount in cents, e.g. `1250` in EUR as `12.50 EUR`
pub fn format_money(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02} {}", sign, abs / 100, abs % 100, currency)
}

/// Last day of the expiring window, which starts today
fn expiring_until(today: NaiveDate) -> NaiveDate {
    today + Duration::days(EXPIRING_WINDOW_DAYS - 1)
}

async fn load_stats(pool: &PgPool, gym_id: Uuid, today: NaiveDate) -> Result<DashboardStats> {
    let (day_start, day_end) = day_range(today);

    Ok(DashboardStats {
        member_count: Member::count_by_gym(pool, gym_id).await?,
        active_members: MemberSubscription::count_active(pool, gym_id, today).await?,
        check_ins_today: CheckIn::count_between(pool, gym_id, day_start, day_end).await?,
        expiring: MemberSubscription::list_expiring(
            pool,
            gym_id,
            today,
            expiring_until(today),
        )
        .await?,
        low_stock: Product::list_low_stock(pool, gym_id).await?,
    })
}

async fn load_revenue(pool: &PgPool, gym_id: Uuid, today: NaiveDate) -> Result<Revenue> {
    let (from, to) = month_range(today);
    revenue_between(pool, gym_id, from, to).await
}

/// Dashboard page; gyms without an active subscription are sent to billing
async fn dashboard_page(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
) -> Result<Response> {
    let access = match GymAccess::load(&state, &session, gym_id).await {
        Ok(access) => access,
        Err(AppError::Unauthorized) => return Ok(Redirect::to("/login").into_response()),
        Err(e) => return Err(e),
    };

    if access.require_active_billing().is_err() {
        return Ok(Redirect::to(&format!("/gyms/{}/billing", gym_id)).into_response());
    }

    let today = Utc::now().date_naive();
    let stats = load_stats(&state.pool, gym_id, today).await?;

    let revenue = if access.role.can(Permission::ViewReports) {
        let revenue = load_revenue(&state.pool, gym_id, today).await?;
        Some(format_money(revenue.total_cents, &access.gym.currency))
    } else {
        None
    };

    let template = DashboardTemplate {
        gym_id,
        gym_name: access.gym.name.clone(),
        role: access.role.to_string(),
        billing_period_end: access.gym.billing_period_end.format("%Y-%m-%d").to_string(),
        stats,
        revenue,
        expiring_window_days: EXPIRING_WINDOW_DAYS,
    };

    Ok(Html(template.render()?).into_response())
}

async fn dashboard_json(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
) -> Result<Json<DashboardResponse>> {
    let access = GymAccess::load_active(&state, &session, gym_id, None).await?;

    let today = Utc::now().date_naive();
    let stats = load_stats(&state.pool, gym_id, today).await?;

    let revenue_this_month = if access.role.can(Permission::ViewReports) {
        Some(load_revenue(&state.pool, gym_id, today).await?)
    } else {
        None
    };

    Ok(Json(DashboardResponse {
        gym_id,
        role: access.role.to_string(),
        stats,
        revenue_this_month,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/gyms/:gym_id", get(dashboard_page))
        .route("/api/gyms/:gym_id/dashboard", get(dashboard_json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiring_window_covers_seven_days() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let until = expiring_until(today);

        assert_eq!(until, NaiveDate::from_ymd_opt(2025, 3, 7).unwrap());
        assert_eq!((until - today).num_days() + 1, EXPIRING_WINDOW_DAYS);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0, "EUR"), "0.00 EUR");
        assert_eq!(format_money(1250, "EUR"), "12.50 EUR");
        assert_eq!(format_money(5, "USD"), "0.05 USD");
        assert_eq!(format_money(-1999, "EUR"), "-19.99 EUR");
    }

    #[test]
    fn test_dashboard_template_hides_revenue_without_permission() {
        let html = DashboardTemplate {
            gym_id: Uuid::new_v4(),
            gym_name: "Iron Temple".to_string(),
            role: "staff".to_string(),
            billing_period_end: "2025-01-31".to_string(),
            stats: DashboardStats {
                member_count: 12,
                active_members: 9,
                check_ins_today: 4,
                expiring: Vec::new(),
                low_stock: Vec::new(),
            },
            revenue: None,
            expiring_window_days: EXPIRING_WINDOW_DAYS,
        }
        .render()
        .unwrap();

        assert!(html.contains("Iron Temple"));
        assert!(!html.contains("Revenue this month"));
    }
}
