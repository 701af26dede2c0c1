use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{gym_access::GymAccess, session::AppState};
use crate::api::start_of_day;
use crate::error::{AppError, Result};
use crate::models::{
    member::Member,
    member_subscription::MemberSubscription,
    payment::{self, CreatePaymentData, Payment, PaymentFilter, PaymentView},
    ticket::Ticket,
};
use crate::services::roles::Permission;

#[derive(Debug, Deserialize)]
struct ListQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    member_id: Option<Uuid>,
}

impl ListQuery {
    /// Dates are inclusive on both ends
    fn into_filter(self) -> Result<PaymentFilter> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(AppError::Validation(
                    "`from` must not be after `to`".to_string(),
                ));
            }
        }
        Ok(PaymentFilter {
            from: self.from.map(start_of_day),
            to: self.to.map(|to| start_of_day(to + Duration::days(1))),
            member_id: self.member_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RevenueQuery {
    from: NaiveDate,
    to: NaiveDate,
}

/// Money taken in a period, split by source
#[derive(Debug, Serialize)]
pub struct Revenue {
    pub subscriptions_cents: i64,
    pub sales_cents: i64,
    pub total_cents: i64,
}

pub(crate) async fn revenue_between(
    pool: &PgPool,
    gym_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Revenue> {
    let subscriptions_cents = Payment::total_between(pool, gym_id, from, to).await?;
    let sales_cents = Ticket::total_between(pool, gym_id, from, to).await?;

    Revenue::new(subscriptions_cents, sales_cents)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Revenue total overflowed")))
}

impl Revenue {
    fn new(subscriptions_cents: i64, sales_cents: i64) -> Option<Self> {
        Some(Self {
            subscriptions_cents,
            sales_cents,
            total_cents: subscriptions_cents.checked_add(sales_cents)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RecordPaymentRequest {
    member_id: Uuid,
    member_subscription_id: Option<Uuid>,
    amount_cents: i64,
    method: String,
    note: Option<String>,
    paid_at: Option<DateTime<Utc>>,
}

async fn list_payments(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PaymentView>>> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::RecordPayments)).await?;

    let payments = Payment::list(&state.pool, gym_id, query.into_filter()?).await?;

    Ok(Json(payments))
}

async fn record_payment(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<Payment>)> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::RecordPayments)).await?;

    if req.amount_cents <= 0 || req.amount_cents > payment::MAX_AMOUNT_CENTS {
        return Err(AppError::Validation(format!(
            "Amount must be between 1 and {} cents",
            payment::MAX_AMOUNT_CENTS
        )));
    }
    if !payment::is_valid_method(&req.method) {
        return Err(AppError::Validation(format!(
            "Unknown payment method: {}",
            req.method
        )));
    }

    Member::find(&state.pool, gym_id, req.member_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

    if let Some(ms_id) = req.member_subscription_id {
        let subscription = MemberSubscription::find(&state.pool, gym_id, ms_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member subscription not found".to_string()))?;
        if subscription.member_id != req.member_id {
            return Err(AppError::Validation(
                "Subscription belongs to another member".to_string(),
            ));
        }
    }

    let mut tx = state.pool.begin().await?;
    let payment = Payment::create(
        &mut tx,
        CreatePaymentData {
            gym_id,
            member_id: req.member_id,
            member_subscription_id: req.member_subscription_id,
            amount_cents: req.amount_cents,
            method: req.method,
            note: req.note.filter(|n| !n.trim().is_empty()),
            recorded_by: access.user_id(),
            paid_at: req.paid_at,
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        gym_id = %gym_id,
        payment_id = %payment.id,
        amount_cents = payment.amount_cents,
        "Payment recorded"
    );

    Ok((StatusCode::CREATED, Json(payment)))
}

/// Revenue for an inclusive date range
async fn revenue(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<Revenue>> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ViewReports)).await?;

    if query.from > query.to {
        return Err(AppError::Validation(
            "`from` must not be after `to`".to_string(),
        ));
    }

    let from = start_of_day(query.from);
    let to = start_of_day(query.to + Duration::days(1));

    Ok(Json(revenue_between(&state.pool, gym_id, from, to).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/gyms/:gym_id/payments",
            get(list_payments).post(record_payment),
        )
        .route("/api/gyms/:gym_id/revenue", get(revenue))
}
