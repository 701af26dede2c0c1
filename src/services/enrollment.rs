//! Granting subscriptions to members.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    member::Member,
    member_subscription::{CreateMemberSubscriptionData, MemberSubscription},
    payment::{self, CreatePaymentData, Payment},
    subscription::Subscription,
};

#[derive(thiserror::Error, Debug)]
pub enum EnrollmentError {
    #[error("Member not found")]
    MemberNotFound,

    #[error("Subscription plan not found")]
    PlanNotFound,

    #[error("Subscription plan is no longer offered")]
    PlanInactive,

    #[error("Member has no previous subscription to renew")]
    NothingToRenew,

    #[error("Open-ended session packs cannot be renewed; assign a new one instead")]
    OpenEnded,

    #[error("Subscription period falls outside the supported calendar")]
    InvalidPeriod,

    #[error("Member already has an active subscription for this period (until {until})")]
    Overlap { until: String },

    #[error("Invalid payment: {0}")]
    InvalidPayment(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitialPayment {
    pub amount_cents: i64,
    pub method: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignRequest {
    pub subscription_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub payment: Option<InitialPayment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    pub subscription: MemberSubscription,
    pub payment: Option<Payment>,
}

impl InitialPayment {
    pub fn validate(&self) -> Result<(), EnrollmentError> {
        if self.amount_cents <= 0 || self.amount_cents > payment::MAX_AMOUNT_CENTS {
            return Err(EnrollmentError::InvalidPayment(format!(
                "Amount must be between 1 and {} cents",
                payment::MAX_AMOUNT_CENTS
            )));
        }
        if !payment::is_valid_method(&self.method) {
            return Err(EnrollmentError::InvalidPayment(format!(
                "Unknown payment method: {}",
                self.method
            )));
        }
        Ok(())
    }
}

/// A renewal starts the day after the latest period ends, or today when
/// that period is already over.
pub fn renewal_start(latest_end: NaiveDate, today: NaiveDate) -> NaiveDate {
    latest_end
        .succ_opt()
        .filter(|next| *next > today)
        .unwrap_or(today)
}

pub async fn assign(
    pool: &PgPool,
    gym_id: Uuid,
    member_id: Uuid,
    recorded_by: Uuid,
    request: AssignRequest,
    today: NaiveDate,
) -> Result<Enrollment, EnrollmentError> {
    let enrollment = enroll(pool, gym_id, member_id, recorded_by, request, today).await?;

    tracing::info!(
        gym_id = %gym_id,
        member_id = %member_id,
        member_subscription_id = %enrollment.subscription.id,
        start_date = %enrollment.subscription.start_date,
        "Subscription assigned"
    );

    Ok(enrollment)
}

async fn enroll(
    pool: &PgPool,
    gym_id: Uuid,
    member_id: Uuid,
    recorded_by: Uuid,
    request: AssignRequest,
    today: NaiveDate,
) -> Result<Enrollment, EnrollmentError> {
    if let Some(payment) = &request.payment {
        payment.validate()?;
    }

    Member::find(pool, gym_id, member_id)
        .await?
        .ok_or(EnrollmentError::MemberNotFound)?;

    let plan = Subscription::find(pool, gym_id, request.subscription_id)
        .await?
        .ok_or(EnrollmentError::PlanNotFound)?;

    if !plan.is_active {
        return Err(EnrollmentError::PlanInactive);
    }

    let period = plan
        .period_starting(request.start_date.unwrap_or(today))
        .ok_or(EnrollmentError::InvalidPeriod)?;

    let mut tx = pool.begin().await?;

    if let Some(existing) =
        MemberSubscription::find_overlapping(&mut tx, member_id, period.start_date, period.end_date).await?
    {
        return Err(EnrollmentError::Overlap {
            until: existing
                .end_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "sessions are used up".to_string()),
        });
    }

    let subscription = MemberSubscription::create(
        &mut tx,
        CreateMemberSubscriptionData {
            gym_id,
            member_id,
            subscription_id: plan.id,
            start_date: period.start_date,
            end_date: period.end_date,
            sessions_remaining: period.sessions,
        },
    )
    .await?;

    let payment = match request.payment {
        Some(initial) => Some(
            Payment::create(
                &mut tx,
                CreatePaymentData {
                    gym_id,
                    member_id,
                    member_subscription_id: Some(subscription.id),
                    amount_cents: initial.amount_cents,
                    method: initial.method,
                    note: initial.note,
                    recorded_by,
                    paid_at: None,
                },
            )
            .await?,
        ),
        None => None,
    };

    tx.commit().await?;

    Ok(Enrollment {
        subscription,
        payment,
    })
}

/// Starts a new period of the member's latest plan right after the current one
pub async fn renew(
    pool: &PgPool,
    gym_id: Uuid,
    member_id: Uuid,
    recorded_by: Uuid,
    payment: Option<InitialPayment>,
    today: NaiveDate,
) -> Result<Enrollment, EnrollmentError> {
    let latest = MemberSubscription::find_latest(pool, gym_id, member_id)
        .await?
        .ok_or(EnrollmentError::NothingToRenew)?;

    let latest_end = latest.end_date.ok_or(EnrollmentError::OpenEnded)?;
    let start_date = renewal_start(latest_end, today);

    let enrollment = enroll(
        pool,
        gym_id,
        member_id,
        recorded_by,
        AssignRequest {
            subscription_id: latest.subscription_id,
            start_date: Some(start_date),
            payment,
        },
        today,
    )
    .await?;

    tracing::info!(
        gym_id = %gym_id,
        member_id = %member_id,
        member_subscription_id = %enrollment.subscription.id,
        start_date = %enrollment.subscription.start_date,
        "Subscription renewed"
    );

    Ok(enrollment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{self, days_ago};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn assign_request(subscription_id: Uuid, start_date: Option<NaiveDate>) -> AssignRequest {
        AssignRequest {
            subscription_id,
            start_date,
            payment: None,
        }
    }

    #[test]
    fn test_renewal_continues_running_period() {
        let today = date(2025, 1, 20);
        assert_eq!(renewal_start(date(2025, 1, 31), today), date(2025, 2, 1));
    }

    #[test]
    fn test_renewal_after_lapse_starts_today() {
        let today = date(2025, 3, 5);
        assert_eq!(renewal_start(date(2025, 1, 31), today), today);
    }

    #[test]
    fn test_renewal_ending_today_starts_tomorrow() {
        let today = date(2025, 1, 31);
        assert_eq!(renewal_start(today, today), date(2025, 2, 1));
    }

    #[test]
    fn test_renewal_at_end_of_calendar_starts_today() {
        let today = date(2025, 1, 31);
        assert_eq!(renewal_start(NaiveDate::MAX, today), today);
    }

    #[test]
    fn test_initial_payment_validation() {
        let ok = InitialPayment {
            amount_cents: 3000,
            method: "card".to_string(),
            note: None,
        };
        assert!(ok.validate().is_ok());

        let zero = InitialPayment {
            amount_cents: 0,
            ..ok.clone()
        };
        assert!(zero.validate().is_err());

        let huge = InitialPayment {
            amount_cents: payment::MAX_AMOUNT_CENTS + 1,
            ..ok.clone()
        };
        assert!(huge.validate().is_err());

        let unknown = InitialPayment {
            method: "iou".to_string(),
            ..ok
        };
        assert!(unknown.validate().is_err());
    }

    #[tokio::test]
    async fn test_overlapping_assignment_is_refused() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let today = test_support::today();
        let gym = test_support::gym(&pool).await;
        let member = test_support::member(&pool, gym.id).await;
        let monthly = test_support::period_plan(&pool, gym.id, 30).await;
        let owner = Uuid::new_v4();

        let first = assign(&pool, gym.id, member.id, owner, assign_request(monthly.id, None), today)
            .await
            .unwrap();
        let end = first.subscription.end_date.unwrap();

        let overlapping = assign(
            &pool,
            gym.id,
            member.id,
            owner,
            assign_request(monthly.id, Some(end)),
            today,
        )
        .await;
        assert!(matches!(overlapping, Err(EnrollmentError::Overlap { .. })));

        let following = assign(
            &pool,
            gym.id,
            member.id,
            owner,
            assign_request(monthly.id, end.succ_opt()),
            today,
        )
        .await
        .unwrap();
        assert_eq!(following.subscription.start_date, end.succ_opt().unwrap());
    }

    #[tokio::test]
    async fn test_renewal_follows_current_period_over_old_open_pack() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let today = test_support::today();
        let gym = test_support::gym(&pool).await;
        let member = test_support::member(&pool, gym.id).await;
        let pack = test_support::session_plan(&pool, gym.id, 10, None).await;
        let monthly = test_support::period_plan(&pool, gym.id, 30).await;
        let owner = Uuid::new_v4();

        let old_pack =
            test_support::member_subscription(&pool, &member, &pack, days_ago(600), None, Some(0)).await;
        test_support::set_status(&pool, old_pack.id, "expired").await;

        let current = assign(&pool, gym.id, member.id, owner, assign_request(monthly.id, None), today)
            .await
            .unwrap();

        let renewed = renew(&pool, gym.id, member.id, owner, None, today).await.unwrap();

        assert_eq!(renewed.subscription.subscription_id, monthly.id);
        assert_eq!(
            Some(renewed.subscription.start_date),
            current.subscription.end_date.and_then(|end| end.succ_opt())
        );
    }

    #[tokio::test]
    async fn test_renewing_open_ended_pack_is_refused() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let today = test_support::today();
        let gym = test_support::gym(&pool).await;
        let member = test_support::member(&pool, gym.id).await;
        let pack = test_support::session_plan(&pool, gym.id, 10, None).await;
        let owner = Uuid::new_v4();

        assign(&pool, gym.id, member.id, owner, assign_request(pack.id, None), today)
            .await
            .unwrap();

        let result = renew(&pool, gym.id, member.id, owner, None, today).await;
        assert!(matches!(result, Err(EnrollmentError::OpenEnded)));
    }

    #[tokio::test]
    async fn test_renewal_without_history_is_refused() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let gym = test_support::gym(&pool).await;
        let member = test_support::member(&pool, gym.id).await;

        let result = renew(&pool, gym.id, member.id, Uuid::new_v4(), None, test_support::today()).await;
        assert!(matches!(result, Err(EnrollmentError::NothingToRenew)));
    }

    #[tokio::test]
    async fn test_start_date_past_the_calendar_is_rejected() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let gym = test_support::gym(&pool).await;
        let member = test_support::member(&pool, gym.id).await;
        let monthly = test_support::period_plan(&pool, gym.id, 30).await;

        let result = assign(
            &pool,
            gym.id,
            member.id,
            Uuid::new_v4(),
            assign_request(monthly.id, Some(NaiveDate::MAX)),
            test_support::today(),
        )
        .await;
        assert!(matches!(result, Err(EnrollmentError::InvalidPeriod)));
    }
}
