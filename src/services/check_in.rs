use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{check_in::CheckIn, member::Member, member_subscription::MemberSubscription};
use crate::services::qr_generator::{self, QrGenerationError};

#[derive(thiserror::Error, Debug)]
pub enum CheckInError {
    #[error("Badge could not be verified: {0}")]
    InvalidBadge(#[from] QrGenerationError),

    #[error("Badge belongs to another gym")]
    WrongGym,

    #[error("Badge has been replaced")]
    RevokedBadge,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckInMember {
    pub id: Uuid,
    pub name: String,
    pub photo_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckInOutcome {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub member: CheckInMember,
    pub member_subscription_id: Option<Uuid>,
    pub valid_until: Option<NaiveDate>,
    pub remaining_sessions: Option<i32>,
}

/// Verifies a scanned badge and checks the member in
pub async fn check_in_with_badge(
    pool: &PgPool,
    gym_id: Uuid,
    checked_in_by: Uuid,
    raw_badge: &str,
    signing_key: &[u8],
    today: NaiveDate,
) -> Result<CheckInOutcome, CheckInError> {
    let badge = qr_generator::verify_badge(raw_badge, signing_key)?;

    if badge.gym_id != gym_id {
        return Err(CheckInError::WrongGym);
    }

    let member = Member::find(pool, gym_id, badge.member_id)
        .await?
        .ok_or(CheckInError::MemberNotFound)?;

    if member.badge_code != badge.badge_code {
        tracing::warn!(gym_id = %gym_id, member_id = %member.id, "Replaced badge scanned");
        return Err(CheckInError::RevokedBadge);
    }

    check_in(pool, gym_id, checked_in_by, member, today).await
}

/// Checks in a member picked by hand at the front desk
pub async fn check_in_member(
    pool: &PgPool,
    gym_id: Uuid,
    checked_in_by: Uuid,
    member_id: Uuid,
    today: NaiveDate,
) -> Result<CheckInOutcome, CheckInError> {
    let member = Member::find(pool, gym_id, member_id)
        .await?
        .ok_or(CheckInError::MemberNotFound)?;

    check_in(pool, gym_id, checked_in_by, member, today).await
}

async fn check_in(
    pool: &PgPool,
    gym_id: Uuid,
    checked_in_by: Uuid,
    member: Member,
    today: NaiveDate,
) -> Result<CheckInOutcome, CheckInError> {
    let summary = CheckInMember {
        id: member.id,
        name: member.full_name(),
        photo_path: member.photo_path.clone(),
    };

    let mut tx = pool.begin().await?;

    let Some(current) = MemberSubscription::lock_current(&mut tx, member.id, today).await? else {
        tracing::info!(gym_id = %gym_id, member_id = %member.id, "Check-in refused: no active subscription");
        return Ok(CheckInOutcome {
            allowed: false,
            reason: Some("No active subscription".to_string()),
            member: summary,
            member_subscription_id: None,
            valid_until: None,
            remaining_sessions: None,
        });
    };

    let current = if current.sessions_remaining.is_some() {
        MemberSubscription::consume_session(&mut tx, current.id).await?
    } else {
        current
    };

    CheckIn::create(&mut tx, gym_id, member.id, Some(current.id), checked_in_by).await?;

    tx.commit().await?;

    tracing::info!(
        gym_id = %gym_id,
        member_id = %member.id,
        remaining_sessions = ?current.sessions_remaining,
        "Member checked in"
    );

    Ok(CheckInOutcome {
        allowed: true,
        reason: None,
        member: summary,
        member_subscription_id: Some(current.id),
        valid_until: current.end_date,
        remaining_sessions: current.sessions_remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    #[tokio::test]
    async fn test_last_session_expires_the_pack() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let today = test_support::today();
        let gym = test_support::gym(&pool).await;
        let member = test_support::member(&pool, gym.id).await;
        let pack = test_support::session_plan(&pool, gym.id, 2, None).await;
        let subscription =
            test_support::member_subscription(&pool, &member, &pack, today, None, Some(2)).await;
        let desk = Uuid::new_v4();

        let first = check_in_member(&pool, gym.id, desk, member.id, today).await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining_sessions, Some(1));
        assert_eq!(test_support::status_of(&pool, subscription.id).await, "active");

        let second = check_in_member(&pool, gym.id, desk, member.id, today).await.unwrap();
        assert!(second.allowed);
        assert_eq!(second.remaining_sessions, Some(0));
        assert_eq!(test_support::status_of(&pool, subscription.id).await, "expired");

        let third = check_in_member(&pool, gym.id, desk, member.id, today).await.unwrap();
        assert!(!third.allowed);
        assert_eq!(third.member_subscription_id, None);
    }

    #[tokio::test]
    async fn test_period_plan_check_in_keeps_subscription_active() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let today = test_support::today();
        let gym = test_support::gym(&pool).await;
        let member = test_support::member(&pool, gym.id).await;
        let monthly = test_support::period_plan(&pool, gym.id, 30).await;
        let subscription =
            test_support::member_subscription(&pool, &member, &monthly, today, Some(today), None).await;

        let outcome = check_in_member(&pool, gym.id, Uuid::new_v4(), member.id, today)
            .await
            .unwrap();

        assert!(outcome.allowed);
        assert_eq!(outcome.remaining_sessions, None);
        assert_eq!(outcome.valid_until, Some(today));
        assert_eq!(test_support::status_of(&pool, subscription.id).await, "active");
    }

    #[tokio::test]
    async fn test_unknown_member_is_not_found() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let gym = test_support::gym(&pool).await;

        let result = check_in_member(&pool, gym.id, Uuid::new_v4(), Uuid::new_v4(), test_support::today()).await;
        assert!(matches!(result, Err(CheckInError::MemberNotFound)));
    }
}
