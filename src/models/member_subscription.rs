use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemberSubscription {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub member_id: Uuid,
    pub subscription_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub sessions_remaining: Option<i32>,
    pub status: String, // "active", "expired" or "cancelled"
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Member subscription joined with its plan name.
/// `effective_status` is filled in by the listing queries for the day asked.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemberSubscriptionView {
    pub id: Uuid,
    pub member_id: Uuid,
    pub subscription_id: Uuid,
    pub plan_name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub sessions_remaining: Option<i32>,
    pub status: String,
    #[sqlx(skip)]
    pub effective_status: EffectiveStatus,
    pub created_at: DateTime<Utc>,
}

/// Status as seen on a given day, derived from the stored status and dates
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Upcoming,
    #[default]
    Active,
    Expired,
    Cancelled,
}

impl MemberSubscriptionView {
    pub fn as_of(mut self, today: NaiveDate) -> Self {
        self.effective_status = effective_status(
            &self.status,
            self.start_date,
            self.end_date,
            self.sessions_remaining,
            today,
        );
        self
    }
}

pub fn effective_status(
    status: &str,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    sessions_remaining: Option<i32>,
    today: NaiveDate,
) -> EffectiveStatus {
    match status {
        "cancelled" => EffectiveStatus::Cancelled,
        "expired" => EffectiveStatus::Expired,
        _ if end_date.is_some_and(|end| end < today) => EffectiveStatus::Expired,
        _ if sessions_remaining == Some(0) => EffectiveStatus::Expired,
        _ if start_date > today => EffectiveStatus::Upcoming,
        _ => EffectiveStatus::Active,
    }
}

#[derive(Debug, Clone)]
pub struct CreateMemberSubscriptionData {
    pub gym_id: Uuid,
    pub member_id: Uuid,
    pub subscription_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub sessions_remaining: Option<i32>,
}

impl MemberSubscription {
    pub fn effective_status(&self, today: NaiveDate) -> EffectiveStatus {
        effective_status(
            &self.status,
            self.start_date,
            self.end_date,
            self.sessions_remaining,
            today,
        )
    }

    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        data: CreateMemberSubscriptionData,
    ) -> Result<Self, sqlx::Error> {
        let subscription = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO member_subscriptions (gym_id, member_id, subscription_id, start_date, end_date, sessions_remaining)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.gym_id)
        .bind(data.member_id)
        .bind(data.subscription_id)
        .bind(data.start_date)
        .bind(data.end_date)
        .bind(data.sessions_remaining)
        .fetch_one(&mut **tx)
        .await?;

        Ok(subscription)
    }

    pub async fn find(pool: &PgPool, gym_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let subscription = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM member_subscriptions WHERE id = $1 AND gym_id = $2
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .fetch_optional(pool)
        .await?;

        Ok(subscription)
    }

    pub async fn list_for_member(
        pool: &PgPool,
        gym_id: Uuid,
        member_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<MemberSubscriptionView>, sqlx::Error> {
        let subscriptions = sqlx::query_as::<_, MemberSubscriptionView>(
            r#"
            SELECT
                ms.id, ms.member_id, ms.subscription_id, s.name AS plan_name,
                ms.start_date, ms.end_date, ms.sessions_remaining, ms.status, ms.created_at
            FROM member_subscriptions ms
            JOIN subscriptions s ON s.id = ms.subscription_id
            WHERE ms.gym_id = $1 AND ms.member_id = $2
            ORDER BY ms.start_date DESC
            "#,
        )
        .bind(gym_id)
        .bind(member_id)
        .fetch_all(pool)
        .await?;

        Ok(subscriptions.into_iter().map(|s| s.as_of(today)).collect())
    }

    /// Finds an active subscription of the member whose period overlaps `[start, end]`.
    /// A missing end date means the period is open-ended.
    pub async fn find_overlapping(
        tx: &mut Transaction<'_, Postgres>,
        member_id: Uuid,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let subscription = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM member_subscriptions
            WHERE member_id = $1
              AND status = 'active'
              AND (sessions_remaining IS NULL OR sessions_remaining > 0)
              AND start_date <= COALESCE($3, 'infinity'::DATE)
              AND COALESCE(end_date, 'infinity'::DATE) >= $2
            ORDER BY start_date ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(member_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(subscription)
    }

    /// Latest subscription of a member that was not cancelled. Open-ended
    /// rows are ranked by their start date.
    pub async fn find_latest(pool: &PgPool, gym_id: Uuid, member_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let subscription = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM member_subscriptions
            WHERE gym_id = $1 AND member_id = $2 AND status <> 'cancelled'
            ORDER BY COALESCE(end_date, start_date) DESC, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(gym_id)
        .bind(member_id)
        .fetch_optional(pool)
        .await?;

        Ok(subscription)
    }

    /// Locks the subscription that grants access today, preferring the one ending first
    pub async fn lock_current(
        tx: &mut Transaction<'_, Postgres>,
        member_id: Uuid,
        today: NaiveDate,
    ) -> Result<Option<Self>, sqlx::Error> {
        let subscription = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM member_subscriptions
            WHERE member_id = $1
              AND status = 'active'
              AND start_date <= $2
              AND (end_date IS NULL OR end_date >= $2)
              AND (sessions_remaining IS NULL OR sessions_remaining > 0)
            ORDER BY end_date ASC NULLS LAST
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(member_id)
        .bind(today)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(subscription)
    }

    /// Consumes one session; the subscription expires with its last session
    pub async fn consume_session(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Self, sqlx::Error> {
        let subscription = sqlx::query_as::<_, Self>(
            r#"
            UPDATE member_subscriptions
            SET
                sessions_remaining = sessions_remaining - 1,
                status = CASE WHEN sessions_remaining - 1 = 0 THEN 'expired' ELSE status END,
                updated_at = NOW()
            WHERE id = $1 AND sessions_remaining > 0
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(subscription)
    }

    pub async fn cancel(pool: &PgPool, gym_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let subscription = sqlx::query_as::<_, Self>(
            r#"
            UPDATE member_subscriptions
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND gym_id = $2 AND status = 'active'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .fetch_optional(pool)
        .await?;

        Ok(subscription)
    }

    /// Expires active subscriptions whose end date is before `today`
    pub async fn expire_ended(pool: &PgPool, today: NaiveDate) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE member_subscriptions
            SET status = 'expired', updated_at = NOW()
            WHERE status = 'active' AND end_date < $1
            "#,
        )
        .bind(today)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Expires active session packs with no sessions left
    pub async fn expire_exhausted(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE member_subscriptions
            SET status = 'expired', updated_at = NOW()
            WHERE status = 'active' AND sessions_remaining = 0
            "#,
        )
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_active(pool: &PgPool, gym_id: Uuid, today: NaiveDate) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(DISTINCT member_id) FROM member_subscriptions
            WHERE gym_id = $1
              AND status = 'active'
              AND start_date <= $2
              AND (end_date IS NULL OR end_date >= $2)
              AND (sessions_remaining IS NULL OR sessions_remaining > 0)
            "#,
        )
        .bind(gym_id)
        .bind(today)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Active subscriptions ending between `today` and `until`, inclusive
    pub async fn list_expiring(
        pool: &PgPool,
        gym_id: Uuid,
        today: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<MemberSubscriptionView>, sqlx::Error> {
        let subscriptions = sqlx::query_as::<_, MemberSubscriptionView>(
            r#"
            SELECT
                ms.id, ms.member_id, ms.subscription_id, s.name AS plan_name,
                ms.start_date, ms.end_date, ms.sessions_remaining, ms.status, ms.created_at
            FROM member_subscriptions ms
            JOIN subscriptions s ON s.id = ms.subscription_id
            WHERE ms.gym_id = $1
              AND ms.status = 'active'
              AND ms.end_date BETWEEN $2 AND $3
            ORDER BY ms.end_date ASC
            "#,
        )
        .bind(gym_id)
        .bind(today)
        .bind(until)
        .fetch_all(pool)
        .await?;

        Ok(subscriptions.into_iter().map(|s| s.as_of(today)).collect())
    }
}
