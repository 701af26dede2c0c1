use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckIn {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub member_id: Uuid,
    pub member_subscription_id: Option<Uuid>,
    pub checked_in_by: Uuid,
    pub checked_in_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckInView {
    pub id: Uuid,
    pub member_id: Uuid,
    pub member_name: String,
    pub checked_in_at: DateTime<Utc>,
}

impl CheckIn {
    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        gym_id: Uuid,
        member_id: Uuid,
        member_subscription_id: Option<Uuid>,
        checked_in_by: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let check_in = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO check_ins (gym_id, member_id, member_subscription_id, checked_in_by)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(gym_id)
        .bind(member_id)
        .bind(member_subscription_id)
        .bind(checked_in_by)
        .fetch_one(&mut **tx)
        .await?;

        Ok(check_in)
    }

    /// Check-ins in `[from, to)`, newest first
    pub async fn list_between(
        pool: &PgPool,
        gym_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CheckInView>, sqlx::Error> {
        let check_ins = sqlx::query_as::<_, CheckInView>(
            r#"
            SELECT c.id, c.member_id, m.first_name || ' ' || m.last_name AS member_name, c.checked_in_at
            FROM check_ins c
            JOIN members m ON m.id = c.member_id
            WHERE c.gym_id = $1 AND c.checked_in_at >= $2 AND c.checked_in_at < $3
            ORDER BY c.checked_in_at DESC
            "#,
        )
        .bind(gym_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

        Ok(check_ins)
    }

    pub async fn count_between(
        pool: &PgPool,
        gym_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM check_ins
            WHERE gym_id = $1 AND checked_in_at >= $2 AND checked_in_at < $3
            "#,
        )
        .bind(gym_id)
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}
