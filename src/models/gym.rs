use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::services::roles::Role;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Gym {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub currency: String,
    pub billing_status: String, // "trialing", "active", "past_due" or "cancelled"
    pub billing_period_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A gym as seen by one of its staff members
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GymWithRole {
    pub id: Uuid,
    pub name: String,
    pub billing_status: String,
    pub billing_period_end: DateTime<Utc>,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct CreateGymData {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub currency: Option<String>,
    pub owner_user_id: Uuid,
    pub owner_email: String,
    pub trial_days: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGymData {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Trialing,
    Active,
    PastDue,
    Cancelled,
}

impl BillingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Trialing => "trialing",
            BillingStatus::Active => "active",
            BillingStatus::PastDue => "past_due",
            BillingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trialing" => Some(BillingStatus::Trialing),
            "active" => Some(BillingStatus::Active),
            "past_due" => Some(BillingStatus::PastDue),
            "cancelled" => Some(BillingStatus::Cancelled),
            _ => None,
        }
    }
}

impl Gym {
    /// Whether the gym's platform subscription currently grants dashboard access
    pub fn has_active_billing(&self, now: DateTime<Utc>) -> bool {
        matches!(
            BillingStatus::parse(&self.billing_status),
            Some(BillingStatus::Trialing | BillingStatus::Active)
        ) && self.billing_period_end >= now
    }

    /// Creates a gym on a trial and makes the creator its owner
    pub async fn create_with_owner(pool: &PgPool, data: CreateGymData) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let trial_end = Utc::now() + Duration::days(data.trial_days);

        let gym = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO gyms (name, address, phone, currency, billing_status, billing_period_end)
            VALUES ($1, $2, $3, COALESCE($4, 'EUR'), 'trialing', $5)
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(&data.address)
        .bind(&data.phone)
        .bind(&data.currency)
        .bind(trial_end)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO gbus (gym_id, user_id, email, role)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(gym.id)
        .bind(data.owner_user_id)
        .bind(&data.owner_email)
        .bind(Role::Owner.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(gym)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let gym = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM gyms WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(gym)
    }

    /// Lists the gyms a user belongs to, with their role in each
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<GymWithRole>, sqlx::Error> {
        let gyms = sqlx::query_as::<_, GymWithRole>(
            r#"
            SELECT g.id, g.name, g.billing_status, g.billing_period_end, b.role
            FROM gyms g
            JOIN gbus b ON b.gym_id = g.id
            WHERE b.user_id = $1
            ORDER BY g.name ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(gyms)
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateGymData) -> Result<Self, sqlx::Error> {
        let gym = sqlx::query_as::<_, Self>(
            r#"
            UPDATE gyms
            SET
                name = COALESCE($2, name),
                address = COALESCE($3, address),
                phone = COALESCE($4, phone),
                currency = COALESCE($5, currency),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.address)
        .bind(data.phone)
        .bind(data.currency)
        .fetch_one(pool)
        .await?;

        Ok(gym)
    }

    /// Counts rows that block deletion: (members, subscription plans)
    pub async fn count_dependents(pool: &PgPool, id: Uuid) -> Result<(i64, i64), sqlx::Error> {
        let counts: (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM members WHERE gym_id = $1),
                (SELECT COUNT(*) FROM subscriptions WHERE gym_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(counts)
    }

    /// Deletes a gym with no members or plans, along with its staff rows
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        for statement in [
            "DELETE FROM invitations WHERE gym_id = $1",
            "DELETE FROM gbus WHERE gym_id = $1",
            "DELETE FROM ticket_items WHERE ticket_id IN (SELECT id FROM tickets WHERE gym_id = $1)",
            "DELETE FROM tickets WHERE gym_id = $1",
            "DELETE FROM products WHERE gym_id = $1",
            "DELETE FROM gyms WHERE id = $1",
        ] {
            sqlx::query(statement).bind(id).execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok(())
    }

    pub async fn set_billing(
        pool: &PgPool,
        id: Uuid,
        status: BillingStatus,
        period_end: Option<DateTime<Utc>>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let gym = sqlx::query_as::<_, Self>(
            r#"
            UPDATE gyms
            SET
                billing_status = $2,
                billing_period_end = COALESCE($3, billing_period_end),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(period_end)
        .fetch_optional(pool)
        .await?;

        Ok(gym)
    }

    /// Moves lapsed trials and subscriptions to past_due, returning how many changed
    pub async fn mark_lapsed_billing(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE gyms
            SET billing_status = 'past_due', updated_at = NOW()
            WHERE billing_status IN ('trialing', 'active')
              AND billing_period_end < $1
            "#,
        )
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gym(status: &str, period_end: DateTime<Utc>) -> Gym {
        Gym {
            id: Uuid::new_v4(),
            name: "Iron Temple".to_string(),
            address: None,
            phone: None,
            currency: "EUR".to_string(),
            billing_status: status.to_string(),
            billing_period_end: period_end,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_trial_within_period_is_active() {
        let now = Utc::now();
        assert!(gym("trialing", now + Duration::days(3)).has_active_billing(now));
        assert!(gym("active", now + Duration::days(30)).has_active_billing(now));
    }

    #[test]
    fn test_lapsed_or_cancelled_is_inactive() {
        let now = Utc::now();
        assert!(!gym("active", now - Duration::days(1)).has_active_billing(now));
        assert!(!gym("past_due", now + Duration::days(10)).has_active_billing(now));
        assert!(!gym("cancelled", now + Duration::days(10)).has_active_billing(now));
        assert!(!gym("bogus", now + Duration::days(10)).has_active_billing(now));
    }
}
