use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::payment::{self, MAX_AMOUNT_CENTS};

/// Longest period or validity a plan may grant
pub const MAX_PERIOD_DAYS: i32 = 3650;

/// A subscription plan sold by a gym.
///
/// Exactly one of `duration_days` (period plan) or `session_count`
/// (session pack) is set; the schema enforces it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub duration_days: Option<i32>,
    pub session_count: Option<i32>,
    pub validity_days: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionData {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub duration_days: Option<i32>,
    pub session_count: Option<i32>,
    pub validity_days: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSubscriptionData {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub is_active: Option<bool>,
}

/// Access period granted by a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub sessions: Option<i32>,
}

impl CreateSubscriptionData {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Plan name is required".to_string());
        }
        if !payment::is_valid_price(self.price_cents) {
            return Err(format!(
                "Price must be between 0 and {} cents",
                MAX_AMOUNT_CENTS
            ));
        }
        if [self.duration_days, self.validity_days]
            .into_iter()
            .flatten()
            .any(|days| days > MAX_PERIOD_DAYS)
        {
            return Err(format!("Periods cannot exceed {} days", MAX_PERIOD_DAYS));
        }
        match (self.duration_days, self.session_count) {
            (Some(days), None) if days > 0 => {
                if self.validity_days.is_some() {
                    return Err("Validity only applies to session plans".to_string());
                }
            }
            (None, Some(sessions)) if sessions > 0 => {
                if matches!(self.validity_days, Some(v) if v <= 0) {
                    return Err("Validity must be a positive number of days".to_string());
                }
            }
            (Some(_), Some(_)) => {
                return Err("A plan is either period-based or session-based, not both".to_string())
            }
            _ => {
                return Err(
                    "Either a positive duration or a positive session count is required"
                        .to_string(),
                )
            }
        }
        Ok(())
    }
}

impl Subscription {
    /// Computes the period granted when the plan starts on `start_date`.
    /// End dates are inclusive. `None` when the end falls outside the calendar.
    pub fn period_starting(&self, start_date: NaiveDate) -> Option<Period> {
        let end_date = match self.duration_days.or(self.validity_days) {
            Some(days) => Some(start_date.checked_add_signed(Duration::days(i64::from(days) - 1))?),
            None => None,
        };
        Some(Period {
            start_date,
            end_date,
            sessions: self.session_count,
        })
    }

    pub async fn create(pool: &PgPool, gym_id: Uuid, data: CreateSubscriptionData) -> Result<Self, sqlx::Error> {
        let plan = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO subscriptions (gym_id, name, description, price_cents, duration_days, session_count, validity_days)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(gym_id)
        .bind(data.name.trim())
        .bind(&data.description)
        .bind(data.price_cents)
        .bind(data.duration_days)
        .bind(data.session_count)
        .bind(data.validity_days)
        .fetch_one(pool)
        .await?;

        Ok(plan)
    }

    pub async fn find(pool: &PgPool, gym_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let plan = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM subscriptions WHERE id = $1 AND gym_id = $2
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .fetch_optional(pool)
        .await?;

        Ok(plan)
    }

    pub async fn list_by_gym(pool: &PgPool, gym_id: Uuid, include_inactive: bool) -> Result<Vec<Self>, sqlx::Error> {
        let plans = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM subscriptions
            WHERE gym_id = $1 AND ($2 OR is_active = TRUE)
            ORDER BY name ASC
            "#,
        )
        .bind(gym_id)
        .bind(include_inactive)
        .fetch_all(pool)
        .await?;

        Ok(plans)
    }

    pub async fn update(
        pool: &PgPool,
        gym_id: Uuid,
        id: Uuid,
        data: UpdateSubscriptionData,
    ) -> Result<Option<Self>, sqlx::Error> {
        let plan = sqlx::query_as::<_, Self>(
            r#"
            UPDATE subscriptions
            SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                price_cents = COALESCE($5, price_cents),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1 AND gym_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.price_cents)
        .bind(data.is_active)
        .fetch_optional(pool)
        .await?;

        Ok(plan)
    }

    pub async fn count_member_subscriptions(pool: &PgPool, id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM member_subscriptions WHERE subscription_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    pub async fn delete(pool: &PgPool, gym_id: Uuid, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            DELETE FROM subscriptions WHERE id = $1 AND gym_id = $2
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(duration_days: Option<i32>, session_count: Option<i32>, validity_days: Option<i32>) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            gym_id: Uuid::new_v4(),
            name: "Plan".to_string(),
            description: None,
            price_cents: 4500,
            duration_days,
            session_count,
            validity_days,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn data(duration_days: Option<i32>, session_count: Option<i32>, validity_days: Option<i32>) -> CreateSubscriptionData {
        CreateSubscriptionData {
            name: "Monthly".to_string(),
            description: None,
            price_cents: 3000,
            duration_days,
            session_count,
            validity_days,
        }
    }

    #[test]
    fn test_period_plan_end_date_is_inclusive() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let period = plan(Some(30), None, None).period_starting(start).unwrap();

        assert_eq!(period.end_date, NaiveDate::from_ymd_opt(2025, 1, 30));
        assert_eq!(period.sessions, None);
    }

    #[test]
    fn test_session_plan_without_validity_is_open_ended() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let period = plan(None, Some(10), None).period_starting(start).unwrap();

        assert_eq!(period.end_date, None);
        assert_eq!(period.sessions, Some(10));
    }

    #[test]
    fn test_session_plan_with_validity() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let period = plan(None, Some(10), Some(90)).period_starting(start).unwrap();

        assert_eq!(period.end_date, NaiveDate::from_ymd_opt(2025, 6, 7));
    }

    #[test]
    fn test_validation() {
        assert!(data(Some(30), None, None).validate().is_ok());
        assert!(data(None, Some(10), Some(60)).validate().is_ok());
        assert!(data(Some(30), Some(10), None).validate().is_err());
        assert!(data(None, None, None).validate().is_err());
        assert!(data(Some(0), None, None).validate().is_err());
        assert!(data(Some(30), None, Some(10)).validate().is_err());

        let mut negative = data(Some(30), None, None);
        negative.price_cents = -1;
        assert!(negative.validate().is_err());

        let mut blank = data(Some(30), None, None);
        blank.name = "  ".to_string();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_validation_caps_periods_and_price() {
        assert!(data(Some(MAX_PERIOD_DAYS), None, None).validate().is_ok());
        assert!(data(Some(200_000_000), None, None).validate().is_err());
        assert!(data(None, Some(10), Some(MAX_PERIOD_DAYS + 1)).validate().is_err());

        let mut expensive = data(Some(30), None, None);
        expensive.price_cents = i64::MAX / 2;
        assert!(expensive.validate().is_err());
    }

    #[test]
    fn test_period_past_the_calendar_is_rejected() {
        let period = plan(Some(30), None, None).period_starting(NaiveDate::MAX);
        assert!(period.is_none());

        let huge = plan(Some(i32::MAX), None, None);
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(huge.period_starting(start).is_none());
    }
}
