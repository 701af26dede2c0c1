use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

pub const PAYMENT_METHODS: [&str; 4] = ["cash", "card", "transfer", "other"];

/// Upper bound for any single price or payment, in cents
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000;

pub fn is_valid_method(method: &str) -> bool {
    PAYMENT_METHODS.contains(&method)
}

pub fn is_valid_price(cents: i64) -> bool {
    (0..=MAX_AMOUNT_CENTS).contains(&cents)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub member_id: Uuid,
    pub member_subscription_id: Option<Uuid>,
    pub amount_cents: i64,
    pub method: String, // one of PAYMENT_METHODS
    pub note: Option<String>,
    pub recorded_by: Uuid,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Payment with the member's name for listings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentView {
    pub id: Uuid,
    pub member_id: Uuid,
    pub member_name: String,
    pub member_subscription_id: Option<Uuid>,
    pub amount_cents: i64,
    pub method: String,
    pub note: Option<String>,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentData {
    pub gym_id: Uuid,
    pub member_id: Uuid,
    pub member_subscription_id: Option<Uuid>,
    pub amount_cents: i64,
    pub method: String,
    pub note: Option<String>,
    pub recorded_by: Uuid,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub member_id: Option<Uuid>,
}

impl Payment {
    pub async fn create(tx: &mut Transaction<'_, Postgres>, data: CreatePaymentData) -> Result<Self, sqlx::Error> {
        let payment = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO payments (gym_id, member_id, member_subscription_id, amount_cents, method, note, recorded_by, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, NOW()))
            RETURNING *
            "#,
        )
        .bind(data.gym_id)
        .bind(data.member_id)
        .bind(data.member_subscription_id)
        .bind(data.amount_cents)
        .bind(&data.method)
        .bind(&data.note)
        .bind(data.recorded_by)
        .bind(data.paid_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(payment)
    }

    pub async fn list(pool: &PgPool, gym_id: Uuid, filter: PaymentFilter) -> Result<Vec<PaymentView>, sqlx::Error> {
        let payments = sqlx::query_as::<_, PaymentView>(
            r#"
            SELECT
                p.id, p.member_id, m.first_name || ' ' || m.last_name AS member_name,
                p.member_subscription_id, p.amount_cents, p.method, p.note, p.paid_at
            FROM payments p
            JOIN members m ON m.id = p.member_id
            WHERE p.gym_id = $1
              AND ($2::TIMESTAMPTZ IS NULL OR p.paid_at >= $2)
              AND ($3::TIMESTAMPTZ IS NULL OR p.paid_at < $3)
              AND ($4::UUID IS NULL OR p.member_id = $4)
            ORDER BY p.paid_at DESC
            "#,
        )
        .bind(gym_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.member_id)
        .fetch_all(pool)
        .await?;

        Ok(payments)
    }

    /// Sum of payments in `[from, to)`
    pub async fn total_between(
        pool: &PgPool,
        gym_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM payments
            WHERE gym_id = $1 AND paid_at >= $2 AND paid_at < $3
            "#,
        )
        .bind(gym_id)
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await?;

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_methods() {
        assert!(is_valid_method("cash"));
        assert!(is_valid_method("transfer"));
        assert!(!is_valid_method("bitcoin"));
        assert!(!is_valid_method("Cash"));
    }

    #[test]
    fn test_price_bounds() {
        assert!(is_valid_price(0));
        assert!(is_valid_price(MAX_AMOUNT_CENTS));
        assert!(!is_valid_price(-1));
        assert!(!is_valid_price(MAX_AMOUNT_CENTS + 1));
        assert!(!is_valid_price(i64::MAX / 2));
    }
}
