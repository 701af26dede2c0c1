use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Point-of-sale receipt
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub member_id: Option<Uuid>,
    pub total_cents: i64,
    pub payment_method: String,
    pub sold_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketItem {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketWithItems {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub items: Vec<TicketItem>,
}

#[derive(Debug, Clone)]
pub struct NewTicketItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl NewTicketItem {
    /// `None` when the line total does not fit in an `i64`
    pub fn new(product_id: Uuid, product_name: String, quantity: i32, unit_price_cents: i64) -> Option<Self> {
        let line_total_cents = unit_price_cents.checked_mul(i64::from(quantity))?;
        Some(Self {
            product_id,
            product_name,
            quantity,
            unit_price_cents,
            line_total_cents,
        })
    }
}

pub fn total_cents(items: &[NewTicketItem]) -> Option<i64> {
    items
        .iter()
        .try_fold(0i64, |total, item| total.checked_add(item.line_total_cents))
}

impl Ticket {
    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        gym_id: Uuid,
        member_id: Option<Uuid>,
        payment_method: &str,
        sold_by: Uuid,
        items: &[NewTicketItem],
        total_cents: i64,
    ) -> Result<TicketWithItems, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO tickets (gym_id, member_id, total_cents, payment_method, sold_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(gym_id)
        .bind(member_id)
        .bind(total_cents)
        .bind(payment_method)
        .bind(sold_by)
        .fetch_one(&mut **tx)
        .await?;

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let line = sqlx::query_as::<_, TicketItem>(
                r#"
                INSERT INTO ticket_items (ticket_id, product_id, product_name, quantity, unit_price_cents, line_total_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(ticket.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.line_total_cents)
            .fetch_one(&mut **tx)
            .await?;
            lines.push(line);
        }

        Ok(TicketWithItems {
            ticket,
            items: lines,
        })
    }

    pub async fn find_with_items(
        pool: &PgPool,
        gym_id: Uuid,
        id: Uuid,
    ) -> Result<Option<TicketWithItems>, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tickets WHERE id = $1 AND gym_id = $2
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .fetch_optional(pool)
        .await?;

        let Some(ticket) = ticket else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, TicketItem>(
            r#"
            SELECT * FROM ticket_items WHERE ticket_id = $1 ORDER BY product_name ASC
            "#,
        )
        .bind(ticket.id)
        .fetch_all(pool)
        .await?;

        Ok(Some(TicketWithItems { ticket, items }))
    }

    /// Tickets in `[from, to)`, newest first; open bounds when absent
    pub async fn list(
        pool: &PgPool,
        gym_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let tickets = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tickets
            WHERE gym_id = $1
              AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at < $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(gym_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

        Ok(tickets)
    }

    pub async fn total_between(
        pool: &PgPool,
        gym_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(total_cents), 0)::BIGINT FROM tickets
            WHERE gym_id = $1 AND created_at >= $2 AND created_at < $3
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

    fn item(quantity: i32, unit_price_cents: i64) -> Option<NewTicketItem> {
        NewTicketItem::new(Uuid::new_v4(), "Shaker".to_string(), quantity, unit_price_cents)
    }

    #[test]
    fn test_line_total() {
        assert_eq!(item(3, 799).unwrap().line_total_cents, 2397);
    }

    #[test]
    fn test_line_total_overflow_is_rejected() {
        assert!(item(3, i64::MAX / 2).is_none());
    }

    #[test]
    fn test_ticket_total_overflow_is_rejected() {
        let big = item(1, i64::MAX - 10).unwrap();
        let small = item(1, 500).unwrap();

        assert_eq!(total_cents(&[small.clone(), small.clone()]), Some(1000));
        assert_eq!(total_cents(&[big, small]), None);
    }
}
