use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::payment::{self, MAX_AMOUNT_CENTS};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub price_cents: i64,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductData {
    pub name: String,
    pub sku: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub stock_quantity: i32,
    pub low_stock_threshold: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProductData {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub price_cents: Option<i64>,
    pub low_stock_threshold: Option<i32>,
    pub is_active: Option<bool>,
}

impl CreateProductData {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Product name is required".to_string());
        }
        if !payment::is_valid_price(self.price_cents) {
            return Err(format!(
                "Price must be between 0 and {} cents",
                MAX_AMOUNT_CENTS
            ));
        }
        if self.stock_quantity < 0 {
            return Err("Stock cannot be negative".to_string());
        }
        if matches!(self.low_stock_threshold, Some(t) if t < 0) {
            return Err("Low stock threshold cannot be negative".to_string());
        }
        Ok(())
    }
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.low_stock_threshold
    }

    pub async fn create(pool: &PgPool, gym_id: Uuid, data: CreateProductData) -> Result<Self, sqlx::Error> {
        let product = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO products (gym_id, name, sku, price_cents, stock_quantity, low_stock_threshold)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, 5))
            RETURNING *
            "#,
        )
        .bind(gym_id)
        .bind(data.name.trim())
        .bind(&data.sku)
        .bind(data.price_cents)
        .bind(data.stock_quantity)
        .bind(data.low_stock_threshold)
        .fetch_one(pool)
        .await?;

        Ok(product)
    }

    pub async fn find(pool: &PgPool, gym_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let product = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM products WHERE id = $1 AND gym_id = $2
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .fetch_optional(pool)
        .await?;

        Ok(product)
    }

    /// Locks a product row for the duration of a sale
    pub async fn lock(tx: &mut Transaction<'_, Postgres>, gym_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let product = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM products WHERE id = $1 AND gym_id = $2 FOR UPDATE
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(product)
    }

    pub async fn list_by_gym(pool: &PgPool, gym_id: Uuid, include_inactive: bool) -> Result<Vec<Self>, sqlx::Error> {
        let products = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM products
            WHERE gym_id = $1 AND ($2 OR is_active = TRUE)
            ORDER BY name ASC
            "#,
        )
        .bind(gym_id)
        .bind(include_inactive)
        .fetch_all(pool)
        .await?;

        Ok(products)
    }

    pub async fn list_low_stock(pool: &PgPool, gym_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let products = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM products
            WHERE gym_id = $1 AND is_active = TRUE AND stock_quantity <= low_stock_threshold
            ORDER BY stock_quantity ASC, name ASC
            "#,
        )
        .bind(gym_id)
        .fetch_all(pool)
        .await?;

        Ok(products)
    }

    pub async fn update(
        pool: &PgPool,
        gym_id: Uuid,
        id: Uuid,
        data: UpdateProductData,
    ) -> Result<Option<Self>, sqlx::Error> {
        let product = sqlx::query_as::<_, Self>(
            r#"
            UPDATE products
            SET
                name = COALESCE($3, name),
                sku = COALESCE($4, sku),
                price_cents = COALESCE($5, price_cents),
                low_stock_threshold = COALESCE($6, low_stock_threshold),
                is_active = COALESCE($7, is_active),
                updated_at = NOW()
            WHERE id = $1 AND gym_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .bind(data.name)
        .bind(data.sku)
        .bind(data.price_cents)
        .bind(data.low_stock_threshold)
        .bind(data.is_active)
        .fetch_optional(pool)
        .await?;

        Ok(product)
    }

    /// Applies a stock delta; the row is left untouched when the result would be negative
    pub async fn adjust_stock(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        delta: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        let product = sqlx::query_as::<_, Self>(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity + $2, updated_at = NOW()
            WHERE id = $1 AND stock_quantity + $2 >= 0
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(product)
    }

    pub async fn count_ticket_lines(pool: &PgPool, id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM ticket_items WHERE product_id = $1
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
            DELETE FROM products WHERE id = $1 AND gym_id = $2
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .execute(pool)
        .await?;

        Ok(())
    }
}
