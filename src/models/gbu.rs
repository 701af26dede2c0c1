use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::services::roles::Role;

/// Gym-user role assignment
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GymUser {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub role: String, // "owner", "admin" or "staff"
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GymUser {
    /// Parsed role; rows are constrained by the schema so an unknown value is a data error
    pub fn role(&self) -> Result<Role, sqlx::Error> {
        self.role
            .parse::<Role>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))
    }

    pub async fn find(pool: &PgPool, gym_id: Uuid, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM gbus WHERE gym_id = $1 AND user_id = $2
            "#,
        )
        .bind(gym_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_email(pool: &PgPool, gym_id: Uuid, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM gbus WHERE gym_id = $1 AND LOWER(email) = LOWER($2)
            "#,
        )
        .bind(gym_id)
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Lists staff ordered by rank, then email
    pub async fn list_by_gym(pool: &PgPool, gym_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM gbus
            WHERE gym_id = $1
            ORDER BY CASE role WHEN 'owner' THEN 0 WHEN 'admin' THEN 1 ELSE 2 END, email ASC
            "#,
        )
        .bind(gym_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        gym_id: Uuid,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO gbus (gym_id, user_id, email, role)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(gym_id)
        .bind(user_id)
        .bind(email)
        .bind(role.as_str())
        .fetch_one(&mut **tx)
        .await?;

        Ok(row)
    }

    pub async fn set_role(pool: &PgPool, gym_id: Uuid, user_id: Uuid, role: Role) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            UPDATE gbus
            SET role = $3, updated_at = NOW()
            WHERE gym_id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(gym_id)
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    pub async fn delete(pool: &PgPool, gym_id: Uuid, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            DELETE FROM gbus WHERE gym_id = $1 AND user_id = $2
            "#,
        )
        .bind(gym_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(())
    }
}
