use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::services::roles::Role;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invitation {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub email: String,
    pub role: String, // "admin" or "staff"
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub status: String, // "pending", "accepted" or "revoked"
    pub invited_by: Uuid,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateInvitationData {
    pub gym_id: Uuid,
    pub email: String,
    pub role: Role,
    pub token_hash: String,
    pub invited_by: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.status == "pending" && self.expires_at > now
    }

    pub async fn create(pool: &PgPool, data: CreateInvitationData) -> Result<Self, sqlx::Error> {
        let invitation = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO invitations (gym_id, email, role, token_hash, invited_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.gym_id)
        .bind(&data.email)
        .bind(data.role.as_str())
        .bind(&data.token_hash)
        .bind(data.invited_by)
        .bind(data.expires_at)
        .fetch_one(pool)
        .await?;

        Ok(invitation)
    }

    pub async fn find_by_token_hash(pool: &PgPool, token_hash: &str) -> Result<Option<Self>, sqlx::Error> {
        let invitation = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM invitations WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(pool)
        .await?;

        Ok(invitation)
    }

    pub async fn find_pending_for_email(
        pool: &PgPool,
        gym_id: Uuid,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let invitation = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM invitations
            WHERE gym_id = $1
              AND LOWER(email) = LOWER($2)
              AND status = 'pending'
              AND expires_at > NOW()
            LIMIT 1
            "#,
        )
        .bind(gym_id)
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(invitation)
    }

    pub async fn list_by_gym(pool: &PgPool, gym_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let invitations = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM invitations
            WHERE gym_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(gym_id)
        .fetch_all(pool)
        .await?;

        Ok(invitations)
    }

    /// Revokes a pending invitation; returns false when nothing was pending
    pub async fn revoke(pool: &PgPool, gym_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET status = 'revoked'
            WHERE id = $1 AND gym_id = $2 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_accepted(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE invitations
            SET status = 'accepted', accepted_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}
