use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub photo_path: Option<String>,
    #[serde(skip_serializing)]
    pub badge_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Member row for list views, with the end of their latest active subscription
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemberSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub active_until: Option<NaiveDate>,
    pub has_active_subscription: bool,
}

#[derive(Debug, Clone)]
pub struct CreateMemberData {
    pub gym_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub badge_code: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMemberData {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Escapes LIKE wildcards so a search term matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub async fn create(pool: &PgPool, data: CreateMemberData) -> Result<Self, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO members (gym_id, first_name, last_name, email, phone, birth_date, notes, badge_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(data.gym_id)
        .bind(&data.first_name)
        .bind(&data.last_name)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(data.birth_date)
        .bind(&data.notes)
        .bind(&data.badge_code)
        .fetch_one(pool)
        .await?;

        Ok(member)
    }

    /// Finds a member scoped to a gym
    pub async fn find(pool: &PgPool, gym_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members WHERE id = $1 AND gym_id = $2
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    /// Lists members of a gym, optionally filtered by a search term on name, email or phone
    pub async fn search(
        pool: &PgPool,
        gym_id: Uuid,
        query: Option<&str>,
        today: NaiveDate,
    ) -> Result<Vec<MemberSummary>, sqlx::Error> {
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        let members = sqlx::query_as::<_, MemberSummary>(
            r#"
            SELECT
                m.id, m.first_name, m.last_name, m.email, m.phone,
                active.active_until,
                (active.member_id IS NOT NULL) AS has_active_subscription
            FROM members m
            LEFT JOIN LATERAL (
                SELECT ms.member_id, MAX(ms.end_date) AS active_until
                FROM member_subscriptions ms
                WHERE ms.member_id = m.id
                  AND ms.status = 'active'
                  AND ms.start_date <= $3
                  AND (ms.end_date IS NULL OR ms.end_date >= $3)
                  AND (ms.sessions_remaining IS NULL OR ms.sessions_remaining > 0)
                GROUP BY ms.member_id
            ) active ON TRUE
            WHERE m.gym_id = $1
              AND (
                $2::TEXT IS NULL
                OR m.first_name ILIKE $2 ESCAPE '\'
                OR m.last_name ILIKE $2 ESCAPE '\'
                OR m.email ILIKE $2 ESCAPE '\'
                OR m.phone ILIKE $2 ESCAPE '\'
              )
            ORDER BY m.last_name ASC, m.first_name ASC
            "#,
        )
        .bind(gym_id)
        .bind(pattern)
        .bind(today)
        .fetch_all(pool)
        .await?;

        Ok(members)
    }

    pub async fn update(
        pool: &PgPool,
        gym_id: Uuid,
        id: Uuid,
        data: UpdateMemberData,
    ) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            UPDATE members
            SET
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                email = COALESCE($5, email),
                phone = COALESCE($6, phone),
                birth_date = COALESCE($7, birth_date),
                notes = COALESCE($8, notes),
                updated_at = NOW()
            WHERE id = $1 AND gym_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.email)
        .bind(data.phone)
        .bind(data.birth_date)
        .bind(data.notes)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    pub async fn set_photo_path(
        pool: &PgPool,
        gym_id: Uuid,
        id: Uuid,
        photo_path: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE members
            SET photo_path = $3, updated_at = NOW()
            WHERE id = $1 AND gym_id = $2
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .bind(photo_path)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn set_badge_code(
        pool: &PgPool,
        gym_id: Uuid,
        id: Uuid,
        badge_code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            UPDATE members
            SET badge_code = $3, updated_at = NOW()
            WHERE id = $1 AND gym_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(gym_id)
        .bind(badge_code)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    pub async fn count_payments(pool: &PgPool, id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM payments WHERE member_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Deletes a member with its check-ins and subscriptions
    pub async fn delete(pool: &PgPool, gym_id: Uuid, id: Uuid) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM check_ins WHERE member_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE tickets SET member_id = NULL WHERE member_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM member_subscriptions WHERE member_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM members WHERE id = $1 AND gym_id = $2")
            .bind(id)
            .bind(gym_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn count_by_gym(pool: &PgPool, gym_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM members WHERE gym_id = $1")
            .bind(gym_id)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("ana"), "ana");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\x"), "c:\\\\x");
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let gym = test_support::gym(&pool).await;
        test_support::member(&pool, gym.id).await;
        let today = test_support::today();

        let everyone = Member::search(&pool, gym.id, Some("%"), today).await.unwrap();
        assert!(everyone.is_empty());

        let by_name = Member::search(&pool, gym.id, Some("love"), today).await.unwrap();
        assert_eq!(by_name.len(), 1);
    }
}
