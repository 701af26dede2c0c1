//! Fixtures for tests that run against Postgres.
//!
//! `pool()` returns `None` when `DATABASE_URL` is unset so the rest of the
//! suite still runs without a database. Every fixture creates its own gym,
//! so tests sharing one database do not see each other's rows.

use chrono::{Duration, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    gym::{CreateGymData, Gym},
    member::{CreateMemberData, Member},
    member_subscription::{CreateMemberSubscriptionData, MemberSubscription},
    product::{CreateProductData, Product},
    subscription::{CreateSubscriptionData, Subscription},
};

pub async fn pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = super::create_pool(&url)
        .await
        .expect("DATABASE_URL is set but the database is unreachable");
    super::run_migrations(&pool).await.expect("migrations failed");
    Some(pool)
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub async fn gym(pool: &PgPool) -> Gym {
    Gym::create_with_owner(
        pool,
        CreateGymData {
            name: "Iron Temple".to_string(),
            address: None,
            phone: None,
            currency: None,
            owner_user_id: Uuid::new_v4(),
            owner_email: format!("{}@example.com", Uuid::new_v4()),
            trial_days: 14,
        },
    )
    .await
    .unwrap()
}

pub async fn member(pool: &PgPool, gym_id: Uuid) -> Member {
    Member::create(
        pool,
        CreateMemberData {
            gym_id,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: None,
            phone: None,
            birth_date: None,
            notes: None,
            badge_code: Uuid::new_v4().simple().to_string(),
        },
    )
    .await
    .unwrap()
}

pub async fn period_plan(pool: &PgPool, gym_id: Uuid, days: i32) -> Subscription {
    Subscription::create(
        pool,
        gym_id,
        CreateSubscriptionData {
            name: format!("{} days", days),
            description: None,
            price_cents: 3000,
            duration_days: Some(days),
            session_count: None,
            validity_days: None,
        },
    )
    .await
    .unwrap()
}

pub async fn session_plan(pool: &PgPool, gym_id: Uuid, sessions: i32, validity_days: Option<i32>) -> Subscription {
    Subscription::create(
        pool,
        gym_id,
        CreateSubscriptionData {
            name: format!("{} sessions", sessions),
            description: None,
            price_cents: 8000,
            duration_days: None,
            session_count: Some(sessions),
            validity_days,
        },
    )
    .await
    .unwrap()
}

pub async fn product(pool: &PgPool, gym_id: Uuid, name: &str, stock: i32) -> Product {
    Product::create(
        pool,
        gym_id,
        CreateProductData {
            name: name.to_string(),
            sku: None,
            price_cents: 250,
            stock_quantity: stock,
            low_stock_threshold: Some(0),
        },
    )
    .await
    .unwrap()
}

/// Inserts a member subscription as-is, bypassing the overlap check
pub async fn member_subscription(
    pool: &PgPool,
    member: &Member,
    plan: &Subscription,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    sessions_remaining: Option<i32>,
) -> MemberSubscription {
    let mut tx = pool.begin().await.unwrap();
    let subscription = MemberSubscription::create(
        &mut tx,
        CreateMemberSubscriptionData {
            gym_id: member.gym_id,
            member_id: member.id,
            subscription_id: plan.id,
            start_date,
            end_date,
            sessions_remaining,
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    subscription
}

pub async fn set_status(pool: &PgPool, member_subscription_id: Uuid, status: &str) {
    sqlx::query("UPDATE member_subscriptions SET status = $2 WHERE id = $1")
        .bind(member_subscription_id)
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn status_of(pool: &PgPool, member_subscription_id: Uuid) -> String {
    let (status,): (String,) = sqlx::query_as("SELECT status FROM member_subscriptions WHERE id = $1")
        .bind(member_subscription_id)
        .fetch_one(pool)
        .await
        .unwrap();
    status
}

pub fn days_ago(days: i64) -> NaiveDate {
    today() - Duration::days(days)
}
