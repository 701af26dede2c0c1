use axum::extract::FromRef;
use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::Config;
use crate::services::{auth_client::AuthClient, storage::StorageClient};

/// Session keys used in the application
pub const SESSION_KEY_USER_ID: &str = "user_id";
pub const SESSION_KEY_EMAIL: &str = "email";
pub const SESSION_KEY_ACCESS_TOKEN: &str = "access_token";

/// Creates a session layer for Axum
pub async fn create_session_layer(
    pool: PgPool,
    secure: bool,
) -> Result<SessionManagerLayer<PostgresStore>, sqlx::Error> {
    // Create the session store backed by PostgreSQL
    let session_store = PostgresStore::new(pool);
    session_store.migrate().await?;

    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(24)));

    Ok(session_layer)
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub auth: AuthClient,
    pub storage: Option<StorageClient>,
    /// HMAC key for member badges
    pub badge_key: [u8; 32],
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        use secrecy::ExposeSecret;

        let auth = AuthClient::new(&config.auth_api_url, config.auth_api_key.clone());

        let storage = match (&config.storage_api_url, &config.storage_service_key) {
            (Some(url), Some(key)) => Some(StorageClient::new(url, &config.storage_bucket, key.clone())),
            _ => None,
        };

        let badge_key = crate::services::signature::derive_key(config.session_secret.expose_secret());

        Self {
            pool,
            config,
            auth,
            storage,
            badge_key,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.pool.clone()
    }
}
