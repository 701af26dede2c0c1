use secrecy::Secret;
use serde::Deserialize;

const DEFAULT_STORAGE_BUCKET: &str = "member-photos";
const DEFAULT_EXPIRY_SWEEP_SCHEDULE: &str = "0 5 0 * * *";
const DEFAULT_TRIAL_DAYS: i64 = 14;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,

    // Hosted auth API
    pub auth_api_url: String,
    pub auth_api_key: Secret<String>,

    // Hosted object storage (member photos)
    pub storage_api_url: Option<String>,
    pub storage_service_key: Option<Secret<String>>,
    pub storage_bucket: String,

    // Security
    pub session_secret: Secret<String>,
    pub cron_secret: Secret<String>,

    // Gym billing (payment provider)
    pub billing_webhook_secret: Secret<String>,
    pub billing_checkout_url: Option<String>,
    pub trial_days: i64,

    // Background jobs
    pub expiry_sweep_schedule: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            base_url: config.get("base_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            auth_api_url: config.get("auth_api_url")?,
            auth_api_key: Secret::new(config.get("auth_api_key")?),

            storage_api_url: config.get("storage_api_url").ok(),
            storage_service_key: config
                .get::<String>("storage_service_key")
                .ok()
                .map(Secret::new),
            storage_bucket: config
                .get("storage_bucket")
                .unwrap_or_else(|_| DEFAULT_STORAGE_BUCKET.to_string()),

            session_secret: Secret::new(config.get("session_secret")?),
            cron_secret: Secret::new(config.get("cron_secret")?),

            billing_webhook_secret: Secret::new(config.get("billing_webhook_secret")?),
            billing_checkout_url: config.get("billing_checkout_url").ok(),
            trial_days: config.get("trial_days").unwrap_or(DEFAULT_TRIAL_DAYS),

            expiry_sweep_schedule: config
                .get("expiry_sweep_schedule")
                .unwrap_or_else(|_| DEFAULT_EXPIRY_SWEEP_SCHEDULE.to_string()),
        })
    }

    /// Session cookies are only marked secure when served over HTTPS
    pub fn uses_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Builds an absolute URL under the public base URL
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/gymdesk_test".to_string(),
        base_url: "http://localhost:3000/".to_string(),
        host: "127.0.0.1".to_string(),
        port: 3000,
        auth_api_url: "http://localhost:9999".to_string(),
        auth_api_key: Secret::new("anon-key".to_string()),
        storage_api_url: None,
        storage_service_key: None,
        storage_bucket: DEFAULT_STORAGE_BUCKET.to_string(),
        session_secret: Secret::new("test-session-secret".to_string()),
        cron_secret: Secret::new("test-cron-secret".to_string()),
        billing_webhook_secret: Secret::new("test-webhook-secret".to_string()),
        billing_checkout_url: Some("https://pay.example.com/checkout".to_string()),
        trial_days: DEFAULT_TRIAL_DAYS,
        expiry_sweep_schedule: DEFAULT_EXPIRY_SWEEP_SCHEDULE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url_trims_trailing_slash() {
        let config = test_config();
        assert_eq!(
            config.absolute_url("/invitations/abc"),
            "http://localhost:3000/invitations/abc"
        );
    }

    #[test]
    fn test_uses_https() {
        let mut config = test_config();
        assert!(!config.uses_https());
        config.base_url = "https://gym.example.com".to_string();
        assert!(config.uses_https());
    }
}
