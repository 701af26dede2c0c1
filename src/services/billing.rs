//! Gym billing: the gym's own subscription to the platform, kept current by
//! signed webhooks from the payment provider.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use url::Url;
use uuid::Uuid;

use crate::models::gym::{BillingStatus, Gym};
use crate::services::signature::{self, SignatureError};

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(thiserror::Error, Debug)]
pub enum WebhookError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum BillingEvent {
    #[serde(rename = "subscription.renewed")]
    Renewed {
        gym_id: Uuid,
        period_end: DateTime<Utc>,
    },

    #[serde(rename = "subscription.cancelled")]
    Cancelled { gym_id: Uuid },

    #[serde(other)]
    Unknown,
}

/// Verifies the provider's signature over the raw body, then parses the event
pub fn parse_event(body: &[u8], signature_header: Option<&str>, secret: &str) -> Result<BillingEvent, WebhookError> {
    let sig = signature_header.ok_or(WebhookError::MissingSignature)?;
    signature::verify(body, sig, secret.as_bytes())?;
    Ok(serde_json::from_slice(body)?)
}

/// Applies an event; returns the updated gym, or None when nothing changed
pub async fn apply_event(pool: &PgPool, event: &BillingEvent) -> Result<Option<Gym>, sqlx::Error> {
    let gym = match event {
        BillingEvent::Renewed { gym_id, period_end } => {
            Gym::set_billing(pool, *gym_id, BillingStatus::Active, Some(*period_end)).await?
        }
        BillingEvent::Cancelled { gym_id } => {
            Gym::set_billing(pool, *gym_id, BillingStatus::Cancelled, None).await?
        }
        BillingEvent::Unknown => {
            tracing::debug!("Ignoring unhandled billing event");
            return Ok(None);
        }
    };

    match &gym {
        Some(gym) => tracing::info!(
            gym_id = %gym.id,
            billing_status = %gym.billing_status,
            period_end = %gym.billing_period_end,
            "Gym billing updated"
        ),
        None => tracing::warn!(?event, "Billing event for unknown gym"),
    }

    Ok(gym)
}

/// Hosted checkout link for a gym
pub fn checkout_url(base: &str, gym_id: Uuid, email: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair("client_reference_id", &gym_id.to_string())
        .append_pair("prefilled_email", email);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    fn signed(body: &str) -> String {
        signature::sign(body.as_bytes(), SECRET.as_bytes())
    }

    #[test]
    fn test_renewed_event() {
        let gym_id = Uuid::new_v4();
        let body = format!(
            r#"{{"type":"subscription.renewed","gym_id":"{}","period_end":"2025-02-01T00:00:00Z"}}"#,
            gym_id
        );

        let event = parse_event(body.as_bytes(), Some(&signed(&body)), SECRET).unwrap();

        assert_eq!(
            event,
            BillingEvent::Renewed {
                gym_id,
                period_end: "2025-02-01T00:00:00Z".parse().unwrap(),
            }
        );
    }

    #[test]
    fn test_unknown_event_type_is_accepted() {
        let body = r#"{"type":"invoice.created","id":"in_1"}"#;
        let event = parse_event(body.as_bytes(), Some(&signed(body)), SECRET).unwrap();
        assert_eq!(event, BillingEvent::Unknown);
    }

    #[test]
    fn test_missing_signature() {
        let body = r#"{"type":"subscription.cancelled"}"#;
        assert!(matches!(
            parse_event(body.as_bytes(), None, SECRET),
            Err(WebhookError::MissingSignature)
        ));
    }

    #[test]
    fn test_bad_signature() {
        let gym_id = Uuid::new_v4();
        let body = format!(r#"{{"type":"subscription.cancelled","gym_id":"{}"}}"#, gym_id);
        let forged = signature::sign(body.as_bytes(), b"other-secret");

        assert!(matches!(
            parse_event(body.as_bytes(), Some(&forged), SECRET),
            Err(WebhookError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_checkout_url() {
        let gym_id = Uuid::nil();
        let url = checkout_url("https://pay.example.com/c/plan_1?locale=en", gym_id, "o@g.com").unwrap();

        assert_eq!(
            url,
            "https://pay.example.com/c/plan_1?locale=en&client_reference_id=00000000-0000-0000-0000-000000000000&prefilled_email=o%40g.com"
        );
    }
}
