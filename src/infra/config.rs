use std::net::SocketAddr;

use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::infra::{error::InfraError, stripe_client::DEFAULT_WEBHOOK_TOLERANCE_SECS};

/// How incoming webhook bodies are authenticated.
#[derive(Clone)]
pub enum WebhookVerification {
    /// Require a valid `stripe-signature` header.
    Enforced {
        secret: SecretString,
        tolerance_secs: i64,
    },
    /// Development only: bodies are trusted as-is.
    Unsigned,
}

impl WebhookVerification {
    /// Pick the mode from the configured secret and the unsigned opt-in.
    ///
    /// A secret always wins. Without one, unsigned mode must be asked for
    /// explicitly or startup fails.
    pub fn resolve(
        secret: Option<String>,
        allow_unsigned: bool,
        tolerance_secs: i64,
    ) -> Result<Self, InfraError> {
        match secret.filter(|s| !s.trim().is_empty()) {
            Some(secret) => {
                if allow_unsigned {
                    tracing::warn!(
                        "ALLOW_UNSIGNED_WEBHOOKS is ignored because STRIPE_WEBHOOK_SECRET is set"
                    );
                }
                Ok(WebhookVerification::Enforced {
                    secret: SecretString::new(secret.into()),
                    tolerance_secs,
                })
            }
            None if allow_unsigned => {
                tracing::warn!(
                    "Webhook signature verification is DISABLED; do not run this in production"
                );
                Ok(WebhookVerification::Unsigned)
            }
            None => Err(InfraError::Config(
                "STRIPE_WEBHOOK_SECRET is not set (set ALLOW_UNSIGNED_WEBHOOKS=true for local development)"
                    .into(),
            )),
        }
    }

    pub fn is_enforced(&self) -> bool {
        matches!(self, WebhookVerification::Enforced { .. })
    }
}

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    /// Bearer token presented to the notification sender function.
    pub service_role_key: SecretString,
    pub stripe_secret_key: SecretString,
    pub webhook_verification: WebhookVerification,
    pub notification_sender_url: Url,
    pub outbox_poll_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let bind_addr: SocketAddr = get_env_default(
            "BIND_ADDR",
            SocketAddr::from(([127, 0, 0, 1], 3001)),
        );
        let database_url: String = get_env("DATABASE_URL");
        let database_max_connections: u32 = get_env_default("DATABASE_MAX_CONNECTIONS", 5);
        let service_role_key = SecretString::new(get_env::<String>("SERVICE_ROLE_KEY").into());
        let stripe_secret_key = SecretString::new(get_env::<String>("STRIPE_SECRET_KEY").into());

        let webhook_secret: Option<String> = std::env::var("STRIPE_WEBHOOK_SECRET").ok();
        let allow_unsigned: bool = get_env_default("ALLOW_UNSIGNED_WEBHOOKS", false);
        let tolerance_secs: i64 =
            get_env_default("WEBHOOK_TOLERANCE_SECS", DEFAULT_WEBHOOK_TOLERANCE_SECS);
        let webhook_verification =
            WebhookVerification::resolve(webhook_secret, allow_unsigned, tolerance_secs)?;

        let notification_sender_url: Url = get_env("NOTIFICATION_SENDER_URL");
        let outbox_poll_interval_secs: u64 = get_env_default("OUTBOX_POLL_INTERVAL_SECS", 5);

        Ok(Self {
            bind_addr,
            database_url,
            database_max_connections,
            service_role_key,
            stripe_secret_key,
            webhook_verification,
            notification_sender_url,
            outbox_poll_interval_secs,
        })
    }
}
