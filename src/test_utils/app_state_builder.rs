//! Test app state builder for HTTP-level integration testing.
//!
//! `TestAppStateBuilder` wires an `AppState` around a [`BillingFixture`] so
//! route tests can drive the webhook endpoint and then inspect the in-memory
//! stores directly.

use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    infra::config::{AppConfig, WebhookVerification},
    test_utils::BillingFixture,
};

/// Signing secret used by enforced-mode test states.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

pub struct TestAppStateBuilder {
    fixture: Option<BillingFixture>,
    webhook_verification: WebhookVerification,
}

impl TestAppStateBuilder {
    /// Enforced signature checking with [`TEST_WEBHOOK_SECRET`].
    pub fn new() -> Self {
        Self {
            fixture: None,
            webhook_verification: WebhookVerification::Enforced {
                secret: SecretString::new(TEST_WEBHOOK_SECRET.into()),
                tolerance_secs: 300,
            },
        }
    }

    /// Skip signature checking, as with `ALLOW_UNSIGNED_WEBHOOKS=true`.
    pub fn unsigned(mut self) -> Self {
        self.webhook_verification = WebhookVerification::Unsigned;
        self
    }

    /// Use a pre-seeded fixture instead of a fresh one.
    pub fn with_fixture(mut self, fixture: BillingFixture) -> Self {
        self.fixture = Some(fixture);
        self
    }

    /// Returns the state plus the fixture whose stores back it.
    pub fn build(self) -> (AppState, BillingFixture) {
        let fixture = self.fixture.unwrap_or_default();

        let notification_use_cases = Arc::new(fixture.notification_use_cases());
        let reconciler = Arc::new(fixture.reconciler());

        let config = Arc::new(AppConfig {
            bind_addr: "127.0.0.1:3001".parse::<SocketAddr>().unwrap(),
            database_url: String::new(),
            database_max_connections: 1,
            service_role_key: SecretString::new("test_service_role_key".into()),
            stripe_secret_key: SecretString::new("sk_test_123".into()),
            webhook_verification: self.webhook_verification,
            notification_sender_url: Url::parse("http://localhost:54321/functions/v1/send-email")
                .unwrap(),
            outbox_poll_interval_secs: 5,
        });

        let app_state = AppState {
            config,
            reconciler,
            notification_use_cases,
        };

        (app_state, fixture)
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
