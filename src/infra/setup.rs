use crate::{
    adapters::{email::notification_sender::HttpNotificationSender, http::app_state::AppState},
    domain::entities::plan_catalog::PlanCatalog,
    infra::{
        config::AppConfig,
        http_client::{NOTIFICATION_REQUEST_TIMEOUT, try_build_client, try_build_client_with_timeout},
        postgres_persistence,
        stripe_client::StripeClient,
    },
    use_cases::{
        notification::{NotificationOutboxRepo, NotificationUseCases},
        reconciliation::{
            BillingEventLedger, BillingReconciler, PlanRepo, SubscriptionRepo, TenantDirectory,
        },
    },
};
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;

    let postgres_arc = Arc::new(
        postgres_persistence(&config.database_url, config.database_max_connections).await?,
    );

    let stripe = Arc::new(StripeClient::new(
        try_build_client()?,
        config.stripe_secret_key.clone(),
    ));

    let sender = Arc::new(HttpNotificationSender::new(
        try_build_client_with_timeout(NOTIFICATION_REQUEST_TIMEOUT)?,
        config.notification_sender_url.clone(),
        config.service_role_key.clone(),
    ));

    let notification_use_cases = Arc::new(NotificationUseCases::new(
        postgres_arc.clone() as Arc<dyn NotificationOutboxRepo>,
        sender,
    ));

    let reconciler = BillingReconciler::new(
        stripe,
        postgres_arc.clone() as Arc<dyn TenantDirectory>,
        postgres_arc.clone() as Arc<dyn PlanRepo>,
        postgres_arc.clone() as Arc<dyn SubscriptionRepo>,
        postgres_arc.clone() as Arc<dyn BillingEventLedger>,
        notification_use_cases.clone(),
        PlanCatalog::default(),
    );

    if !config.webhook_verification.is_enforced() {
        tracing::warn!("Starting with unsigned webhooks accepted");
    }

    Ok(AppState {
        config: Arc::new(config),
        reconciler: Arc::new(reconciler),
        notification_use_cases,
    })
}

/// Console logs always; JSON logs too when `LOG_FILE` names a writable path.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "synapse_billing=debug,tower_http=debug".into());

    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    let json_layer = std::env::var("LOG_FILE")
        .ok()
        .and_then(|path| File::create(path).ok())
        .map(|file| {
            fmt::layer()
                .json()
                .with_writer(file)
                .with_current_span(true)
                .with_span_list(true)
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
