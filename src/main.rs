use dotenvy::dotenv;
use std::time::Duration;
use tracing::info;

use synapse_billing::infra::{
    app::create_app,
    notification_outbox_worker::run_notification_outbox_loop,
    setup::{init_app_state, init_tracing},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let app_state = init_app_state().await?;

    let bind_addr = app_state.config.bind_addr;
    let poll_interval = Duration::from_secs(app_state.config.outbox_poll_interval_secs.max(1));

    let notification_use_cases = app_state.notification_use_cases.clone();
    tokio::spawn(async move {
        run_notification_outbox_loop(notification_use_cases, poll_interval).await;
    });

    let app = create_app(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Billing webhook listening at {}", &listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
