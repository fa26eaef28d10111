//! Billing provider webhook endpoint.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    domain::entities::billing_event::BillingEvent,
    infra::{config::WebhookVerification, stripe_client::StripeClient},
    use_cases::reconciliation::ReconciliationReport,
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type, stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook).options(preflight))
}

/// OPTIONS /webhooks/stripe
async fn preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(CORS_ALLOW_HEADERS),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("POST, OPTIONS"),
            ),
        ],
    )
}

/// POST /webhooks/stripe
///
/// 200 once the event is handled (including tenant misses and dropped writes),
/// 400 on a bad signature, 500 when the provider should redeliver.
async fn handle_stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    match &app_state.config.webhook_verification {
        WebhookVerification::Enforced {
            secret,
            tolerance_secs,
        } => {
            let signature = headers
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    warn!("Webhook without stripe-signature header");
                    AppError::InvalidSignature
                })?;
            StripeClient::verify_webhook_signature(
                &body,
                signature,
                secret.expose_secret(),
                *tolerance_secs,
            )?;
        }
        WebhookVerification::Unsigned => {
            warn!("Processing unsigned webhook, signature verification is disabled");
        }
    }

    let event = BillingEvent::from_slice(&body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "Received billing event"
    );

    match app_state.reconciler.handle_event(&event).await? {
        ReconciliationReport::Duplicate => {
            info!(event_id = %event.id, "Duplicate billing event acknowledged");
        }
        ReconciliationReport::Handled(report) => {
            info!(
                event_id = %event.id,
                action = report.action,
                dropped = report.is_dropped(),
                "Billing event handled"
            );
        }
    }

    Ok((StatusCode::OK, Json(json!({ "received": true }))))
}
