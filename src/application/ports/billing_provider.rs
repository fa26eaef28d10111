use async_trait::async_trait;

use crate::{
    app_error::AppResult,
    domain::entities::billing_event::{CustomerObject, SubscriptionObject},
};

/// Read access to the billing provider's API.
///
/// Webhook payloads can be partial or stale, so the reconciler re-fetches the
/// authoritative objects through this port.
#[async_trait]
pub trait BillingProviderPort: Send + Sync {
    async fn get_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionObject>;

    async fn get_customer(&self, customer_id: &str) -> AppResult<CustomerObject>;
}
