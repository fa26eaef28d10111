//! Pure mapping from a classified billing event to the work it requires.
//!
//! Nothing here touches the network or the store, so every branch can be
//! checked without a server.

use crate::domain::entities::{
    billing_event::{BillingEventKind, SubscriptionObject},
    notification::NotificationKind,
};

#[derive(Debug, Clone)]
pub enum ReconciliationAction {
    /// Subscription checkout finished: fetch the subscription, sync, welcome email.
    SyncFromCheckout {
        subscription_id: String,
        customer_id: Option<String>,
        email: Option<String>,
        customer_name: Option<String>,
    },
    /// Subscription changed: fetch the customer, sync, maybe send a cancellation notice.
    SyncFromSubscription {
        subscription: SubscriptionObject,
        notify_cancellation: bool,
    },
    /// Subscription ended: soft-cancel the local row.
    MarkCanceled { subscription_id: String },
    /// Invoice outcome: email only.
    Notify {
        kind: NotificationKind,
        email: Option<String>,
        customer_name: Option<String>,
        product_id: Option<String>,
    },
    /// Recognised but deliberately not acted on.
    LogOnly { reason: &'static str },
    Ignore { reason: String },
}

impl ReconciliationAction {
    pub fn name(&self) -> &'static str {
        match self {
            ReconciliationAction::SyncFromCheckout { .. } => "sync_from_checkout",
            ReconciliationAction::SyncFromSubscription { .. } => "sync_from_subscription",
            ReconciliationAction::MarkCanceled { .. } => "mark_canceled",
            ReconciliationAction::Notify { .. } => "notify",
            ReconciliationAction::LogOnly { .. } => "log_only",
            ReconciliationAction::Ignore { .. } => "ignore",
        }
    }
}

pub fn plan_action(kind: BillingEventKind) -> ReconciliationAction {
    match kind {
        BillingEventKind::CheckoutCompleted(session) => {
            if !session.is_subscription_mode() {
                return ReconciliationAction::Ignore {
                    reason: format!(
                        "checkout mode {} is not a subscription",
                        session.mode.as_deref().unwrap_or("unknown")
                    ),
                };
            }
            let email = session.email().map(str::to_string);
            let customer_name = session.customer_name().map(str::to_string);
            match session.subscription {
                Some(subscription_id) => ReconciliationAction::SyncFromCheckout {
                    subscription_id,
                    customer_id: session.customer,
                    email,
                    customer_name,
                },
                None => ReconciliationAction::Ignore {
                    reason: "subscription checkout without subscription reference".into(),
                },
            }
        }
        BillingEventKind::SubscriptionCreated(_) => ReconciliationAction::LogOnly {
            reason: "subscription creation is synced by checkout completion",
        },
        BillingEventKind::SubscriptionUpdated(subscription) => {
            let notify_cancellation = subscription.cancel_at_period_end;
            ReconciliationAction::SyncFromSubscription {
                subscription,
                notify_cancellation,
            }
        }
        BillingEventKind::SubscriptionDeleted(subscription) => {
            ReconciliationAction::MarkCanceled {
                subscription_id: subscription.id,
            }
        }
        BillingEventKind::InvoicePaid(invoice) => {
            if !invoice.is_subscription_cycle() {
                return ReconciliationAction::Ignore {
                    reason: format!(
                        "invoice billing reason {} is not a renewal",
                        invoice.billing_reason.as_deref().unwrap_or("unknown")
                    ),
                };
            }
            ReconciliationAction::Notify {
                kind: NotificationKind::PaymentSuccess,
                product_id: invoice.product_id().map(str::to_string),
                email: invoice.customer_email,
                customer_name: invoice.customer_name,
            }
        }
        BillingEventKind::InvoicePaymentFailed(invoice) => ReconciliationAction::Notify {
            kind: NotificationKind::PaymentFailed,
            product_id: invoice.product_id().map(str::to_string),
            email: invoice.customer_email,
            customer_name: invoice.customer_name,
        },
        BillingEventKind::Unknown(event_type) => ReconciliationAction::Ignore {
            reason: format!("unhandled event type {}", event_type),
        },
    }
}
