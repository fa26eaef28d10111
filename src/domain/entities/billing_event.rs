//! Billing provider webhook envelope and the typed payloads we act on.
//!
//! Stripe sends `{ id, type, created, data: { object } }`. The object shape
//! depends on `type`; [`BillingEvent::kind`] turns the envelope into a closed
//! set of variants so dispatch never matches on raw strings.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const CUSTOMER_SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const CUSTOMER_SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const CUSTOMER_SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const INVOICE_PAID: &str = "invoice.paid";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";

/// Convert a Unix timestamp to NaiveDateTime
pub fn timestamp_to_naive(secs: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Provider-side creation time (Unix seconds). Absent in hand-written dev payloads.
    #[serde(default)]
    pub created: i64,
    pub data: BillingEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum BillingEventKind {
    CheckoutCompleted(CheckoutSessionObject),
    SubscriptionCreated(SubscriptionObject),
    SubscriptionUpdated(SubscriptionObject),
    SubscriptionDeleted(SubscriptionObject),
    InvoicePaid(InvoiceObject),
    InvoicePaymentFailed(InvoiceObject),
    Unknown(String),
}

impl BillingEvent {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Classify the event and decode its object.
    ///
    /// Fails only when a recognised event type carries an object that does not
    /// match the expected shape.
    pub fn kind(&self) -> Result<BillingEventKind, serde_json::Error> {
        let object = &self.data.object;
        let kind = match self.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                BillingEventKind::CheckoutCompleted(CheckoutSessionObject::deserialize(object)?)
            }
            CUSTOMER_SUBSCRIPTION_CREATED => {
                BillingEventKind::SubscriptionCreated(SubscriptionObject::deserialize(object)?)
            }
            CUSTOMER_SUBSCRIPTION_UPDATED => {
                BillingEventKind::SubscriptionUpdated(SubscriptionObject::deserialize(object)?)
            }
            CUSTOMER_SUBSCRIPTION_DELETED => {
                BillingEventKind::SubscriptionDeleted(SubscriptionObject::deserialize(object)?)
            }
            INVOICE_PAID => BillingEventKind::InvoicePaid(InvoiceObject::deserialize(object)?),
            INVOICE_PAYMENT_FAILED => {
                BillingEventKind::InvoicePaymentFailed(InvoiceObject::deserialize(object)?)
            }
            other => BillingEventKind::Unknown(other.to_string()),
        };
        Ok(kind)
    }

    /// Creation time used as the ordering watermark, if the provider sent one.
    pub fn occurred_at(&self) -> Option<NaiveDateTime> {
        if self.created > 0 {
            timestamp_to_naive(self.created)
        } else {
            None
        }
    }
}

// ============================================================================
// Payload Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub mode: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
}

impl CheckoutSessionObject {
    pub fn is_subscription_mode(&self) -> bool {
        self.mode.as_deref() == Some("subscription")
    }

    /// Email entered at checkout, falling back to the prefilled one.
    pub fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .or(self.customer_email.as_deref())
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.customer_details.as_ref().and_then(|d| d.name.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
    pub product: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
    // Newer API versions report the billing period per item.
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

impl SubscriptionObject {
    /// Product of the first line item.
    pub fn product_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.product.as_str())
    }

    pub fn period_start(&self) -> Option<NaiveDateTime> {
        self.current_period_start
            .or_else(|| self.items.data.first().and_then(|i| i.current_period_start))
            .and_then(timestamp_to_naive)
    }

    pub fn period_end(&self) -> Option<NaiveDateTime> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|i| i.current_period_end))
            .and_then(timestamp_to_naive)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceLine {
    pub price: Option<Price>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceLines {
    #[serde(default)]
    pub data: Vec<InvoiceLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    pub customer: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub billing_reason: Option<String>,
    pub subscription: Option<String>,
    #[serde(default)]
    pub lines: InvoiceLines,
}

impl InvoiceObject {
    /// Renewal invoices; the first invoice is covered by checkout completion.
    pub fn is_subscription_cycle(&self) -> bool {
        self.billing_reason.as_deref() == Some("subscription_cycle")
    }

    pub fn product_id(&self) -> Option<&str> {
        self.lines
            .data
            .iter()
            .find_map(|line| line.price.as_ref().map(|p| p.product.as_str()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerObject {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}
