use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Transactional email templates understood by the notification sender.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    SubscriptionCreated,
    SubscriptionCanceled,
    PaymentSuccess,
    PaymentFailed,
}

/// Body posted to the notification sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub to: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_name: Option<String>,
    /// ISO-8601 period end, used as the effective date for cancellations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
}

impl NotificationRequest {
    pub fn new(to: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            to: to.into(),
            kind,
            plan_name: None,
            subscription_end: None,
            customer_name: None,
        }
    }

    pub fn plan_name(mut self, plan_name: Option<String>) -> Self {
        self.plan_name = plan_name;
        self
    }

    pub fn subscription_end(mut self, period_end: Option<NaiveDateTime>) -> Self {
        self.subscription_end = period_end.map(|end| end.and_utc().to_rfc3339());
        self
    }

    pub fn customer_name(mut self, customer_name: Option<&str>) -> Self {
        self.customer_name = customer_name.map(str::to_string);
        self
    }
}

/// Lifecycle of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    InProgress,
    Sent,
    Abandoned,
}
