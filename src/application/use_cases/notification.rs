use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::notification::{NotificationRequest, NotificationStatus},
};

// ============================================================================
// Constants
// ============================================================================

pub const MAX_NOTIFICATION_ATTEMPTS: i32 = 6;
pub const STALE_LOCK_THRESHOLD_SECS: i64 = 300; // 5 minutes
const ERROR_CAP: usize = 1024;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct PendingNotification {
    pub id: Uuid,
    pub request: NotificationRequest,
    /// Attempts made before this claim.
    pub attempt_count: i32,
}

/// Why a single delivery attempt failed.
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    /// HTTP status from the sender, `None` for transport errors.
    pub status: Option<u16>,
    pub message: String,
}

impl DeliveryFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// 4xx responses won't succeed on retry, except the retryable ones.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            Some(status) if (400..500).contains(&status) => !matches!(status, 408 | 409 | 429),
            _ => false,
        }
    }
}

// ============================================================================
// Ports
// ============================================================================

#[async_trait]
pub trait NotificationOutboxRepo: Send + Sync {
    /// At most one row per `(source_event_id, kind)`. Returns `None` when the
    /// event already queued this kind of notification.
    async fn enqueue(
        &self,
        source_event_id: &str,
        request: &NotificationRequest,
    ) -> AppResult<Option<Uuid>>;

    /// Lock up to `limit` due rows and mark them in progress.
    async fn claim_pending_batch(&self, limit: i64) -> AppResult<Vec<PendingNotification>>;

    async fn mark_sent(&self, id: Uuid, attempt_count: i32) -> AppResult<()>;

    async fn mark_failed(
        &self,
        id: Uuid,
        attempt_count: i32,
        next_attempt_at: NaiveDateTime,
        error: &str,
    ) -> AppResult<()>;

    async fn mark_abandoned(&self, id: Uuid, attempt_count: i32, error: &str) -> AppResult<()>;

    /// Return rows stuck in progress for longer than `threshold_secs` to pending.
    async fn release_stale(&self, threshold_secs: i64) -> AppResult<i64>;
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, request: &NotificationRequest) -> Result<(), DeliveryFailure>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct NotificationUseCases {
    outbox: Arc<dyn NotificationOutboxRepo>,
    sender: Arc<dyn NotificationSender>,
}

impl NotificationUseCases {
    pub fn new(outbox: Arc<dyn NotificationOutboxRepo>, sender: Arc<dyn NotificationSender>) -> Self {
        Self { outbox, sender }
    }

    pub async fn enqueue(
        &self,
        source_event_id: &str,
        request: &NotificationRequest,
    ) -> AppResult<Option<Uuid>> {
        let id = self.outbox.enqueue(source_event_id, request).await?;
        match id {
            Some(id) => info!(
                notification_id = %id,
                kind = %request.kind,
                source_event_id,
                "Queued notification"
            ),
            None => info!(
                kind = %request.kind,
                source_event_id,
                "Notification already queued for this event"
            ),
        }
        Ok(id)
    }

    pub async fn claim_pending(&self, limit: i64) -> AppResult<Vec<PendingNotification>> {
        self.outbox.claim_pending_batch(limit).await
    }

    /// Send one claimed notification and record the result.
    pub async fn deliver(&self, pending: &PendingNotification) -> AppResult<NotificationStatus> {
        let attempt = pending.attempt_count + 1;

        match self.sender.send(&pending.request).await {
            Ok(()) => {
                self.outbox.mark_sent(pending.id, attempt).await?;
                info!(
                    notification_id = %pending.id,
                    kind = %pending.request.kind,
                    attempt,
                    "Notification delivered"
                );
                Ok(NotificationStatus::Sent)
            }
            Err(failure) => self.record_failure(pending.id, attempt, &failure).await,
        }
    }

    async fn record_failure(
        &self,
        id: Uuid,
        attempt: i32,
        failure: &DeliveryFailure,
    ) -> AppResult<NotificationStatus> {
        let message: String = failure.message.chars().take(ERROR_CAP).collect();
        let message = message.as_str();

        if failure.is_terminal() || attempt >= MAX_NOTIFICATION_ATTEMPTS {
            error!(
                notification_id = %id,
                attempt,
                status = ?failure.status,
                error = message,
                "Abandoning notification"
            );
            self.outbox.mark_abandoned(id, attempt, message).await?;
            Ok(NotificationStatus::Abandoned)
        } else {
            let delay = calculate_backoff_delay(attempt);
            let next_attempt = chrono::Utc::now().naive_utc() + chrono::Duration::seconds(delay);
            warn!(
                notification_id = %id,
                attempt,
                retry_in_secs = delay,
                status = ?failure.status,
                error = message,
                "Notification delivery failed, will retry"
            );
            self.outbox
                .mark_failed(id, attempt, next_attempt, message)
                .await?;
            Ok(NotificationStatus::Pending)
        }
    }

    pub async fn release_stale(&self) -> AppResult<i64> {
        self.outbox.release_stale(STALE_LOCK_THRESHOLD_SECS).await
    }
}

// ============================================================================
// Backoff Calculation
// ============================================================================

pub fn calculate_backoff_delay(attempt_count: i32) -> i64 {
    let base_delay: i64 = 60;
    let max_delay: i64 = 7_200; // 2 hours
    let exponent = attempt_count.saturating_sub(1).max(0) as u32;
    let exponential = base_delay.saturating_mul(4i64.saturating_pow(exponent));
    let capped = exponential.min(max_delay);
    let jitter = (rand::random::<u64>() % 30) as i64;
    capped + jitter
}
