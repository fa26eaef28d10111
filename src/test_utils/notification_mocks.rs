//! In-memory outbox and scripted sender for notification tests.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::notification::{NotificationRequest, NotificationStatus},
    use_cases::notification::{
        DeliveryFailure, NotificationOutboxRepo, NotificationSender, PendingNotification,
    },
};

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: Uuid,
    pub source_event_id: String,
    pub request: NotificationRequest,
    pub status: NotificationStatus,
    pub attempt_count: i32,
    pub next_attempt_at: NaiveDateTime,
    pub locked_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
}

// ============================================================================
// InMemoryNotificationOutbox
// ============================================================================

#[derive(Default)]
pub struct InMemoryNotificationOutbox {
    pub rows: Mutex<Vec<OutboxRow>>,
    fail_enqueue: AtomicBool,
}

impl InMemoryNotificationOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_enqueue(&self) {
        self.fail_enqueue.store(true, Ordering::SeqCst);
    }

    /// Every request ever queued, in insertion order.
    pub fn requests(&self) -> Vec<NotificationRequest> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.request.clone())
            .collect()
    }

    pub fn status_of(&self, id: Uuid) -> Option<NotificationStatus> {
        self.find(id).map(|r| r.status)
    }

    pub fn attempts_of(&self, id: Uuid) -> Option<i32> {
        self.find(id).map(|r| r.attempt_count)
    }

    /// Pretend the row was claimed `secs_ago` seconds ago.
    pub fn lock_row(&self, id: Uuid, secs_ago: i64) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.status = NotificationStatus::InProgress;
            row.locked_at = Some(now() - chrono::Duration::seconds(secs_ago));
        }
    }

    fn find(&self, id: Uuid) -> Option<OutboxRow> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut OutboxRow)) -> AppResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.iter_mut().find(|r| r.id == id).ok_or(AppError::NotFound)?;
        f(row);
        Ok(())
    }
}

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

#[async_trait]
impl NotificationOutboxRepo for InMemoryNotificationOutbox {
    async fn enqueue(
        &self,
        source_event_id: &str,
        request: &NotificationRequest,
    ) -> AppResult<Option<Uuid>> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(AppError::Database("Database operation failed".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|r| r.source_event_id == source_event_id && r.request.kind == request.kind)
        {
            return Ok(None);
        }
        let id = Uuid::new_v4();
        rows.push(OutboxRow {
            id,
            source_event_id: source_event_id.to_string(),
            request: request.clone(),
            status: NotificationStatus::Pending,
            attempt_count: 0,
            next_attempt_at: now(),
            locked_at: None,
            last_error: None,
        });
        Ok(Some(id))
    }

    async fn claim_pending_batch(&self, limit: i64) -> AppResult<Vec<PendingNotification>> {
        let now = now();
        let mut rows = self.rows.lock().unwrap();
        let claimed = rows
            .iter_mut()
            .filter(|r| r.status == NotificationStatus::Pending && r.next_attempt_at <= now)
            .take(limit.max(0) as usize)
            .map(|r| {
                r.status = NotificationStatus::InProgress;
                r.locked_at = Some(now);
                PendingNotification {
                    id: r.id,
                    request: r.request.clone(),
                    attempt_count: r.attempt_count,
                }
            })
            .collect();
        Ok(claimed)
    }

    async fn mark_sent(&self, id: Uuid, attempt_count: i32) -> AppResult<()> {
        self.update(id, |r| {
            r.status = NotificationStatus::Sent;
            r.attempt_count = attempt_count;
            r.locked_at = None;
        })
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        attempt_count: i32,
        next_attempt_at: NaiveDateTime,
        error: &str,
    ) -> AppResult<()> {
        self.update(id, |r| {
            r.status = NotificationStatus::Pending;
            r.attempt_count = attempt_count;
            r.next_attempt_at = next_attempt_at;
            r.locked_at = None;
            r.last_error = Some(error.to_string());
        })
    }

    async fn mark_abandoned(&self, id: Uuid, attempt_count: i32, error: &str) -> AppResult<()> {
        self.update(id, |r| {
            r.status = NotificationStatus::Abandoned;
            r.attempt_count = attempt_count;
            r.locked_at = None;
            r.last_error = Some(error.to_string());
        })
    }

    async fn release_stale(&self, threshold_secs: i64) -> AppResult<i64> {
        let cutoff = now() - chrono::Duration::seconds(threshold_secs);
        let mut released = 0;
        for row in self.rows.lock().unwrap().iter_mut() {
            if row.status == NotificationStatus::InProgress
                && row.locked_at.is_some_and(|at| at < cutoff)
            {
                row.status = NotificationStatus::Pending;
                row.locked_at = None;
                released += 1;
            }
        }
        Ok(released)
    }
}

// ============================================================================
// ScriptedNotificationSender
// ============================================================================

/// Sender that records every request and answers with a fixed result.
#[derive(Default)]
pub struct ScriptedNotificationSender {
    failure: Option<DeliveryFailure>,
    sent: Mutex<Vec<NotificationRequest>>,
}

impl ScriptedNotificationSender {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing(failure: DeliveryFailure) -> Self {
        Self {
            failure: Some(failure),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for ScriptedNotificationSender {
    async fn send(&self, request: &NotificationRequest) -> Result<(), DeliveryFailure> {
        self.sent.lock().unwrap().push(request.clone());
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}
