use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::notification::{NotificationOutboxRepo, PendingNotification},
    domain::entities::notification::{NotificationRequest, NotificationStatus},
};

#[async_trait]
impl NotificationOutboxRepo for PostgresPersistence {
    async fn enqueue(
        &self,
        source_event_id: &str,
        request: &NotificationRequest,
    ) -> AppResult<Option<Uuid>> {
        let payload = serde_json::to_string(request)
            .map_err(|e| AppError::Internal(format!("Failed to encode notification: {}", e)))?;

        let row = sqlx::query(
            r#"
            INSERT INTO notification_outbox (source_event_id, recipient, kind, payload_raw, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_event_id, kind) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(source_event_id)
        .bind(&request.to)
        .bind(request.kind.as_ref())
        .bind(payload)
        .bind(NotificationStatus::Pending.as_ref())
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(|r| r.get("id")))
    }

    async fn claim_pending_batch(&self, limit: i64) -> AppResult<Vec<PendingNotification>> {
        let rows = sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'in_progress', locked_at = NOW()
            WHERE id IN (
                SELECT id FROM notification_outbox
                WHERE status = 'pending' AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, payload_raw, attempt_count
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.get("id");
            let attempt_count: i32 = row.get("attempt_count");
            let payload: String = row.get("payload_raw");

            match serde_json::from_str::<NotificationRequest>(&payload) {
                Ok(request) => claimed.push(PendingNotification {
                    id,
                    request,
                    attempt_count,
                }),
                Err(e) => {
                    tracing::error!(notification_id = %id, error = %e, "Undecodable outbox payload");
                    self.mark_abandoned(id, attempt_count, "undecodable payload")
                        .await?;
                }
            }
        }

        Ok(claimed)
    }

    async fn mark_sent(&self, id: Uuid, attempt_count: i32) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'sent',
                attempt_count = $2,
                locked_at = NULL,
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempt_count)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        attempt_count: i32,
        next_attempt_at: NaiveDateTime,
        error: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'pending',
                attempt_count = $2,
                next_attempt_at = $3,
                locked_at = NULL,
                last_error = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempt_count)
        .bind(next_attempt_at)
        .bind(error)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn mark_abandoned(&self, id: Uuid, attempt_count: i32, error: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'abandoned',
                attempt_count = $2,
                locked_at = NULL,
                last_error = $3,
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempt_count)
        .bind(error)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn release_stale(&self, threshold_secs: i64) -> AppResult<i64> {
        let result = sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'pending',
                locked_at = NULL
            WHERE status = 'in_progress'
              AND locked_at < NOW() - make_interval(secs => $1::double precision)
            "#,
        )
        .bind(threshold_secs)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() as i64)
    }
}
