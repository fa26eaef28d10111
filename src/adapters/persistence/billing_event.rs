use async_trait::async_trait;
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::{BillingEventLedger, LedgerEntry, LedgerStatus},
};

#[async_trait]
impl BillingEventLedger for PostgresPersistence {
    async fn is_processed(&self, event_id: &str) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM billing_events WHERE event_id = $1 AND status = $2) AS processed",
        )
        .bind(event_id)
        .bind(LedgerStatus::Processed.as_ref())
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.get("processed"))
    }

    async fn record(&self, entry: &LedgerEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_events (event_id, event_type, event_created_at, status, detail)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO UPDATE
            SET status = EXCLUDED.status,
                detail = EXCLUDED.detail,
                delivery_count = billing_events.delivery_count + 1,
                updated_at = NOW()
            "#,
        )
        .bind(&entry.event_id)
        .bind(&entry.event_type)
        .bind(entry.event_created_at)
        .bind(entry.status.as_ref())
        .bind(&entry.detail)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}
