use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::{SubscriptionRepo, SubscriptionWrite},
    domain::entities::subscription::{SubscriptionSnapshot, SubscriptionStatus},
};

fn row_to_snapshot(row: &sqlx::postgres::PgRow) -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        plan_id: row.get("plan_id"),
        billing_customer_id: row.get("billing_customer_id"),
        billing_subscription_id: row.get("billing_subscription_id"),
        status: SubscriptionStatus::from_stripe(row.get::<&str, _>("status")),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        cancel_at_period_end: row.get("cancel_at_period_end"),
        last_event_at: row.get("last_event_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, workspace_id, plan_id, billing_customer_id, billing_subscription_id,
    status, current_period_start, current_period_end, cancel_at_period_end,
    last_event_at, created_at, updated_at
"#;

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn get_by_workspace(&self, workspace_id: Uuid) -> AppResult<Option<SubscriptionSnapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE workspace_id = $1",
            SELECT_COLS
        ))
        .bind(workspace_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_snapshot))
    }

    async fn get_by_billing_subscription_id(
        &self,
        billing_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionSnapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE billing_subscription_id = $1",
            SELECT_COLS
        ))
        .bind(billing_subscription_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_snapshot))
    }

    async fn insert(&self, input: &SubscriptionWrite) -> AppResult<Option<SubscriptionSnapshot>> {
        // A concurrent delivery for the same workspace may have inserted first.
        // The conflict branch then behaves like `update`, watermark included.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO subscriptions (
                workspace_id, plan_id, billing_customer_id, billing_subscription_id,
                status, current_period_start, current_period_end, cancel_at_period_end,
                last_event_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (workspace_id) DO UPDATE
            SET plan_id = EXCLUDED.plan_id,
                billing_customer_id = EXCLUDED.billing_customer_id,
                billing_subscription_id = EXCLUDED.billing_subscription_id,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                last_event_at = COALESCE(EXCLUDED.last_event_at, subscriptions.last_event_at),
                updated_at = NOW()
            WHERE subscriptions.last_event_at IS NULL
               OR EXCLUDED.last_event_at IS NULL
               OR subscriptions.last_event_at <= EXCLUDED.last_event_at
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(input.workspace_id)
        .bind(input.plan_id)
        .bind(&input.billing_customer_id)
        .bind(&input.billing_subscription_id)
        .bind(input.status.as_str())
        .bind(input.current_period_start)
        .bind(input.current_period_end)
        .bind(input.cancel_at_period_end)
        .bind(input.last_event_at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_snapshot))
    }

    async fn update(
        &self,
        id: Uuid,
        input: &SubscriptionWrite,
    ) -> AppResult<Option<SubscriptionSnapshot>> {
        // The watermark check is repeated here so a newer write that lands
        // between read and update is never overwritten.
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscriptions
            SET plan_id = $2,
                billing_customer_id = $3,
                billing_subscription_id = $4,
                status = $5,
                current_period_start = $6,
                current_period_end = $7,
                cancel_at_period_end = $8,
                last_event_at = COALESCE($9, last_event_at),
                updated_at = NOW()
            WHERE id = $1
              AND ($9::timestamp IS NULL OR last_event_at IS NULL OR last_event_at <= $9)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(input.plan_id)
        .bind(&input.billing_customer_id)
        .bind(&input.billing_subscription_id)
        .bind(input.status.as_str())
        .bind(input.current_period_start)
        .bind(input.current_period_end)
        .bind(input.cancel_at_period_end)
        .bind(input.last_event_at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_snapshot))
    }

    async fn mark_canceled(
        &self,
        id: Uuid,
        event_at: Option<NaiveDateTime>,
    ) -> AppResult<Option<SubscriptionSnapshot>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscriptions
            SET status = $2,
                last_event_at = COALESCE($3, last_event_at),
                updated_at = NOW()
            WHERE id = $1
              AND ($3::timestamp IS NULL OR last_event_at IS NULL OR last_event_at <= $3)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(SubscriptionStatus::Canceled.as_str())
        .bind(event_at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_snapshot))
    }
}
