use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::TenantDirectory,
};

#[async_trait]
impl TenantDirectory for PostgresPersistence {
    async fn find_user_id_by_email(&self, email: &str) -> AppResult<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM users WHERE email = $1 LIMIT 1")
            .bind(email)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(row.map(|r| r.get("id")))
    }

    async fn current_workspace_id(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        let row = sqlx::query("SELECT current_workspace_id FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(row.and_then(|r| r.get::<Option<Uuid>, _>("current_workspace_id")))
    }

    async fn owned_workspace_id(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        let row = sqlx::query(
            "SELECT id FROM workspaces WHERE owner_id = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.map(|r| r.get("id")))
    }
}
