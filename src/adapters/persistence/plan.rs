use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::PlanRepo,
};

#[async_trait]
impl PlanRepo for PostgresPersistence {
    async fn get_plan_id_by_slug(&self, slug: &str) -> AppResult<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM plans WHERE slug = $1")
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(row.map(|r| r.get("id")))
    }
}
