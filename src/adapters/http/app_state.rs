use std::sync::Arc;

use crate::{
    infra::config::AppConfig,
    use_cases::{notification::NotificationUseCases, reconciliation::BillingReconciler},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub reconciler: Arc<BillingReconciler>,
    pub notification_use_cases: Arc<NotificationUseCases>,
}
