use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        billing_event::{BillingEvent, SubscriptionObject},
        notification::{NotificationKind, NotificationRequest},
        plan_catalog::PlanCatalog,
        subscription::{SubscriptionSnapshot, SubscriptionStatus},
    },
    event_dispatch::{ReconciliationAction, plan_action},
    ports::billing_provider::BillingProviderPort,
    use_cases::notification::NotificationUseCases,
};

// ============================================================================
// Types
// ============================================================================

/// Everything `sync` needs to mirror one provider subscription.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub email: Option<String>,
    pub billing_customer_id: String,
    pub billing_subscription_id: String,
    pub product_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<NaiveDateTime>,
    pub current_period_end: Option<NaiveDateTime>,
    pub cancel_at_period_end: bool,
    /// Creation time of the event that triggered the sync.
    pub event_at: Option<NaiveDateTime>,
}

/// Column values written on insert and on update.
#[derive(Debug, Clone)]
pub struct SubscriptionWrite {
    pub workspace_id: Uuid,
    pub plan_id: Uuid,
    pub billing_customer_id: String,
    pub billing_subscription_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<NaiveDateTime>,
    pub current_period_end: Option<NaiveDateTime>,
    pub cancel_at_period_end: bool,
    pub last_event_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Synced {
        snapshot: SubscriptionSnapshot,
        created: bool,
    },
    TenantNotFound,
    WorkspaceNotFound,
    PlanUnknown {
        slug: String,
    },
    /// The stored row already reflects a newer event.
    Stale,
    /// A directory or store read failed before anything was written.
    LookupFailed(String),
    StoreWriteFailed(String),
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Synced { created: true, .. } => "inserted",
            SyncOutcome::Synced { created: false, .. } => "updated",
            SyncOutcome::TenantNotFound => "tenant_not_found",
            SyncOutcome::WorkspaceNotFound => "workspace_not_found",
            SyncOutcome::PlanUnknown { .. } => "plan_unknown",
            SyncOutcome::Stale => "stale",
            SyncOutcome::LookupFailed(_) => "lookup_failed",
            SyncOutcome::StoreWriteFailed(_) => "store_write_failed",
        }
    }

    /// Misses and failures leave the event replayable.
    pub fn is_dropped(&self) -> bool {
        !matches!(self, SyncOutcome::Synced { .. } | SyncOutcome::Stale)
    }
}

#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Canceled(SubscriptionSnapshot),
    NotFound,
    Stale,
    LookupFailed(String),
    StoreWriteFailed(String),
}

impl CancelOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CancelOutcome::Canceled(_) => "canceled",
            CancelOutcome::NotFound => "not_found",
            CancelOutcome::Stale => "stale",
            CancelOutcome::LookupFailed(_) => "lookup_failed",
            CancelOutcome::StoreWriteFailed(_) => "store_write_failed",
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(
            self,
            CancelOutcome::LookupFailed(_) | CancelOutcome::StoreWriteFailed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Queued(Uuid),
    /// An earlier delivery of the same event already queued it.
    AlreadyQueued,
    /// No recipient address was available.
    Skipped,
    Failed(String),
}

/// What one delivery of a billing event did.
#[derive(Debug, Clone)]
pub enum ReconciliationReport {
    /// Already recorded as processed; nothing ran.
    Duplicate,
    Handled(EventReport),
}

#[derive(Debug, Clone)]
pub struct EventReport {
    pub action: &'static str,
    pub sync: Option<SyncOutcome>,
    pub cancel: Option<CancelOutcome>,
    pub notifications: Vec<NotifyOutcome>,
    pub note: Option<String>,
}

impl EventReport {
    fn new(action: &'static str) -> Self {
        Self {
            action,
            sync: None,
            cancel: None,
            notifications: Vec::new(),
            note: None,
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.sync.as_ref().is_some_and(SyncOutcome::is_dropped)
            || self.cancel.as_ref().is_some_and(CancelOutcome::is_dropped)
    }

    fn detail(&self) -> String {
        let mut parts = vec![self.action.to_string()];
        if let Some(sync) = &self.sync {
            parts.push(format!("sync={}", sync.label()));
        }
        if let Some(cancel) = &self.cancel {
            parts.push(format!("cancel={}", cancel.label()));
        }
        if !self.notifications.is_empty() {
            let queued = self
                .notifications
                .iter()
                .filter(|n| matches!(n, NotifyOutcome::Queued(_)))
                .count();
            parts.push(format!("notify={}/{}", queued, self.notifications.len()));
        }
        if let Some(note) = &self.note {
            parts.push(note.clone());
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum LedgerStatus {
    Processed,
    Dropped,
}

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub event_id: String,
    pub event_type: String,
    pub event_created_at: Option<NaiveDateTime>,
    pub status: LedgerStatus,
    pub detail: String,
}

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_user_id_by_email(&self, email: &str) -> AppResult<Option<Uuid>>;
    async fn current_workspace_id(&self, user_id: Uuid) -> AppResult<Option<Uuid>>;
    async fn owned_workspace_id(&self, user_id: Uuid) -> AppResult<Option<Uuid>>;
}

#[async_trait]
pub trait PlanRepo: Send + Sync {
    async fn get_plan_id_by_slug(&self, slug: &str) -> AppResult<Option<Uuid>>;
}

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    async fn get_by_workspace(&self, workspace_id: Uuid) -> AppResult<Option<SubscriptionSnapshot>>;
    async fn get_by_billing_subscription_id(
        &self,
        billing_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionSnapshot>>;
    /// Upserts by workspace. Returns `None` when a concurrently inserted row
    /// already carries a newer `last_event_at`.
    async fn insert(&self, input: &SubscriptionWrite) -> AppResult<Option<SubscriptionSnapshot>>;
    /// Returns `None` when the row already carries a newer `last_event_at`.
    async fn update(
        &self,
        id: Uuid,
        input: &SubscriptionWrite,
    ) -> AppResult<Option<SubscriptionSnapshot>>;
    async fn mark_canceled(
        &self,
        id: Uuid,
        event_at: Option<NaiveDateTime>,
    ) -> AppResult<Option<SubscriptionSnapshot>>;
}

#[async_trait]
pub trait BillingEventLedger: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> AppResult<bool>;
    async fn record(&self, entry: &LedgerEntry) -> AppResult<()>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct BillingReconciler {
    provider: Arc<dyn BillingProviderPort>,
    tenants: Arc<dyn TenantDirectory>,
    plans: Arc<dyn PlanRepo>,
    subscriptions: Arc<dyn SubscriptionRepo>,
    ledger: Arc<dyn BillingEventLedger>,
    notifications: Arc<NotificationUseCases>,
    catalog: PlanCatalog,
}

impl BillingReconciler {
    pub fn new(
        provider: Arc<dyn BillingProviderPort>,
        tenants: Arc<dyn TenantDirectory>,
        plans: Arc<dyn PlanRepo>,
        subscriptions: Arc<dyn SubscriptionRepo>,
        ledger: Arc<dyn BillingEventLedger>,
        notifications: Arc<NotificationUseCases>,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            provider,
            tenants,
            plans,
            subscriptions,
            ledger,
            notifications,
            catalog,
        }
    }

    /// Apply one verified event.
    ///
    /// Resolution misses and store failures are reported in the outcome, not as
    /// errors. An `Err` means the provider should redeliver.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn handle_event(&self, event: &BillingEvent) -> AppResult<ReconciliationReport> {
        if self.ledger.is_processed(&event.id).await? {
            info!("Billing event already processed, skipping");
            return Ok(ReconciliationReport::Duplicate);
        }

        let kind = event.kind().map_err(|e| {
            AppError::InvalidInput(format!("Malformed {} payload: {}", event.event_type, e))
        })?;
        let action = plan_action(kind);
        let event_at = event.occurred_at();
        let mut report = EventReport::new(action.name());

        match action {
            ReconciliationAction::SyncFromCheckout {
                subscription_id,
                customer_id,
                email,
                customer_name,
            } => {
                self.apply_checkout(
                    &mut report,
                    &event.id,
                    &subscription_id,
                    customer_id,
                    email,
                    customer_name,
                    event_at,
                )
                .await?;
            }
            ReconciliationAction::SyncFromSubscription {
                subscription,
                notify_cancellation,
            } => {
                self.apply_subscription_update(
                    &mut report,
                    &event.id,
                    &subscription,
                    notify_cancellation,
                    event_at,
                )
                .await?;
            }
            ReconciliationAction::MarkCanceled { subscription_id } => {
                report.cancel = Some(self.cancel(&subscription_id, event_at).await);
            }
            ReconciliationAction::Notify {
                kind,
                email,
                customer_name,
                product_id,
            } => {
                let plan_name = self.catalog.display_name(product_id.as_deref());
                let outcome = self
                    .notify(&event.id, email, |to| {
                        NotificationRequest::new(to, kind)
                            .plan_name(plan_name)
                            .customer_name(customer_name.as_deref())
                    })
                    .await;
                report.notifications.push(outcome);
            }
            ReconciliationAction::LogOnly { reason } => {
                info!(reason, "Billing event acknowledged without changes");
                report.note = Some(reason.to_string());
            }
            ReconciliationAction::Ignore { reason } => {
                debug!(reason = %reason, "Ignoring billing event");
                report.note = Some(reason);
            }
        }

        self.record(event, &report).await;
        Ok(ReconciliationReport::Handled(report))
    }

    async fn apply_checkout(
        &self,
        report: &mut EventReport,
        event_id: &str,
        subscription_id: &str,
        customer_id: Option<String>,
        email: Option<String>,
        customer_name: Option<String>,
        event_at: Option<NaiveDateTime>,
    ) -> AppResult<()> {
        let subscription = self.provider.get_subscription(subscription_id).await?;
        let customer_id = customer_id.unwrap_or_else(|| subscription.customer.clone());

        let (email, customer_name) = match email {
            Some(email) => (Some(email), customer_name),
            None => {
                let customer = self.provider.get_customer(&customer_id).await?;
                (customer.email, customer_name.or(customer.name))
            }
        };

        let product_id = subscription.product_id().map(str::to_string);
        let plan = self.catalog.resolve(product_id.as_deref());

        let sync = self
            .sync(&SyncRequest {
                email: email.clone(),
                billing_customer_id: customer_id,
                billing_subscription_id: subscription.id.clone(),
                product_id,
                status: SubscriptionStatus::from_stripe(&subscription.status),
                current_period_start: subscription.period_start(),
                current_period_end: subscription.period_end(),
                cancel_at_period_end: subscription.cancel_at_period_end,
                event_at,
            })
            .await;
        report.sync = Some(sync);

        let period_end = subscription.period_end();
        let outcome = self
            .notify(event_id, email, |to| {
                NotificationRequest::new(to, NotificationKind::SubscriptionCreated)
                    .plan_name(Some(plan.display_name))
                    .subscription_end(period_end)
                    .customer_name(customer_name.as_deref())
            })
            .await;
        report.notifications.push(outcome);
        Ok(())
    }

    async fn apply_subscription_update(
        &self,
        report: &mut EventReport,
        event_id: &str,
        subscription: &SubscriptionObject,
        notify_cancellation: bool,
        event_at: Option<NaiveDateTime>,
    ) -> AppResult<()> {
        let customer = self.provider.get_customer(&subscription.customer).await?;
        if customer.deleted {
            warn!(customer_id = %customer.id, "Billing customer is deleted");
        }

        let product_id = subscription.product_id().map(str::to_string);
        let sync = self
            .sync(&SyncRequest {
                email: customer.email.clone(),
                billing_customer_id: subscription.customer.clone(),
                billing_subscription_id: subscription.id.clone(),
                product_id: product_id.clone(),
                status: SubscriptionStatus::from_stripe(&subscription.status),
                current_period_start: subscription.period_start(),
                current_period_end: subscription.period_end(),
                cancel_at_period_end: subscription.cancel_at_period_end,
                event_at,
            })
            .await;
        let stale = matches!(sync, SyncOutcome::Stale);
        report.sync = Some(sync);

        if notify_cancellation && stale {
            info!("Skipping cancellation notice for stale subscription update");
        } else if notify_cancellation {
            let plan = self.catalog.resolve(product_id.as_deref());
            let period_end = subscription.period_end();
            let outcome = self
                .notify(event_id, customer.email, |to| {
                    NotificationRequest::new(to, NotificationKind::SubscriptionCanceled)
                        .plan_name(Some(plan.display_name))
                        .subscription_end(period_end)
                        .customer_name(customer.name.as_deref())
                })
                .await;
            report.notifications.push(outcome);
        }
        Ok(())
    }

    /// Mirror a provider subscription onto the owning workspace's row.
    #[instrument(skip(self, request), fields(billing_subscription_id = %request.billing_subscription_id))]
    pub async fn sync(&self, request: &SyncRequest) -> SyncOutcome {
        let outcome = self.sync_inner(request).await;
        match &outcome {
            SyncOutcome::Synced { snapshot, created } => info!(
                workspace_id = %snapshot.workspace_id,
                status = %snapshot.status,
                created,
                outcome = outcome.label(),
                "Subscription synced"
            ),
            SyncOutcome::Stale => info!(
                outcome = outcome.label(),
                "Stored subscription is newer than event, skipping write"
            ),
            SyncOutcome::LookupFailed(e) | SyncOutcome::StoreWriteFailed(e) => error!(
                error = %e,
                outcome = outcome.label(),
                "Subscription sync failed"
            ),
            _ => warn!(outcome = outcome.label(), "Subscription sync dropped"),
        }
        outcome
    }

    async fn sync_inner(&self, request: &SyncRequest) -> SyncOutcome {
        let Some(email) = request.email.as_deref() else {
            return SyncOutcome::TenantNotFound;
        };

        let user_id = match self.tenants.find_user_id_by_email(email).await {
            Ok(Some(id)) => id,
            Ok(None) => return SyncOutcome::TenantNotFound,
            Err(e) => return SyncOutcome::LookupFailed(e.to_string()),
        };

        let workspace_id = match self.resolve_workspace(user_id).await {
            Ok(Some(id)) => id,
            Ok(None) => return SyncOutcome::WorkspaceNotFound,
            Err(e) => return SyncOutcome::LookupFailed(e.to_string()),
        };

        let entry = self.catalog.resolve(request.product_id.as_deref());
        let plan_id = match self.plans.get_plan_id_by_slug(&entry.plan_slug).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                return SyncOutcome::PlanUnknown {
                    slug: entry.plan_slug,
                };
            }
            Err(e) => return SyncOutcome::LookupFailed(e.to_string()),
        };

        let existing = match self.subscriptions.get_by_workspace(workspace_id).await {
            Ok(existing) => existing,
            Err(e) => return SyncOutcome::LookupFailed(e.to_string()),
        };

        let write = SubscriptionWrite {
            workspace_id,
            plan_id,
            billing_customer_id: request.billing_customer_id.clone(),
            billing_subscription_id: request.billing_subscription_id.clone(),
            status: request.status.clone(),
            current_period_start: request.current_period_start,
            current_period_end: request.current_period_end,
            cancel_at_period_end: request.cancel_at_period_end,
            last_event_at: request.event_at,
        };

        let result = match existing {
            Some(snapshot) if snapshot.supersedes(request.event_at) => return SyncOutcome::Stale,
            Some(snapshot) => self
                .subscriptions
                .update(snapshot.id, &write)
                .await
                .map(|updated| updated.map(|s| (s, false))),
            None => self
                .subscriptions
                .insert(&write)
                .await
                .map(|inserted| inserted.map(|s| (s, true))),
        };

        match result {
            Ok(Some((snapshot, created))) => SyncOutcome::Synced { snapshot, created },
            Ok(None) => SyncOutcome::Stale,
            Err(e) => SyncOutcome::StoreWriteFailed(e.to_string()),
        }
    }

    async fn resolve_workspace(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        if let Some(id) = self.tenants.current_workspace_id(user_id).await? {
            return Ok(Some(id));
        }
        self.tenants.owned_workspace_id(user_id).await
    }

    /// Soft-cancel the row for a provider subscription.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        billing_subscription_id: &str,
        event_at: Option<NaiveDateTime>,
    ) -> CancelOutcome {
        let existing = match self
            .subscriptions
            .get_by_billing_subscription_id(billing_subscription_id)
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                error!(error = %e, "Failed to look up subscription for cancellation");
                return CancelOutcome::LookupFailed(e.to_string());
            }
        };

        let Some(snapshot) = existing else {
            info!("No local subscription for canceled billing subscription");
            return CancelOutcome::NotFound;
        };

        if snapshot.supersedes(event_at) {
            info!(workspace_id = %snapshot.workspace_id, "Cancellation is older than stored state, skipping");
            return CancelOutcome::Stale;
        }

        match self.subscriptions.mark_canceled(snapshot.id, event_at).await {
            Ok(Some(canceled)) => {
                info!(workspace_id = %canceled.workspace_id, "Subscription canceled");
                CancelOutcome::Canceled(canceled)
            }
            Ok(None) => CancelOutcome::Stale,
            Err(e) => {
                error!(error = %e, "Failed to cancel subscription");
                CancelOutcome::StoreWriteFailed(e.to_string())
            }
        }
    }

    /// Queue an email. Failures are logged and never propagate.
    async fn notify<F>(&self, event_id: &str, email: Option<String>, build: F) -> NotifyOutcome
    where
        F: FnOnce(String) -> NotificationRequest,
    {
        let Some(email) = email else {
            warn!("No recipient email, skipping notification");
            return NotifyOutcome::Skipped;
        };

        let request = build(email);
        match self.notifications.enqueue(event_id, &request).await {
            Ok(Some(id)) => NotifyOutcome::Queued(id),
            Ok(None) => NotifyOutcome::AlreadyQueued,
            Err(e) => {
                error!(error = %e, kind = %request.kind, "Failed to queue notification");
                NotifyOutcome::Failed(e.to_string())
            }
        }
    }

    async fn record(&self, event: &BillingEvent, report: &EventReport) {
        let status = if report.is_dropped() {
            LedgerStatus::Dropped
        } else {
            LedgerStatus::Processed
        };
        let entry = LedgerEntry {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            event_created_at: event.occurred_at(),
            status,
            detail: report.detail(),
        };

        if let Err(e) = self.ledger.record(&entry).await {
            error!(error = %e, "Failed to record billing event");
        }
    }
}
