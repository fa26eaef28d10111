//! In-memory mock implementations for the reconciler's ports.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        billing_event::{CustomerObject, SubscriptionObject},
        plan_catalog::PlanCatalog,
        subscription::{SubscriptionSnapshot, SubscriptionStatus},
    },
    ports::billing_provider::BillingProviderPort,
    use_cases::{
        notification::NotificationUseCases,
        reconciliation::{
            BillingEventLedger, BillingReconciler, LedgerEntry, LedgerStatus, PlanRepo,
            SubscriptionRepo, SubscriptionWrite, TenantDirectory,
        },
    },
};

use super::{InMemoryNotificationOutbox, ScriptedNotificationSender};

// ============================================================================
// FakeBillingProvider
// ============================================================================

#[derive(Default)]
pub struct FakeBillingProvider {
    pub subscriptions: Mutex<HashMap<String, SubscriptionObject>>,
    pub customers: Mutex<HashMap<String, CustomerObject>>,
}

impl FakeBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscription(&self, object: Value) {
        let subscription: SubscriptionObject =
            serde_json::from_value(object).expect("test subscription must deserialize");
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }

    pub fn add_customer(&self, id: &str, email: Option<&str>, name: Option<&str>) {
        self.customers.lock().unwrap().insert(
            id.to_string(),
            CustomerObject {
                id: id.to_string(),
                email: email.map(str::to_string),
                name: name.map(str::to_string),
                deleted: false,
            },
        );
    }
}

#[async_trait]
impl BillingProviderPort for FakeBillingProvider {
    async fn get_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionObject> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| {
                AppError::BillingProvider(format!("No such subscription: '{}'", subscription_id))
            })
    }

    async fn get_customer(&self, customer_id: &str) -> AppResult<CustomerObject> {
        self.customers
            .lock()
            .unwrap()
            .get(customer_id)
            .cloned()
            .ok_or_else(|| {
                AppError::BillingProvider(format!("No such customer: '{}'", customer_id))
            })
    }
}

// ============================================================================
// InMemoryTenantDirectory
// ============================================================================

#[derive(Default)]
pub struct InMemoryTenantDirectory {
    pub users: Mutex<HashMap<String, Uuid>>,
    pub current_workspaces: Mutex<HashMap<Uuid, Uuid>>,
    pub owned_workspaces: Mutex<HashMap<Uuid, Uuid>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.users.lock().unwrap().insert(email.to_string(), id);
        id
    }

    pub fn set_current_workspace(&self, user_id: Uuid, workspace_id: Uuid) {
        self.current_workspaces
            .lock()
            .unwrap()
            .insert(user_id, workspace_id);
    }

    pub fn add_owned_workspace(&self, user_id: Uuid, workspace_id: Uuid) {
        self.owned_workspaces
            .lock()
            .unwrap()
            .insert(user_id, workspace_id);
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn find_user_id_by_email(&self, email: &str) -> AppResult<Option<Uuid>> {
        Ok(self.users.lock().unwrap().get(email).copied())
    }

    async fn current_workspace_id(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        Ok(self.current_workspaces.lock().unwrap().get(&user_id).copied())
    }

    async fn owned_workspace_id(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        Ok(self.owned_workspaces.lock().unwrap().get(&user_id).copied())
    }
}

// ============================================================================
// InMemoryPlanRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPlanRepo {
    pub plans: Mutex<HashMap<String, Uuid>>,
}

impl InMemoryPlanRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plan(&self, slug: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.plans.lock().unwrap().insert(slug.to_string(), id);
        id
    }
}

#[async_trait]
impl PlanRepo for InMemoryPlanRepo {
    async fn get_plan_id_by_slug(&self, slug: &str) -> AppResult<Option<Uuid>> {
        Ok(self.plans.lock().unwrap().get(slug).copied())
    }
}

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    pub rows: Mutex<HashMap<Uuid, SubscriptionSnapshot>>,
    fail_writes: AtomicBool,
}

impl InMemorySubscriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, snapshot: SubscriptionSnapshot) {
        self.rows.lock().unwrap().insert(snapshot.id, snapshot);
    }

    /// Make every subsequent write return a database error.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn by_workspace(&self, workspace_id: Uuid) -> Option<SubscriptionSnapshot> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .find(|s| s.workspace_id == workspace_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("Database operation failed".into()));
        }
        Ok(())
    }

    fn apply(snapshot: &mut SubscriptionSnapshot, input: &SubscriptionWrite) {
        let now = chrono::Utc::now().naive_utc();
        snapshot.plan_id = input.plan_id;
        snapshot.billing_customer_id = input.billing_customer_id.clone();
        snapshot.billing_subscription_id = Some(input.billing_subscription_id.clone());
        snapshot.status = input.status.clone();
        snapshot.current_period_start = input.current_period_start;
        snapshot.current_period_end = input.current_period_end;
        snapshot.cancel_at_period_end = input.cancel_at_period_end;
        snapshot.last_event_at = input.last_event_at.or(snapshot.last_event_at);
        snapshot.updated_at = Some(now);
    }
}

#[async_trait]
impl SubscriptionRepo for InMemorySubscriptionRepo {
    async fn get_by_workspace(&self, workspace_id: Uuid) -> AppResult<Option<SubscriptionSnapshot>> {
        Ok(self.by_workspace(workspace_id))
    }

    async fn get_by_billing_subscription_id(
        &self,
        billing_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionSnapshot>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| s.billing_subscription_id.as_deref() == Some(billing_subscription_id))
            .cloned())
    }

    async fn insert(&self, input: &SubscriptionWrite) -> AppResult<Option<SubscriptionSnapshot>> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();

        // Same conflict target and watermark guard as the Postgres upsert.
        if let Some(existing) = rows
            .values_mut()
            .find(|s| s.workspace_id == input.workspace_id)
        {
            if existing.supersedes(input.last_event_at) {
                return Ok(None);
            }
            Self::apply(existing, input);
            return Ok(Some(existing.clone()));
        }

        let now = chrono::Utc::now().naive_utc();
        let mut snapshot = SubscriptionSnapshot {
            id: Uuid::new_v4(),
            workspace_id: input.workspace_id,
            plan_id: input.plan_id,
            billing_customer_id: String::new(),
            billing_subscription_id: None,
            status: SubscriptionStatus::Incomplete,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            last_event_at: None,
            created_at: Some(now),
            updated_at: Some(now),
        };
        Self::apply(&mut snapshot, input);
        rows.insert(snapshot.id, snapshot.clone());
        Ok(Some(snapshot))
    }

    async fn update(
        &self,
        id: Uuid,
        input: &SubscriptionWrite,
    ) -> AppResult<Option<SubscriptionSnapshot>> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        let snapshot = rows.get_mut(&id).ok_or(AppError::NotFound)?;
        if snapshot.supersedes(input.last_event_at) {
            return Ok(None);
        }
        Self::apply(snapshot, input);
        Ok(Some(snapshot.clone()))
    }

    async fn mark_canceled(
        &self,
        id: Uuid,
        event_at: Option<NaiveDateTime>,
    ) -> AppResult<Option<SubscriptionSnapshot>> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        let snapshot = rows.get_mut(&id).ok_or(AppError::NotFound)?;
        if snapshot.supersedes(event_at) {
            return Ok(None);
        }
        snapshot.status = SubscriptionStatus::Canceled;
        snapshot.last_event_at = event_at.or(snapshot.last_event_at);
        snapshot.updated_at = Some(chrono::Utc::now().naive_utc());
        Ok(Some(snapshot.clone()))
    }
}

// ============================================================================
// InMemoryBillingEventLedger
// ============================================================================

#[derive(Default)]
pub struct InMemoryBillingEventLedger {
    pub entries: Mutex<HashMap<String, LedgerEntry>>,
    fail_reads: AtomicBool,
}

impl InMemoryBillingEventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_of(&self, event_id: &str) -> Option<LedgerStatus> {
        self.entries
            .lock()
            .unwrap()
            .get(event_id)
            .map(|e| e.status)
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BillingEventLedger for InMemoryBillingEventLedger {
    async fn is_processed(&self, event_id: &str) -> AppResult<bool> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Database("Database operation failed".into()));
        }
        Ok(self.status_of(event_id) == Some(LedgerStatus::Processed))
    }

    async fn record(&self, entry: &LedgerEntry) -> AppResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(entry.event_id.clone(), entry.clone());
        Ok(())
    }
}

// ============================================================================
// BillingFixture
// ============================================================================

/// All reconciler collaborators wired to in-memory fakes.
///
/// Seeds the `basic` and `premium` plan rows unless built with
/// [`BillingFixture::without_plans`].
pub struct BillingFixture {
    pub provider: Arc<FakeBillingProvider>,
    pub tenants: Arc<InMemoryTenantDirectory>,
    pub plans: Arc<InMemoryPlanRepo>,
    pub subscriptions: Arc<InMemorySubscriptionRepo>,
    pub ledger: Arc<InMemoryBillingEventLedger>,
    pub outbox: Arc<InMemoryNotificationOutbox>,
    pub sender: Arc<ScriptedNotificationSender>,
    pub basic_plan_id: Uuid,
    pub premium_plan_id: Uuid,
}

impl BillingFixture {
    pub fn new() -> Self {
        let fixture = Self::without_plans();
        let basic_plan_id = fixture.plans.add_plan("basic");
        let premium_plan_id = fixture.plans.add_plan("premium");
        Self {
            basic_plan_id,
            premium_plan_id,
            ..fixture
        }
    }

    pub fn without_plans() -> Self {
        Self {
            provider: Arc::new(FakeBillingProvider::new()),
            tenants: Arc::new(InMemoryTenantDirectory::new()),
            plans: Arc::new(InMemoryPlanRepo::new()),
            subscriptions: Arc::new(InMemorySubscriptionRepo::new()),
            ledger: Arc::new(InMemoryBillingEventLedger::new()),
            outbox: Arc::new(InMemoryNotificationOutbox::new()),
            sender: Arc::new(ScriptedNotificationSender::succeeding()),
            basic_plan_id: Uuid::nil(),
            premium_plan_id: Uuid::nil(),
        }
    }

    /// Add a user whose profile points at a fresh workspace.
    pub fn seed_tenant(&self, email: &str) -> (Uuid, Uuid) {
        let user_id = self.tenants.add_user(email);
        let workspace_id = Uuid::new_v4();
        self.tenants.set_current_workspace(user_id, workspace_id);
        (user_id, workspace_id)
    }

    pub fn notification_use_cases(&self) -> NotificationUseCases {
        NotificationUseCases::new(self.outbox.clone(), self.sender.clone())
    }

    pub fn reconciler(&self) -> BillingReconciler {
        BillingReconciler::new(
            self.provider.clone(),
            self.tenants.clone(),
            self.plans.clone(),
            self.subscriptions.clone(),
            self.ledger.clone(),
            Arc::new(self.notification_use_cases()),
            PlanCatalog::default(),
        )
    }
}

impl Default for BillingFixture {
    fn default() -> Self {
        Self::new()
    }
}
