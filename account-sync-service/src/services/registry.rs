//! One sync engine per tenant.

use crate::config::SyncSettings;
use crate::models::{SyncCompleted, SyncOutcome, SyncProgress};
use crate::services::backend::{CallContext, ReconciliationBackend};
use crate::sync::{AccountSync, SyncError, SyncRun};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;

pub struct SyncRegistry {
    backend: Arc<dyn ReconciliationBackend>,
    settings: SyncSettings,
    engines: DashMap<String, Arc<AccountSync>>,
    completed: broadcast::Sender<SyncCompleted>,
}

impl SyncRegistry {
    pub fn new(backend: Arc<dyn ReconciliationBackend>, settings: SyncSettings) -> Self {
        let (completed, _) = broadcast::channel(64);
        Self {
            backend,
            settings,
            engines: DashMap::new(),
            completed,
        }
    }

    /// The engine for `tenant_id`, created on first use. Surrounding
    /// whitespace is not part of the tenant id.
    pub fn engine(&self, tenant_id: &str) -> Arc<AccountSync> {
        self.engines
            .entry(tenant_id.trim().to_string())
            .or_insert_with(|| {
                Arc::new(AccountSync::with_notifier(
                    self.backend.clone(),
                    self.settings.clone(),
                    self.completed.clone(),
                ))
            })
            .value()
            .clone()
    }

    pub async fn run(&self, tenant_id: &str, caller: &CallContext) -> Result<SyncRun, SyncError> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(SyncError::InvalidArgument("tenant_id must not be empty"));
        }
        self.engine(tenant_id).run(tenant_id, caller).await
    }

    /// Run on a task of its own. The run finishes even if the returned
    /// handle is dropped.
    pub fn spawn_run(
        self: &Arc<Self>,
        tenant_id: String,
        caller: CallContext,
    ) -> JoinHandle<Result<SyncRun, SyncError>> {
        let registry = Arc::clone(self);
        tokio::spawn(
            async move { registry.run(&tenant_id, &caller).await }.in_current_span(),
        )
    }

    pub async fn start_sync(
        &self,
        tenant_id: &str,
        caller: &CallContext,
    ) -> Result<Vec<SyncOutcome>, SyncError> {
        Ok(self.run(tenant_id, caller).await?.into_outcomes())
    }

    /// Last-known progress; zeroed for tenants never synced.
    pub fn progress(&self, tenant_id: &str) -> SyncProgress {
        self.engines
            .get(tenant_id.trim())
            .map(|engine| engine.progress())
            .unwrap_or_default()
    }

    pub fn is_running(&self, tenant_id: &str) -> bool {
        self.engines
            .get(tenant_id.trim())
            .is_some_and(|engine| engine.is_running())
    }

    /// Completion events of every tenant.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncCompleted> {
        self.completed.subscribe()
    }
}
