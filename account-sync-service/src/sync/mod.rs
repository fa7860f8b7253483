//! Batched reconciliation of a tenant's provider accounts.
//!
//! A run lists the tenant's accounts, drops the ones that cannot be
//! reconciled, then walks them in fixed-size batches. Batches run one after
//! another with a pause in between; the accounts of a batch are reconciled
//! concurrently, each with its own retry budget. A failing account becomes a
//! `SyncOutcome { success: false, .. }` and never aborts the run. Only a
//! failed listing does.
//!
//! One engine runs at most one sync at a time. A trigger that arrives while
//! a run is in flight is coalesced into it rather than queued.

pub mod listing;

pub use listing::AccountListing;

use crate::config::SyncSettings;
use crate::models::{ReconcileRequest, RemoteAccount, SyncCompleted, SyncOutcome, SyncProgress};
use crate::services::backend::{BackendError, CallContext, ReconciliationBackend};
use crate::services::metrics;
use futures::future::join_all;
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Failed to list accounts: {0}")]
    Listing(#[source] BackendError),
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::InvalidArgument(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            SyncError::Listing(e) => AppError::BadGateway(e.to_string()),
        }
    }
}

/// What a trigger turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRun {
    Completed(Vec<SyncOutcome>),
    /// Another run was already in flight; nothing was done.
    Coalesced,
}

impl SyncRun {
    pub fn into_outcomes(self) -> Vec<SyncOutcome> {
        match self {
            SyncRun::Completed(outcomes) => outcomes,
            SyncRun::Coalesced => Vec::new(),
        }
    }
}

/// Releases the in-flight flag on every exit path, unwinding included.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AccountSync {
    backend: Arc<dyn ReconciliationBackend>,
    settings: SyncSettings,
    running: AtomicBool,
    progress: watch::Sender<SyncProgress>,
    completed: broadcast::Sender<SyncCompleted>,
}

impl AccountSync {
    pub fn new(backend: Arc<dyn ReconciliationBackend>, settings: SyncSettings) -> Self {
        let (completed, _) = broadcast::channel(16);
        Self::with_notifier(backend, settings, completed)
    }

    /// Publish completion events on an existing channel, shared with other engines.
    pub fn with_notifier(
        backend: Arc<dyn ReconciliationBackend>,
        settings: SyncSettings,
        completed: broadcast::Sender<SyncCompleted>,
    ) -> Self {
        let (progress, _) = watch::channel(SyncProgress::default());
        Self {
            backend,
            settings,
            running: AtomicBool::new(false),
            progress,
            completed,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Snapshot of the current run, or of the last one when idle.
    pub fn progress(&self) -> SyncProgress {
        *self.progress.borrow()
    }

    pub fn watch_progress(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncCompleted> {
        self.completed.subscribe()
    }

    fn try_claim(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    /// Run a sync and return one outcome per reconciled account.
    ///
    /// Returns an empty list when a run is already in flight.
    pub async fn start_sync(
        &self,
        tenant_id: &str,
        caller: &CallContext,
    ) -> Result<Vec<SyncOutcome>, SyncError> {
        Ok(self.run(tenant_id, caller).await?.into_outcomes())
    }

    #[tracing::instrument(skip(self, caller))]
    pub async fn run(
        &self,
        tenant_id: &str,
        caller: &CallContext,
    ) -> Result<SyncRun, SyncError> {
        if tenant_id.trim().is_empty() {
            return Err(SyncError::InvalidArgument("tenant_id must not be empty"));
        }
        if caller.auth_token().expose_secret().is_empty() {
            return Err(SyncError::InvalidArgument("auth token must not be empty"));
        }

        let Some(guard) = self.try_claim() else {
            tracing::debug!("Sync already in flight, coalescing trigger");
            metrics::record_sync_run("coalesced");
            return Ok(SyncRun::Coalesced);
        };

        let started = Instant::now();
        self.progress.send_replace(SyncProgress::default());

        let listing = match self.backend.list_accounts(tenant_id, caller).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list accounts, aborting sync");
                metrics::record_sync_run("listing_failed");
                return Err(SyncError::Listing(e));
            }
        };

        let accounts = listing.into_accounts(tenant_id, self.settings.require_owner_ref);
        let batch_size = self.settings.effective_batch_size();
        self.progress
            .send_replace(SyncProgress::starting(accounts.len()));

        tracing::info!(
            total = accounts.len(),
            batch_size,
            "Starting account reconciliation"
        );

        let retry = self.settings.retry_config();
        let mut outcomes = Vec::with_capacity(accounts.len());

        for (index, batch) in accounts.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.batch_delay).await;
            }

            tracing::debug!(batch = index + 1, size = batch.len(), "Reconciling batch");

            let results = join_all(
                batch
                    .iter()
                    .map(|account| self.reconcile_one(account, caller, &retry)),
            )
            .await;
            outcomes.extend(results);
        }

        let progress = self.progress();
        drop(guard);

        metrics::record_sync_run("completed");
        metrics::record_sync_duration(started.elapsed().as_secs_f64());

        tracing::info!(
            total = progress.total,
            successes = progress.successes,
            failures = progress.failures,
            duration_ms = started.elapsed().as_millis() as u64,
            "Sync completed"
        );

        // No subscribers is fine.
        let _ = self.completed.send(SyncCompleted {
            tenant_id: tenant_id.to_string(),
            total: progress.total,
            successes: progress.successes,
            failures: progress.failures,
        });

        Ok(SyncRun::Completed(outcomes))
    }

    async fn reconcile_one(
        &self,
        account: &RemoteAccount,
        caller: &CallContext,
        retry: &RetryConfig,
    ) -> SyncOutcome {
        let request = ReconcileRequest::from(account);
        let request = &request;
        let backend = &self.backend;

        let attempted = retry_with_backoff(retry, "reconcile_account", move || {
            backend.reconcile_account(request, caller)
        })
        .await;

        let success = attempted.is_ok();
        if let Err(e) = &attempted.result {
            tracing::warn!(
                account_ref = %account.account_ref,
                attempts = attempted.attempts,
                error = %e,
                "Account reconciliation failed"
            );
        }

        self.progress.send_modify(|p| *p = p.record(success));
        metrics::record_account_reconciliation(success);
        metrics::record_reconcile_attempts(attempted.attempts);

        SyncOutcome {
            account_ref: account.account_ref.clone(),
            success,
            attempts: attempted.attempts,
        }
    }
}
