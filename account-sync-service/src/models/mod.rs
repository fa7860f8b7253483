//! Data types shared by the sync engine, its backend and the HTTP surface.

use serde::{Deserialize, Serialize};

/// A provider-side account that can be reconciled for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccount {
    pub account_ref: String,
    pub tenant_id: String,
    pub owner_ref: Option<String>,
}

/// Body of a reconcile call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub account_ref: String,
    pub tenant_id: String,
    pub owner_ref: Option<String>,
}

impl From<&RemoteAccount> for ReconcileRequest {
    fn from(account: &RemoteAccount) -> Self {
        Self {
            account_ref: account.account_ref.clone(),
            tenant_id: account.tenant_id.clone(),
            owner_ref: account.owner_ref.clone(),
        }
    }
}

/// Result of reconciling a single account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub account_ref: String,
    pub success: bool,
    pub attempts: u32,
}

/// Aggregate counters for the current or most recent run.
///
/// `completed == successes + failures` and `completed <= total` hold for
/// every value published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub completed: usize,
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
}

impl SyncProgress {
    pub fn starting(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Progress after one more account resolved.
    pub fn record(self, success: bool) -> Self {
        let (successes, failures) = if success {
            (self.successes + 1, self.failures)
        } else {
            (self.successes, self.failures + 1)
        };
        Self {
            completed: self.completed + 1,
            total: self.total,
            successes,
            failures,
        }
    }

    /// Final counters of a completed run.
    pub fn from_outcomes(outcomes: &[SyncOutcome]) -> Self {
        outcomes
            .iter()
            .fold(Self::starting(outcomes.len()), |p, o| p.record(o.success))
    }

    pub fn is_consistent(&self) -> bool {
        self.completed == self.successes + self.failures && self.completed <= self.total
    }
}

/// Fired once for every run that reached the end of its last batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncCompleted {
    pub tenant_id: String,
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
}

/// How much of a finished run the caller surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryPolicy {
    /// Automatic runs: counts only, logged at debug.
    #[default]
    Silent,
    /// User-triggered runs: per-account outcomes and an info summary.
    Verbose,
}

impl SummaryPolicy {
    /// Surface the result of a finished run according to the policy.
    pub fn report(self, tenant_id: &str, progress: &SyncProgress) {
        match self {
            SummaryPolicy::Silent => tracing::debug!(
                tenant_id,
                total = progress.total,
                failures = progress.failures,
                "Background sync finished"
            ),
            SummaryPolicy::Verbose if progress.failures > 0 => tracing::warn!(
                tenant_id,
                total = progress.total,
                successes = progress.successes,
                failures = progress.failures,
                "Sync finished with failures"
            ),
            SummaryPolicy::Verbose => tracing::info!(
                tenant_id,
                total = progress.total,
                successes = progress.successes,
                "Sync finished"
            ),
        }
    }
}
