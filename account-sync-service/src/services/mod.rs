//! Services module for account-sync-service.

pub mod backend;
pub mod metrics;
pub mod registry;

pub use backend::{BackendError, CallContext, HttpReconciliationBackend, ReconciliationBackend};
pub use metrics::{
    get_metrics, init_metrics, record_account_reconciliation, record_http_request,
    record_reconcile_attempts, record_sync_duration, record_sync_run,
};
pub use registry::SyncRegistry;
