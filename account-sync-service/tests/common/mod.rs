//! Common test utilities for account-sync-service integration tests.

#![allow(dead_code)]

use account_sync_service::models::ReconcileRequest;
use account_sync_service::services::{BackendError, CallContext, ReconciliationBackend};
use account_sync_service::sync::AccountListing;
use async_trait::async_trait;
use secrecy::Secret;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;
use tokio::time::Instant;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,account_sync_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn token() -> Secret<String> {
    Secret::new("test-token".to_string())
}

pub fn caller() -> CallContext {
    CallContext::new(token())
}

/// A reconcile call as seen by the backend.
#[derive(Debug, Clone)]
pub struct ReconcileCall {
    pub account_ref: String,
    pub tenant_id: String,
    pub at: Instant,
}

/// In-memory backend with scripted listing and per-account failures.
#[derive(Default)]
pub struct ScriptedBackend {
    listing: Value,
    listing_failure: Option<u16>,
    list_delay: Duration,
    call_delay: Duration,
    failures: Mutex<HashMap<String, u32>>,
    listed_tenants: Mutex<Vec<String>>,
    request_ids: Mutex<Vec<Option<String>>>,
    calls: Mutex<Vec<ReconcileCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    /// Listing with one well-formed account per reference.
    pub fn with_accounts(refs: &[&str]) -> Self {
        let accounts: Vec<Value> = refs
            .iter()
            .map(|r| json!({"accountRef": r, "ownerRef": format!("item-{r}")}))
            .collect();
        Self::with_listing(Value::Array(accounts))
    }

    pub fn with_listing(listing: Value) -> Self {
        Self {
            listing,
            ..Default::default()
        }
    }

    pub fn failing_listing(status: u16) -> Self {
        Self {
            listing: json!([]),
            listing_failure: Some(status),
            ..Default::default()
        }
    }

    /// Fail the first `times` reconcile calls for `account_ref`.
    pub fn fail_times(self, account_ref: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(account_ref.to_string(), times);
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn list_count(&self) -> usize {
        self.listed_tenants.lock().unwrap().len()
    }

    pub fn listed_tenants(&self) -> Vec<String> {
        self.listed_tenants.lock().unwrap().clone()
    }

    /// Request id seen by each listing call.
    pub fn request_ids(&self) -> Vec<Option<String>> {
        self.request_ids.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<ReconcileCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reconcile_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReconciliationBackend for ScriptedBackend {
    async fn list_accounts(
        &self,
        tenant_id: &str,
        caller: &CallContext,
    ) -> Result<AccountListing, BackendError> {
        self.listed_tenants
            .lock()
            .unwrap()
            .push(tenant_id.to_string());
        self.request_ids
            .lock()
            .unwrap()
            .push(caller.request_id().map(str::to_string));

        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }

        match self.listing_failure {
            Some(status) => Err(BackendError::Status {
                status,
                body: "listing unavailable".to_string(),
            }),
            None => Ok(serde_json::from_value(self.listing.clone())?),
        }
    }

    async fn reconcile_account(
        &self,
        request: &ReconcileRequest,
        _caller: &CallContext,
    ) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(ReconcileCall {
            account_ref: request.account_ref.clone(),
            tenant_id: request.tenant_id.clone(),
            at: Instant::now(),
        });

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fail = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&request.account_ref) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        if fail {
            Err(BackendError::Status {
                status: 500,
                body: "provider error".to_string(),
            })
        } else {
            Ok(())
        }
    }
}
