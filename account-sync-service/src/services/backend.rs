//! Client for the backend of record: lists a tenant's provider accounts and
//! asks it to reconcile one account's transactions.

use crate::config::BackendConfig;
use crate::models::ReconcileRequest;
use crate::sync::listing::AccountListing;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::middleware::REQUEST_ID_HEADER;
use service_core::observability::inject_trace_context;

/// Error type for collaborator calls.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unrecognised listing response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// On whose behalf backend calls are made.
#[derive(Clone)]
pub struct CallContext {
    auth_token: Secret<String>,
    request_id: Option<String>,
}

impl CallContext {
    pub fn new(auth_token: Secret<String>) -> Self {
        Self {
            auth_token,
            request_id: None,
        }
    }

    /// Correlate backend calls with the inbound request that caused them.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn auth_token(&self) -> &Secret<String> {
        &self.auth_token
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

/// The two calls a sync run makes.
#[async_trait]
pub trait ReconciliationBackend: Send + Sync {
    /// Fetch every provider account visible to `tenant_id`.
    async fn list_accounts(
        &self,
        tenant_id: &str,
        caller: &CallContext,
    ) -> Result<AccountListing, BackendError>;

    /// Pull and upsert the transactions of one account. Any 2xx is success.
    async fn reconcile_account(
        &self,
        request: &ReconcileRequest,
        caller: &CallContext,
    ) -> Result<(), BackendError>;
}

/// `ReconciliationBackend` over HTTP with bearer authentication.
#[derive(Clone)]
pub struct HttpReconciliationBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpReconciliationBackend {
    pub fn new(config: BackendConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn trace_headers(caller: &CallContext) -> HeaderMap {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);
        if let Some(value) = caller
            .request_id()
            .and_then(|id| HeaderValue::from_str(id).ok())
        {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        headers
    }

    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ReconciliationBackend for HttpReconciliationBackend {
    #[tracing::instrument(skip(self, caller))]
    async fn list_accounts(
        &self,
        tenant_id: &str,
        caller: &CallContext,
    ) -> Result<AccountListing, BackendError> {
        let url = self.url(&self.config.list_accounts_path);

        let response = self
            .client
            .get(&url)
            .headers(Self::trace_headers(caller))
            .bearer_auth(caller.auth_token().expose_secret())
            .query(&[(self.config.tenant_query_param.as_str(), tenant_id)])
            .send()
            .await?;

        let response = Self::error_for_status(response).await?;
        let body = response.bytes().await?;

        let listing = AccountListing::from_slice(&body)?;
        tracing::debug!(entries = listing.entries().len(), "Account listing received");
        Ok(listing)
    }

    #[tracing::instrument(skip(self, request, caller), fields(account_ref = %request.account_ref))]
    async fn reconcile_account(
        &self,
        request: &ReconcileRequest,
        caller: &CallContext,
    ) -> Result<(), BackendError> {
        let url = self.url(&self.config.reconcile_path);

        let response = self
            .client
            .post(&url)
            .headers(Self::trace_headers(caller))
            .bearer_auth(caller.auth_token().expose_secret())
            .json(request)
            .send()
            .await?;

        Self::error_for_status(response).await?;
        Ok(())
    }
}
