use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::middleware::RequestId;

use crate::models::{SummaryPolicy, SyncOutcome, SyncProgress};
use crate::services::CallContext;
use crate::startup::AppState;
use crate::sync::SyncRun;

#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    #[serde(default)]
    pub mode: SummaryPolicy,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub tenant_id: String,
    pub progress: SyncProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcomes: Option<Vec<SyncOutcome>>,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub tenant_id: String,
    pub running: bool,
    pub progress: SyncProgress,
}

#[tracing::instrument(skip(state, query, auth, request_id), fields(request_id = %request_id.as_str()))]
pub async fn trigger_sync(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<SyncQuery>,
    Extension(request_id): Extension<RequestId>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<SyncResponse>, AppError> {
    let TypedHeader(Authorization(bearer)) =
        auth.ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing bearer token")))?;
    let caller = CallContext::new(Secret::new(bearer.token().to_string()))
        .with_request_id(request_id.as_str());

    // A disconnecting client must not cut an accepted run short.
    let run = state
        .registry
        .spawn_run(tenant_id.clone(), caller)
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Sync task failed: {}", e)))??;

    match run {
        SyncRun::Coalesced => Err(AppError::Conflict(anyhow::anyhow!(
            "A sync is already running for tenant {}",
            tenant_id
        ))),
        SyncRun::Completed(outcomes) => {
            let progress = SyncProgress::from_outcomes(&outcomes);
            query.mode.report(&tenant_id, &progress);

            let outcomes = match query.mode {
                SummaryPolicy::Verbose => Some(outcomes),
                SummaryPolicy::Silent => None,
            };

            Ok(Json(SyncResponse {
                tenant_id,
                progress,
                outcomes,
            }))
        }
    }
}

pub async fn sync_progress(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Json<ProgressResponse> {
    Json(ProgressResponse {
        running: state.registry.is_running(&tenant_id),
        progress: state.registry.progress(&tenant_id),
        tenant_id,
    })
}
