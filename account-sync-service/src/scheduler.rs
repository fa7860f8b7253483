//! Periodic background syncs for a fixed set of tenants.

use crate::config::ScheduleConfig;
use crate::models::{SummaryPolicy, SyncProgress};
use crate::services::{CallContext, SyncRegistry};
use crate::sync::SyncRun;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Sync every scheduled tenant once per interval until `shutdown` fires.
///
/// The first round starts immediately. A round in progress always finishes;
/// shutdown is only observed between rounds.
pub async fn run_schedule(
    registry: Arc<SyncRegistry>,
    schedule: ScheduleConfig,
    shutdown: CancellationToken,
) {
    let Some(caller) = schedule.service_token.clone().map(CallContext::new) else {
        tracing::info!("No service token configured, scheduled sync disabled");
        return;
    };
    if schedule.tenants.is_empty() || schedule.interval.is_zero() {
        tracing::info!("No scheduled tenants, scheduled sync disabled");
        return;
    }

    tracing::info!(
        tenants = schedule.tenants.len(),
        interval_secs = schedule.interval.as_secs(),
        "Starting scheduled sync"
    );

    let mut ticker = tokio::time::interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Scheduled sync shutting down");
                break;
            }
            _ = ticker.tick() => {
                for tenant_id in &schedule.tenants {
                    match registry.run(tenant_id, &caller).await {
                        Ok(SyncRun::Completed(outcomes)) => SummaryPolicy::Silent
                            .report(tenant_id, &SyncProgress::from_outcomes(&outcomes)),
                        Ok(SyncRun::Coalesced) => {
                            tracing::debug!(tenant_id = %tenant_id, "Scheduled sync skipped, run in flight")
                        }
                        Err(e) => {
                            tracing::warn!(tenant_id = %tenant_id, error = %e, "Scheduled sync failed")
                        }
                    }
                }
            }
        }
    }
}
