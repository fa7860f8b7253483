//! Account Sync Service entry point.

use account_sync_service::config::AccountSyncConfig;
use account_sync_service::services::init_metrics;
use account_sync_service::startup::Application;

use service_core::observability::init_tracing;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = AccountSyncConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        version = %config.service_version,
        otlp_endpoint = ?config.otlp_endpoint,
        "Starting account-sync-service"
    );

    init_metrics();

    tracing::info!(
        service_name = %config.service_name,
        http_port = %config.common.port,
        backend_url = %config.backend.base_url,
        batch_size = config.sync.batch_size,
        max_attempts = config.sync.max_attempts,
        retry_delay_ms = config.sync.retry_delay.as_millis() as u64,
        batch_delay_ms = config.sync.batch_delay.as_millis() as u64,
        scheduled_tenants = config.schedule.tenants.len(),
        "Configuration loaded"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        std::io::Error::other(format!("Application build error: {}", e))
    })?;

    let shutdown = app.shutdown_token();
    let mut server = tokio::spawn(app.run_until_stopped());

    tokio::select! {
        result = &mut server => return exit_status(result),
        _ = shutdown_signal() => {
            tracing::info!("Graceful shutdown initiated");
        }
    }

    shutdown.cancel();
    exit_status(server.await)?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

fn exit_status(result: Result<std::io::Result<()>, tokio::task::JoinError>) -> std::io::Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Application error");
            Err(e)
        }
        Err(e) => {
            tracing::error!(error = %e, "Server task failed");
            Err(std::io::Error::other(e.to_string()))
        }
    }
}
