use access_service::{
    build_router,
    config::AccessConfig,
    services::{
        metrics::init_metrics, spawn_session_sweeper, CodeDelivery, InMemoryAccountStore,
        InMemoryCollections, LogDelivery, NotificationDelivery,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AccessConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;
    init_metrics()?;

    let delivery: Arc<dyn CodeDelivery> = match &config.delivery.notification_service_url {
        Some(url) => Arc::new(
            NotificationDelivery::new(url, config.delivery.timeout_seconds)
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?,
        ),
        None => {
            tracing::warn!("NOTIFICATION_SERVICE_URL not set; verification codes will only be logged");
            Arc::new(LogDelivery)
        }
    };

    let collections = match &config.collections.seed_path {
        Some(path) => InMemoryCollections::from_seed_file(path).map_err(AppError::ConfigError)?,
        None => InMemoryCollections::new(),
    };

    let state = AppState::new(
        config.clone(),
        Arc::new(InMemoryAccountStore::new()),
        delivery,
        Arc::new(collections),
    );

    let sweeper = spawn_session_sweeper(
        state.flow.clone(),
        Duration::from_secs(config.verification.sweep_interval_seconds),
    );

    let app = build_router(state);
    let addr = config.common.socket_addr();

    let service_span = tracing::info_span!(
        "service",
        service.name = %config.service_name,
        service.version = %config.service_version,
    );
    let _guard = service_span.enter();

    tracing::info!(
        address = %addr,
        authorization_enabled = config.gate.enabled,
        "Listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
