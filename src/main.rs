use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tracing::{info, warn};
use wecom_notice::api::{
    create_notification_router, create_portal_router, NotificationAppState, PortalAppState,
};
use wecom_notice::config::{AppRegistry, NoticeConfig};
use wecom_notice::service::NoticeService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wecom_notice=info".into()),
        )
        .init();

    info!("wecom-notice starting...");

    let config = NoticeConfig::from_env()?;
    let registry = Arc::new(AppRegistry::new(&config));

    let apps = registry.all_apps();
    if apps.is_empty() {
        warn!("No valid applications configured");
    }
    for (name, credential) in &apps {
        info!(app = %name, corp_id = %credential.corp_id, agent_id = credential.agent_id, "Application ready");
    }

    let service = Arc::new(NoticeService::from_config(&config, registry.clone())?);

    if !config.portal.enabled && !config.server.notification_api {
        info!("Callback portal and notification API disabled, nothing to serve");
        return Ok(());
    }

    let mut app = Router::new();
    if config.portal.enabled {
        app = app.merge(create_portal_router(
            PortalAppState { registry },
            &config.portal.path,
        ));
        info!(path = %config.portal.path, "Callback portal enabled");
    }
    if config.server.notification_api {
        app = app.merge(create_notification_router(NotificationAppState { service }));
        info!("Notification API enabled at /api/notification/send");
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    info!(bind = %config.server.bind, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("wecom-notice stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
