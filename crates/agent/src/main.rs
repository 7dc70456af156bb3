//! Audit Agent - cloud resource waste auditor
//!
//! Audits serverless, compute, database and storage resources across the
//! selected projects on a fixed interval and exposes the findings over HTTP.

use anyhow::Result;
use audit_agent::{
    api,
    config::AgentConfig,
    scheduler::{AuditScheduler, ProjectSelection},
};
use audit_lib::{
    gcp::{GcpBackend, RestClient},
    health::{components, HealthRegistry},
    observability::{AuditLogger, AuditMetrics},
    AuditRunner, ProjectManager,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting audit-agent");

    let config = AgentConfig::load()?;
    info!(instance = %config.instance_name, "Agent configured");

    let rest = RestClient::new(Arc::new(config.token_source()?))?;
    let backend = GcpBackend::new(rest, &config.endpoints);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::AUDIT_RUNNER).await;
    health_registry.register(components::PROJECT_MANAGER).await;
    health_registry.register(components::MONITORING).await;

    let metrics = AuditMetrics::new();
    let logger = AuditLogger::new(&config.instance_name);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let runner = AuditRunner::new(
        backend.clients,
        Arc::new(config.audit.clone()),
        config.scope_selection(),
    )
    .with_cancellation(cancel_rx)
    .with_logger(logger.clone());

    let projects = ProjectManager::new(
        backend.projects,
        backend.billing,
        config.project_id.clone(),
    );
    let selection = ProjectSelection {
        explicit: config.project_list(),
        all: config.all_projects,
        combine: config.combine,
    };

    let scheduler = Arc::new(AuditScheduler::new(
        runner,
        projects,
        selection,
        health_registry.clone(),
        config.interval(),
    ));

    logger.log_startup(AGENT_VERSION, config.project_list().map_or(0, |p| p.len()));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        Arc::clone(&scheduler),
    ));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler_handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));

    let api_handle = tokio::spawn(async move {
        if let Err(err) = api::serve(config.api_port, app_state).await {
            error!(error = %err, "API server stopped");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = cancel_tx.send(true);
    let _ = shutdown_tx.send(());
    let _ = scheduler_handle.await;
    api_handle.abort();

    info!("Shutting down");
    Ok(())
}
