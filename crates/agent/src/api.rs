//! HTTP API for health checks, Prometheus metrics and audit reports

use crate::scheduler::{AuditScheduler, ReportHandle};
use audit_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::AuditMetrics,
    AuditType, GroupSummary, OptimizationRecommendation, Priority,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AuditMetrics,
    pub reports: ReportHandle,
    /// Absent when the API only serves an existing report
    pub scheduler: Option<Arc<AuditScheduler>>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: AuditMetrics,
        scheduler: Arc<AuditScheduler>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            reports: scheduler.latest(),
            scheduler: Some(scheduler),
        }
    }

    pub fn read_only(
        health_registry: HealthRegistry,
        metrics: AuditMetrics,
        reports: ReportHandle,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            reports,
            scheduler: None,
        }
    }
}

/// Health check response - returns 200 unless a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %err, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn no_report() -> Response {
    error_response(StatusCode::NOT_FOUND, "No audit run has completed yet")
}

/// Totals of the latest run
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportOverview {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub projects: usize,
    pub issues: usize,
    pub total_potential_savings: f64,
    pub results: std::collections::BTreeMap<String, audit_lib::AuditResult>,
}

async fn list_audits(State(state): State<Arc<AppState>>) -> Response {
    let Some(report) = state.reports.read().await.clone() else {
        return no_report();
    };

    Json(ReportOverview {
        generated_at: report.generated_at,
        projects: report.project_count(),
        issues: report.issue_count(),
        total_potential_savings: report.total_potential_savings,
        results: report.results.clone(),
    })
    .into_response()
}

async fn get_audit(
    State(state): State<Arc<AppState>>,
    Path(audit_type): Path<String>,
) -> Response {
    let audit_type: AuditType = match audit_type.parse() {
        Ok(t) => t,
        Err(err) => return error_response(StatusCode::NOT_FOUND, err.to_string()),
    };

    let Some(report) = state.reports.read().await.clone() else {
        return no_report();
    };

    match report.results.get(audit_type.as_str()) {
        Some(result) => Json(result.clone()).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("No {} result in the latest run", audit_type),
        ),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationQuery {
    /// Minimum priority to include
    pub priority: Option<String>,
    pub resource_type: Option<String>,
    pub limit: Option<usize>,
}

async fn list_recommendations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecommendationQuery>,
) -> Response {
    let min_priority = match query.priority.as_deref().map(str::parse::<Priority>) {
        Some(Ok(p)) => Some(p),
        Some(Err(err)) => return error_response(StatusCode::BAD_REQUEST, err),
        None => None,
    };

    let Some(report) = state.reports.read().await.clone() else {
        return no_report();
    };

    let recommendations: Vec<OptimizationRecommendation> = report
        .recommendations_by_priority()
        .into_iter()
        .filter(|r| min_priority.map_or(true, |p| r.priority >= p))
        .filter(|r| {
            query
                .resource_type
                .as_deref()
                .map_or(true, |t| r.resource_type == t)
        })
        .take(query.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();

    Json(recommendations).into_response()
}

async fn list_groups(State(state): State<Arc<AppState>>) -> Response {
    let Some(report) = state.reports.read().await.clone() else {
        return no_report();
    };

    let groups: Vec<GroupSummary> = report.groups.iter().map(|g| g.summary()).collect();
    Json(groups).into_response()
}

/// Trigger an audit run in the background unless one is in progress
async fn refresh(State(state): State<Arc<AppState>>) -> Response {
    let Some(scheduler) = state.scheduler.clone() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Audit scheduler is not running",
        );
    };

    if !scheduler.trigger() {
        return error_response(StatusCode::CONFLICT, "An audit run is already in progress");
    }

    info!("Audit refresh started");
    (StatusCode::ACCEPTED, Json(json!({ "status": "scheduled" }))).into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/audits", get(list_audits))
        .route("/api/audits/refresh", post(refresh))
        .route("/api/audits/:audit_type", get(get_audit))
        .route("/api/recommendations", get(list_recommendations))
        .route("/api/groups", get(list_groups))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
