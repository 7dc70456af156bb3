//! Observability infrastructure for the audit engine
//!
//! Provides:
//! - Prometheus metrics (audit duration, metric query latency, retries, findings per resource type)
//! - Structured JSON logging with tracing

use crate::models::AuditResult;
use prometheus::{
    register_gauge_vec, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, register_int_gauge_vec, GaugeVec, Histogram,
    HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for monitoring queries (in seconds)
const QUERY_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Histogram buckets for whole audits (in seconds)
const AUDIT_DURATION_BUCKETS: &[f64] = &[0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AuditMetricsInner> = OnceLock::new();

struct AuditMetricsInner {
    audit_duration_seconds: HistogramVec,
    metric_query_latency_seconds: Histogram,
    metric_query_retries: IntCounter,
    metric_query_failures: IntCounterVec,
    scope_issues: IntCounterVec,
    resources_audited: IntGaugeVec,
    recommendations: IntGaugeVec,
    potential_savings_usd: GaugeVec,
    projects_audited: IntGauge,
    last_run_timestamp: IntGauge,
}

impl AuditMetricsInner {
    fn new() -> Self {
        Self {
            audit_duration_seconds: register_histogram_vec!(
                "cloud_audit_duration_seconds",
                "Time spent auditing one resource type in one project",
                &["resource_type"],
                AUDIT_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register audit_duration_seconds"),

            metric_query_latency_seconds: register_histogram!(
                "cloud_audit_metric_query_latency_seconds",
                "Time spent on a single monitoring query including retries",
                QUERY_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register metric_query_latency_seconds"),

            metric_query_retries: register_int_counter!(
                "cloud_audit_metric_query_retries_total",
                "Monitoring query attempts repeated after a transient error"
            )
            .expect("Failed to register metric_query_retries"),

            metric_query_failures: register_int_counter_vec!(
                "cloud_audit_metric_query_failures_total",
                "Monitoring queries that fell back to zero",
                &["reason"]
            )
            .expect("Failed to register metric_query_failures"),

            scope_issues: register_int_counter_vec!(
                "cloud_audit_scope_issues_total",
                "Scopes whose scan failed and was recorded as an issue",
                &["resource_type"]
            )
            .expect("Failed to register scope_issues"),

            resources_audited: register_int_gauge_vec!(
                "cloud_audit_resources",
                "Resources found in the last audit run",
                &["resource_type"]
            )
            .expect("Failed to register resources_audited"),

            recommendations: register_int_gauge_vec!(
                "cloud_audit_recommendations",
                "Recommendations produced in the last audit run",
                &["resource_type"]
            )
            .expect("Failed to register recommendations"),

            potential_savings_usd: register_gauge_vec!(
                "cloud_audit_potential_monthly_savings_usd",
                "Estimated monthly savings from the last audit run",
                &["resource_type"]
            )
            .expect("Failed to register potential_savings_usd"),

            projects_audited: register_int_gauge!(
                "cloud_audit_projects",
                "Projects covered by the last audit run"
            )
            .expect("Failed to register projects_audited"),

            last_run_timestamp: register_int_gauge!(
                "cloud_audit_last_run_timestamp_seconds",
                "Unix time the last audit run finished"
            )
            .expect("Failed to register last_run_timestamp"),
        }
    }
}

/// Audit metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying collectors.
#[derive(Clone)]
pub struct AuditMetrics {
    _private: (),
}

impl Default for AuditMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AuditMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AuditMetricsInner {
        GLOBAL_METRICS.get_or_init(AuditMetricsInner::new)
    }

    pub fn observe_audit_duration(&self, resource_type: &str, duration_secs: f64) {
        self.inner()
            .audit_duration_seconds
            .with_label_values(&[resource_type])
            .observe(duration_secs);
    }

    pub fn observe_query_latency(&self, duration_secs: f64) {
        self.inner().metric_query_latency_seconds.observe(duration_secs);
    }

    pub fn inc_query_retries(&self) {
        self.inner().metric_query_retries.inc();
    }

    pub fn inc_query_failures(&self, reason: &str) {
        self.inner()
            .metric_query_failures
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_scope_issues(&self, resource_type: &str) {
        self.inner()
            .scope_issues
            .with_label_values(&[resource_type])
            .inc();
    }

    /// Publish the findings of a finished audit type
    pub fn record_result(&self, result: &AuditResult) {
        let label = [result.resource_type.as_str()];
        let inner = self.inner();
        inner
            .resources_audited
            .with_label_values(&label)
            .set(result.total_count as i64);
        inner
            .recommendations
            .with_label_values(&label)
            .set(result.recommendations.len() as i64);
        inner
            .potential_savings_usd
            .with_label_values(&label)
            .set(result.potential_monthly_savings);
    }

    pub fn set_projects_audited(&self, count: i64) {
        self.inner().projects_audited.set(count);
    }

    pub fn mark_run_finished(&self) {
        self.inner()
            .last_run_timestamp
            .set(chrono::Utc::now().timestamp());
    }
}

/// Structured logger for audit events
#[derive(Clone)]
pub struct AuditLogger {
    instance: String,
}

impl AuditLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, selected_projects: usize) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            selected_projects,
            "Audit agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Audit agent shutting down"
        );
    }

    pub fn log_audit_started(&self, project_id: &str, audit_type: &str, scopes: usize) {
        info!(
            event = "audit_started",
            instance = %self.instance,
            project_id = %project_id,
            audit_type = %audit_type,
            scopes = scopes,
            "Audit started"
        );
    }

    pub fn log_scope_issue(&self, project_id: &str, audit_type: &str, issue: &str) {
        warn!(
            event = "scope_issue",
            instance = %self.instance,
            project_id = %project_id,
            audit_type = %audit_type,
            issue = %issue,
            "Scope could not be fully audited"
        );
    }

    pub fn log_audit_completed(&self, project_id: &str, result: &AuditResult, elapsed_ms: u128) {
        info!(
            event = "audit_completed",
            instance = %self.instance,
            project_id = %project_id,
            audit_type = %result.resource_type,
            total = result.total_count,
            untagged = result.untagged_count,
            idle = result.idle_count,
            over_provisioned = result.over_provisioned_count,
            recommendations = result.recommendations.len(),
            issues = result.issues.len(),
            potential_monthly_savings = result.potential_monthly_savings,
            elapsed_ms = elapsed_ms as u64,
            "Audit completed"
        );
    }

    pub fn log_project_skipped(&self, project_id: &str, reason: &str) {
        warn!(
            event = "project_skipped",
            instance = %self.instance,
            project_id = %project_id,
            reason = %reason,
            "Project skipped"
        );
    }

    pub fn log_run_completed(&self, groups: usize, projects: usize, savings: f64, issues: usize) {
        if issues == 0 {
            info!(
                event = "run_completed",
                instance = %self.instance,
                groups = groups,
                projects = projects,
                potential_monthly_savings = savings,
                "Audit run completed"
            );
        } else {
            warn!(
                event = "run_completed",
                instance = %self.instance,
                groups = groups,
                projects = projects,
                potential_monthly_savings = savings,
                issues = issues,
                "Audit run completed with issues"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_metrics_creation() {
        let metrics = AuditMetrics::new();

        metrics.observe_audit_duration("cloud_run", 1.5);
        metrics.observe_query_latency(0.2);
        metrics.inc_query_retries();
        metrics.inc_query_failures("permission_denied");
        metrics.inc_scope_issues("compute_engine");
        metrics.record_result(&AuditResult::empty("static_ips"));
        metrics.set_projects_audited(3);
        metrics.mark_run_finished();

        // A second handle shares the registered collectors
        let again = AuditMetrics::new();
        again.inc_query_retries();
    }

    #[test]
    fn test_audit_logger_creation() {
        let logger = AuditLogger::new("audit-agent-0");
        assert_eq!(logger.instance, "audit-agent-0");
    }
}
