//! Managed relational database instances
//!
//! The database listing API is project-wide; the default scope is the
//! all-locations wildcard and region scopes filter the listing.

use super::{Counter, Finding, ResourceKind, Rule};
use crate::metrics::{MetricClient, MetricQuery, TimeWindow};
use crate::models::{DatabaseInstance, DatabaseMetrics, Priority};
use crate::scope::{ScopeKind, ALL_LOCATIONS};
use crate::thresholds::AuditConfig;
use async_trait::async_trait;

const MONITORED_RESOURCE: &str = "cloudsql_database";
const CONNECTIONS: &str = "cloudsql.googleapis.com/database/network/connections";
const CPU_UTILIZATION: &str = "cloudsql.googleapis.com/database/cpu/utilization";
const MEMORY_UTILIZATION: &str = "cloudsql.googleapis.com/database/memory/utilization";

/// State of a serving instance
const RUNNABLE: &str = "RUNNABLE";

pub struct DatabaseInstances;

// Both idle rules may fire for the same instance and count it twice
const RULES: &[Rule<DatabaseInstances>] = &[
    Rule {
        name: "not_running",
        counts_as: Some(Counter::Idle),
        check: not_running,
    },
    Rule {
        name: "idle_connections",
        counts_as: Some(Counter::Idle),
        check: idle_connections,
    },
    Rule {
        name: "low_cpu",
        counts_as: Some(Counter::OverProvisioned),
        check: low_cpu,
    },
];

#[async_trait]
impl ResourceKind for DatabaseInstances {
    type Resource = DatabaseInstance;
    type Metrics = DatabaseMetrics;

    const RESOURCE_TYPE: &'static str = "cloud_sql";
    const AUDIT_TYPE: &'static str = "cloud_sql";
    const SCOPE_KIND: ScopeKind = ScopeKind::Region;

    fn default_scopes() -> Vec<String> {
        vec![ALL_LOCATIONS.to_string()]
    }

    fn rules() -> &'static [Rule<Self>] {
        RULES
    }

    async fn collect_metrics(
        instance: &DatabaseInstance,
        client: &MetricClient,
        window: &TimeWindow,
    ) -> DatabaseMetrics {
        let database_id = format!("{}:{}", client.project_id(), instance.name);
        let query = |metric: &str| {
            MetricQuery::new(metric, MONITORED_RESOURCE).label("database_id", database_id.as_str())
        };

        let connections = query(CONNECTIONS);
        let cpu = query(CPU_UTILIZATION);
        let memory = query(MEMORY_UTILIZATION);

        let (connections, cpu, memory) = tokio::join!(
            client.query_metric(&connections, window),
            client.query_metric(&cpu, window),
            client.query_metric(&memory, window),
        );

        DatabaseMetrics {
            avg_connections: connections,
            avg_cpu_utilization: cpu * 100.0,
            avg_memory_utilization: memory * 100.0,
        }
    }
}

fn not_running(i: &DatabaseInstance, _: &DatabaseMetrics, config: &AuditConfig) -> Option<Finding> {
    if i.state == RUNNABLE {
        return None;
    }
    Some(
        Finding::new(
            Priority::Medium,
            format!("Instance is in {} state", i.state),
            "Delete if no longer needed",
            config.costs.cloud_sql_stopped,
        )
        .detail("state", i.state.as_str()),
    )
}

fn idle_connections(
    _: &DatabaseInstance,
    m: &DatabaseMetrics,
    config: &AuditConfig,
) -> Option<Finding> {
    if m.avg_connections >= config.thresholds.connection_count_idle {
        return None;
    }
    Some(
        Finding::new(
            Priority::High,
            format!(
                "Very low connection count (avg < {})",
                config.thresholds.connection_count_idle
            ),
            "Consider deleting or stopping this instance",
            config.costs.cloud_sql_idle,
        )
        .detail("avg_connections", m.avg_connections),
    )
}

fn low_cpu(i: &DatabaseInstance, m: &DatabaseMetrics, config: &AuditConfig) -> Option<Finding> {
    if m.avg_cpu_utilization >= config.thresholds.cpu_utilization_low {
        return None;
    }
    Some(
        Finding::new(
            Priority::Medium,
            format!("Low CPU utilization ({:.1}%)", m.avg_cpu_utilization),
            "Consider downsizing to a smaller machine type",
            config.costs.cloud_sql_downsizing,
        )
        .detail("current_tier", i.tier.as_str())
        .detail("avg_cpu_utilization", m.avg_cpu_utilization),
    )
}
