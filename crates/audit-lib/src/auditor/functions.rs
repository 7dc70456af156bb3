//! Event-driven functions

use super::{Counter, Finding, ResourceKind, Rule};
use crate::metrics::{MetricClient, MetricQuery, TimeWindow};
use crate::models::{CloudFunction, FunctionMetrics, Priority};
use crate::scope::{to_owned_scopes, ScopeKind, FUNCTION_DEFAULT_REGIONS};
use crate::thresholds::AuditConfig;
use async_trait::async_trait;

const MONITORED_RESOURCE: &str = "cloud_function";
const EXECUTION_COUNT: &str = "cloudfunctions.googleapis.com/function/execution_count";
const EXECUTION_TIMES: &str = "cloudfunctions.googleapis.com/function/execution_times";
const USER_MEMORY_BYTES: &str = "cloudfunctions.googleapis.com/function/user_memory_bytes";
const FAILED_STATUS_FILTER: &str = "metric.label.status!=\"ok\"";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub struct CloudFunctions;

const RULES: &[Rule<CloudFunctions>] = &[
    Rule {
        name: "idle",
        counts_as: Some(Counter::Idle),
        check: idle,
    },
    Rule {
        name: "memory_over_provisioned",
        counts_as: Some(Counter::OverProvisioned),
        check: memory_over_provisioned,
    },
    Rule {
        name: "high_error_rate",
        counts_as: None,
        check: high_error_rate,
    },
];

#[async_trait]
impl ResourceKind for CloudFunctions {
    type Resource = CloudFunction;
    type Metrics = FunctionMetrics;

    const RESOURCE_TYPE: &'static str = "cloud_function";
    const AUDIT_TYPE: &'static str = "cloud_functions";
    const SCOPE_KIND: ScopeKind = ScopeKind::Region;

    fn default_scopes() -> Vec<String> {
        to_owned_scopes(FUNCTION_DEFAULT_REGIONS)
    }

    fn rules() -> &'static [Rule<Self>] {
        RULES
    }

    async fn collect_metrics(
        function: &CloudFunction,
        client: &MetricClient,
        window: &TimeWindow,
    ) -> FunctionMetrics {
        let query = |metric: &str| {
            MetricQuery::new(metric, MONITORED_RESOURCE)
                .label("function_name", function.name.as_str())
                .label("region", function.region.as_str())
        };

        let invocations = query(EXECUTION_COUNT).aggregation("sum");
        let execution_time = query(EXECUTION_TIMES);
        let errors = query(EXECUTION_COUNT)
            .aggregation("sum")
            .extra_filter(FAILED_STATUS_FILTER);
        let memory = query(USER_MEMORY_BYTES);

        let (invocations, execution_time, errors, memory_bytes) = tokio::join!(
            client.query_metric(&invocations, window),
            client.query_metric(&execution_time, window),
            client.query_metric(&errors, window),
            client.query_metric(&memory, window),
        );

        FunctionMetrics {
            invocations: invocations as u64,
            avg_execution_time_ms: execution_time,
            error_count: errors as u64,
            avg_memory_usage_mb: memory_bytes / BYTES_PER_MB,
        }
    }
}

fn idle(_: &CloudFunction, m: &FunctionMetrics, config: &AuditConfig) -> Option<Finding> {
    if m.invocations != config.thresholds.invocations_idle {
        return None;
    }
    Some(
        Finding::new(
            Priority::Medium,
            format!(
                "Unused function (zero invocations in {} days)",
                config.lookback_days
            ),
            "Consider deleting this function",
            config.costs.cloud_function_idle,
        )
        .detail("invocations", m.invocations),
    )
}

fn memory_over_provisioned(
    f: &CloudFunction,
    m: &FunctionMetrics,
    config: &AuditConfig,
) -> Option<Finding> {
    let threshold_mb = f.memory_mb as f64 * config.thresholds.memory_utilization_low;
    if m.avg_memory_usage_mb >= threshold_mb {
        return None;
    }
    let recommended_mb = config.memory.recommended_mb(f.memory_mb);
    Some(
        Finding::new(
            Priority::Low,
            format!(
                "Low memory utilization ({:.0}MB / {}MB)",
                m.avg_memory_usage_mb, f.memory_mb
            ),
            format!("Reduce memory allocation to {}MB", recommended_mb),
            config.costs.cloud_function_memory_optimization,
        )
        .detail("current_memory_mb", f.memory_mb)
        .detail("recommended_memory_mb", recommended_mb)
        .detail("avg_memory_usage_mb", m.avg_memory_usage_mb),
    )
}

fn high_error_rate(
    _: &CloudFunction,
    m: &FunctionMetrics,
    config: &AuditConfig,
) -> Option<Finding> {
    if m.invocations == 0 {
        return None;
    }
    let error_rate = m.error_rate();
    if error_rate <= config.thresholds.error_rate_high {
        return None;
    }
    Some(
        Finding::new(
            Priority::High,
            format!("High error rate ({:.1}%)", error_rate),
            "Investigate and fix errors to avoid wasted invocations",
            config.costs.cloud_function_error_reduction,
        )
        .detail("error_rate", error_rate)
        .detail("error_count", m.error_count)
        .detail("total_invocations", m.invocations),
    )
}
