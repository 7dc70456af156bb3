//! Request-driven serverless services

use super::{Counter, Finding, ResourceKind, Rule};
use crate::metrics::{MetricClient, MetricQuery, TimeWindow};
use crate::models::{Priority, ServerlessService, ServiceMetrics};
use crate::scope::{to_owned_scopes, ScopeKind, DEFAULT_REGIONS};
use crate::thresholds::{format_memory_mb, parse_memory_mb, AuditConfig};
use async_trait::async_trait;

const MONITORED_RESOURCE: &str = "cloud_run_revision";
const REQUEST_COUNT: &str = "run.googleapis.com/request_count";
const CPU_UTILIZATIONS: &str = "run.googleapis.com/container/cpu/utilizations";
const MEMORY_UTILIZATIONS: &str = "run.googleapis.com/container/memory/utilizations";
const REQUEST_LATENCIES: &str = "run.googleapis.com/request_latencies";
const STARTUP_FILTER: &str = "metric.label.response_code_class=\"startup\"";

/// Memory assumed when a service does not declare a limit
const DEFAULT_MEMORY_MB: u64 = 256;

pub struct ServerlessServices;

const RULES: &[Rule<ServerlessServices>] = &[
    Rule {
        name: "idle",
        counts_as: Some(Counter::Idle),
        check: idle,
    },
    Rule {
        name: "cpu_always_allocated",
        counts_as: Some(Counter::OverProvisioned),
        check: cpu_always_allocated,
    },
    Rule {
        name: "low_memory_utilization",
        counts_as: None,
        check: low_memory_utilization,
    },
    Rule {
        name: "min_instances",
        counts_as: None,
        check: min_instances,
    },
];

#[async_trait]
impl ResourceKind for ServerlessServices {
    type Resource = ServerlessService;
    type Metrics = ServiceMetrics;

    const RESOURCE_TYPE: &'static str = "cloud_run";
    const AUDIT_TYPE: &'static str = "cloud_run";
    const SCOPE_KIND: ScopeKind = ScopeKind::Region;

    fn default_scopes() -> Vec<String> {
        to_owned_scopes(DEFAULT_REGIONS)
    }

    fn rules() -> &'static [Rule<Self>] {
        RULES
    }

    async fn collect_metrics(
        service: &ServerlessService,
        client: &MetricClient,
        window: &TimeWindow,
    ) -> ServiceMetrics {
        let query = |metric: &str| {
            MetricQuery::new(metric, MONITORED_RESOURCE)
                .label("service_name", service.name.as_str())
                .label("location", service.region.as_str())
        };

        let requests = query(REQUEST_COUNT).aggregation("sum");
        let cpu = query(CPU_UTILIZATIONS);
        let memory = query(MEMORY_UTILIZATIONS);
        let cold_starts = query(REQUEST_COUNT)
            .aggregation("sum")
            .extra_filter(STARTUP_FILTER);
        let latency = query(REQUEST_LATENCIES);

        let (requests, cpu, memory, cold_starts, latency) = tokio::join!(
            client.query_metric(&requests, window),
            client.query_metric(&cpu, window),
            client.query_metric(&memory, window),
            client.query_metric(&cold_starts, window),
            client.query_metric(&latency, window),
        );

        ServiceMetrics {
            request_count: requests as u64,
            avg_cpu_utilization: cpu * 100.0,
            avg_memory_utilization: memory * 100.0,
            cold_start_count: cold_starts as u64,
            avg_request_latency_ms: latency,
        }
    }
}

fn idle(_: &ServerlessService, m: &ServiceMetrics, config: &AuditConfig) -> Option<Finding> {
    if m.request_count != config.thresholds.requests_idle {
        return None;
    }
    Some(
        Finding::new(
            Priority::Medium,
            format!(
                "Idle service (zero requests in {} days)",
                config.lookback_days
            ),
            "Consider deleting or archiving this service",
            config.costs.cloud_run_idle,
        )
        .detail("request_count", m.request_count),
    )
}

fn cpu_always_allocated(
    s: &ServerlessService,
    m: &ServiceMetrics,
    config: &AuditConfig,
) -> Option<Finding> {
    if !s.cpu_always_allocated || m.avg_cpu_utilization >= config.thresholds.cpu_utilization_low {
        return None;
    }
    Some(
        Finding::new(
            Priority::High,
            format!(
                "CPU allocated 'always' but usage only {:.1}%",
                m.avg_cpu_utilization
            ),
            "Change CPU allocation to 'request-only' (CPU throttling)",
            config.costs.cloud_run_cpu_optimization,
        )
        .detail("current_allocation", "always")
        .detail("avg_cpu_utilization", m.avg_cpu_utilization),
    )
}

fn low_memory_utilization(
    s: &ServerlessService,
    m: &ServiceMetrics,
    config: &AuditConfig,
) -> Option<Finding> {
    if m.avg_memory_utilization >= config.thresholds.memory_utilization_very_low * 100.0 {
        return None;
    }
    let current_mb = parse_memory_mb(&s.memory_limit).unwrap_or(DEFAULT_MEMORY_MB);
    let recommended = format_memory_mb(config.memory.recommended_mb(current_mb));
    Some(
        Finding::new(
            Priority::Medium,
            format!(
                "Low memory utilization ({:.1}%)",
                m.avg_memory_utilization
            ),
            format!("Reduce memory from {} to {}", s.memory_limit, recommended),
            config.costs.cloud_run_memory_optimization,
        )
        .detail("current_memory", s.memory_limit.as_str())
        .detail("recommended_memory", recommended)
        .detail("avg_memory_utilization", m.avg_memory_utilization),
    )
}

fn min_instances(
    s: &ServerlessService,
    m: &ServiceMetrics,
    config: &AuditConfig,
) -> Option<Finding> {
    if s.min_instances == 0 {
        return None;
    }
    Some(
        Finding::new(
            Priority::High,
            format!("Min instances set to {} (always-on cost)", s.min_instances),
            "Set min instances to 0 unless cold starts are critical",
            f64::from(s.min_instances) * config.costs.cloud_run_min_instance,
        )
        .detail("current_min_instances", s.min_instances)
        .detail("cold_start_count", m.cold_start_count),
    )
}
