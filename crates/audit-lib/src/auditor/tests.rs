//! Scenario tests for the resource auditors

use super::*;
use crate::error::TransientKind;
use crate::metrics::{PointValue, TimeSeries, TimeSeriesRequest, TimeSeriesSource};
use crate::models::{
    CloudFunction, ComputeInstance, DatabaseInstance, Labels, PersistentDisk, ServerlessService,
    StaticAddress, TriggerType,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Lister answering from a per-scope table; unknown scopes are empty
struct MockLister<R> {
    responses: HashMap<String, Result<Vec<R>>>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl<R> MockLister<R> {
    fn new() -> Self {
        Self {
            responses: HashMap::new(),
            delays: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn scope(mut self, scope: &str, response: Result<Vec<R>>) -> Self {
        self.responses.insert(scope.to_string(), response);
        self
    }

    fn delay(mut self, scope: &str, delay: Duration) -> Self {
        self.delays.insert(scope.to_string(), delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R: Clone + Send + Sync> ResourceLister<R> for MockLister<R> {
    async fn list(&self, _project_id: &str, scope: &str) -> Result<Vec<R>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(scope) {
            tokio::time::sleep(*delay).await;
        }
        self.responses
            .get(scope)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Metric source matching filter substrings, first match wins
struct FixedMetrics {
    values: Vec<(&'static str, f64)>,
}

#[async_trait]
impl TimeSeriesSource for FixedMetrics {
    async fn list_time_series(&self, request: &TimeSeriesRequest) -> Result<Vec<TimeSeries>> {
        let value = self
            .values
            .iter()
            .find(|(needle, _)| request.filter.contains(needle))
            .map(|(_, v)| *v);
        Ok(value
            .map(|v| {
                vec![TimeSeries {
                    points: vec![PointValue::Double(v)],
                }]
            })
            .unwrap_or_default())
    }
}

fn metric_client(values: Vec<(&'static str, f64)>) -> MetricClient {
    MetricClient::new(Some(Arc::new(FixedMetrics { values })), "test-project")
}

fn auditor<K: ResourceKind>(
    lister: Arc<dyn ResourceLister<K::Resource>>,
    metrics: MetricClient,
) -> ResourceAuditor<K> {
    ResourceAuditor::new("test-project", lister, metrics, Arc::new(AuditConfig::default()))
        .unwrap()
}

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn service(name: &str, region: &str, min_instances: u32) -> ServerlessService {
    ServerlessService {
        name: name.into(),
        region: region.into(),
        labels: labels(&[("team", "web")]),
        cpu_always_allocated: false,
        memory_limit: "512Mi".into(),
        min_instances,
        max_instances: 100,
        ingress: "INGRESS_TRAFFIC_ALL".into(),
    }
}

fn disk(name: &str, zone: &str, size_gb: u64, in_use: bool) -> PersistentDisk {
    PersistentDisk {
        name: name.into(),
        zone: zone.into(),
        size_gb,
        disk_type: "pd-standard".into(),
        status: "READY".into(),
        in_use,
        labels: Labels::new(),
    }
}

fn scopes(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Busy service: plenty of requests, healthy utilization
fn busy_metrics() -> MetricClient {
    metric_client(vec![
        ("startup", 3.0),
        ("request_count", 5000.0),
        ("cpu/utilizations", 0.55),
        ("memory/utilizations", 0.6),
        ("request_latencies", 120.0),
    ])
}

#[tokio::test]
async fn test_empty_scope_list_yields_empty_result() {
    let lister = Arc::new(MockLister::<ServerlessService>::new());
    let auditor = auditor::<ServerlessServices>(lister.clone(), busy_metrics());

    let result = auditor.audit_all(Some(&[])).await.unwrap();

    assert_eq!(result, AuditResult::empty("cloud_run"));
    assert_eq!(lister.calls(), 0);
}

#[tokio::test]
async fn test_invalid_scope_fails_before_any_listing() {
    let lister = Arc::new(MockLister::<ServerlessService>::new());
    let auditor = auditor::<ServerlessServices>(lister.clone(), busy_metrics());

    let err = auditor
        .audit_all(Some(&scopes(&["us-central1", ""])))
        .await
        .unwrap_err();

    assert!(matches!(err, AuditError::Validation(_)));
    assert_eq!(lister.calls(), 0);
}

#[tokio::test]
async fn test_permission_denied_scope_is_recorded_and_others_continue() {
    let lister = Arc::new(
        MockLister::new()
            .scope("us-central1", Ok(vec![service("api", "us-central1", 1)]))
            .scope(
                "us-east1",
                Err(AuditError::PermissionDenied("run.services.list".into())),
            )
            .scope("europe-west1", Ok(vec![service("worker", "europe-west1", 2)])),
    );
    let auditor = auditor::<ServerlessServices>(lister, busy_metrics());

    let result = auditor
        .audit_all(Some(&scopes(&["us-central1", "us-east1", "europe-west1"])))
        .await
        .unwrap();

    assert_eq!(result.issues, vec!["Permission denied for region us-east1"]);
    assert_eq!(result.total_count, 2);
    let names: Vec<_> = result
        .recommendations
        .iter()
        .map(|r| r.resource_name.as_str())
        .collect();
    assert_eq!(names, vec!["api", "worker"]);
    assert_eq!(result.potential_monthly_savings, 40.0 + 80.0);
}

#[tokio::test]
async fn test_unknown_error_is_recorded_with_message() {
    let lister = Arc::new(MockLister::<PersistentDisk>::new().scope(
        "us-west1-a",
        Err(AuditError::Unknown("HTTP 429: quota exhausted".into())),
    ));
    let auditor = auditor::<PersistentDisks>(lister, MetricClient::new(None, "test-project"));

    let result = auditor
        .audit_all(Some(&scopes(&["us-west1-a"])))
        .await
        .unwrap();

    assert_eq!(
        result.issues,
        vec!["Error auditing zone us-west1-a: HTTP 429: quota exhausted"]
    );
}

#[tokio::test]
async fn test_missing_scope_is_empty_not_an_issue() {
    let lister = Arc::new(MockLister::<ComputeInstance>::new().scope(
        "asia-east1-a",
        Err(AuditError::NotFound("zone has no instances".into())),
    ));
    let auditor = auditor::<ComputeInstances>(lister.clone(), MetricClient::new(None, "p"));

    assert!(auditor.list_resources("asia-east1-a").await.unwrap().is_empty());
    let result = auditor
        .audit_all(Some(&scopes(&["asia-east1-a"])))
        .await
        .unwrap();
    assert!(result.issues.is_empty());
    assert_eq!(result.total_count, 0);
}

#[tokio::test]
async fn test_list_resources_propagates_permission_denied() {
    let lister = Arc::new(MockLister::<ComputeInstance>::new().scope(
        "us-east1-b",
        Err(AuditError::PermissionDenied("compute.instances.list".into())),
    ));
    let auditor = auditor::<ComputeInstances>(lister, MetricClient::new(None, "p"));

    let err = auditor.list_resources("us-east1-b").await.unwrap_err();
    assert!(err.is_permission_denied());
}

#[tokio::test]
async fn test_idle_service_without_min_instances() {
    let lister = Arc::new(
        MockLister::new().scope("us-central1", Ok(vec![service("quiet", "us-central1", 0)])),
    );
    // Nothing recorded at all: every metric reads as zero
    let auditor = auditor::<ServerlessServices>(lister, metric_client(vec![]));

    let result = auditor
        .audit_all(Some(&scopes(&["us-central1"])))
        .await
        .unwrap();

    let idle: Vec<_> = result
        .recommendations
        .iter()
        .filter(|r| r.issue.starts_with("Idle service"))
        .collect();
    assert_eq!(idle.len(), 1);
    assert_eq!(idle[0].priority, Priority::Medium);
    assert_eq!(idle[0].potential_monthly_savings, 10.0);
    assert!(!result
        .recommendations
        .iter()
        .any(|r| r.issue.starts_with("Min instances")));
    assert_eq!(result.idle_count, 1);
}

#[tokio::test]
async fn test_oversized_memory_limit_keeps_scope_findings() {
    let mut svc = service("huge", "us-central1", 0);
    svc.memory_limit = "18014398509481984Gi".into();
    let lister = Arc::new(MockLister::new().scope("us-central1", Ok(vec![svc])));
    let auditor = auditor::<ServerlessServices>(lister, metric_client(vec![]));

    let result = auditor
        .audit_all(Some(&scopes(&["us-central1"])))
        .await
        .unwrap();

    assert!(result.issues.is_empty(), "{:?}", result.issues);
    assert!(result
        .recommendations
        .iter()
        .any(|r| r.issue.starts_with("Idle service")));
    let memory = result
        .recommendations
        .iter()
        .find(|r| r.issue.starts_with("Low memory utilization"))
        .unwrap();
    assert_eq!(memory.details["current_memory"], "18014398509481984Gi");
}

#[tokio::test]
async fn test_min_instance_savings_scale_with_count() {
    let lister = Arc::new(
        MockLister::new().scope("us-central1", Ok(vec![service("warm", "us-central1", 3)])),
    );

    for metrics in [busy_metrics(), metric_client(vec![])] {
        let auditor = auditor::<ServerlessServices>(lister.clone(), metrics);
        let result = auditor
            .audit_all(Some(&scopes(&["us-central1"])))
            .await
            .unwrap();

        let min_instances = result
            .recommendations
            .iter()
            .find(|r| r.issue.starts_with("Min instances"))
            .unwrap();
        assert_eq!(min_instances.potential_monthly_savings, 3.0 * 40.0);
        assert_eq!(min_instances.priority, Priority::High);
        assert_eq!(min_instances.details["current_min_instances"], 3);
    }
}

#[tokio::test]
async fn test_cpu_always_allocated_and_low_memory() {
    let mut svc = service("batch", "us-west1", 0);
    svc.cpu_always_allocated = true;
    svc.memory_limit = "1Gi".into();
    let lister = Arc::new(MockLister::new().scope("us-west1", Ok(vec![svc])));
    let metrics = metric_client(vec![
        ("startup", 0.0),
        ("request_count", 40.0),
        ("cpu/utilizations", 0.04),
        ("memory/utilizations", 0.1),
    ]);
    let auditor = auditor::<ServerlessServices>(lister, metrics);

    let result = auditor
        .audit_all(Some(&scopes(&["us-west1"])))
        .await
        .unwrap();

    assert_eq!(result.recommendations.len(), 2);
    assert_eq!(result.over_provisioned_count, 1);
    assert_eq!(result.idle_count, 0);

    let cpu = &result.recommendations[0];
    assert_eq!(cpu.priority, Priority::High);
    assert_eq!(cpu.issue, "CPU allocated 'always' but usage only 4.0%");

    let memory = &result.recommendations[1];
    assert_eq!(memory.recommendation, "Reduce memory from 1Gi to 512Mi");
    assert_eq!(memory.details["recommended_memory"], "512Mi");
    assert_eq!(result.potential_monthly_savings, 30.0 + 15.0);
}

#[tokio::test]
async fn test_function_rules() {
    let function = |name: &str| CloudFunction {
        name: name.into(),
        region: "us-central1".into(),
        runtime: "python311".into(),
        memory_mb: 1024,
        timeout_seconds: 60,
        labels: Labels::new(),
        trigger_type: TriggerType::Http,
    };
    let lister = Arc::new(
        MockLister::new().scope("us-central1", Ok(vec![function("resize-images")])),
    );
    let metrics = metric_client(vec![
        ("status!=", 100.0),
        ("execution_count", 1000.0),
        ("execution_times", 250.0),
        ("user_memory_bytes", 100.0 * 1024.0 * 1024.0),
    ]);
    let auditor = auditor::<CloudFunctions>(lister, metrics);

    let result = auditor
        .audit_all(Some(&scopes(&["us-central1"])))
        .await
        .unwrap();

    assert_eq!(result.total_count, 1);
    assert_eq!(result.untagged_count, 1);
    assert_eq!(result.idle_count, 0);
    assert_eq!(result.over_provisioned_count, 1);
    assert_eq!(result.recommendations.len(), 2);

    let memory = &result.recommendations[0];
    assert_eq!(memory.priority, Priority::Low);
    assert_eq!(memory.recommendation, "Reduce memory allocation to 512MB");

    let errors = &result.recommendations[1];
    assert_eq!(errors.priority, Priority::High);
    assert_eq!(errors.issue, "High error rate (10.0%)");
    assert_eq!(errors.resource_type, "cloud_function");
}

#[tokio::test]
async fn test_stopped_database_with_no_connections_counts_idle_twice() {
    let instance = DatabaseInstance {
        name: "orders".into(),
        region: "us-central1".into(),
        database_version: "POSTGRES_15".into(),
        tier: "db-custom-2-7680".into(),
        state: "SUSPENDED".into(),
        labels: labels(&[("env", "prod")]),
        storage_gb: 10,
    };
    let lister = Arc::new(MockLister::new().scope("-", Ok(vec![instance])));
    let auditor = auditor::<DatabaseInstances>(lister, metric_client(vec![]));

    let result = auditor.audit_all(None).await.unwrap();

    assert_eq!(result.total_count, 1);
    assert_eq!(result.idle_count, 2);
    assert_eq!(result.over_provisioned_count, 1);
    assert_eq!(result.potential_monthly_savings, 50.0 + 100.0 + 50.0);
    assert_eq!(result.recommendations[0].region, "us-central1");
}

#[tokio::test]
async fn test_compute_rules() {
    let instance = |name: &str, status: &str, preemptible: bool| ComputeInstance {
        name: name.into(),
        zone: "us-central1-a".into(),
        machine_type: "e2-standard-4".into(),
        status: status.into(),
        labels: Labels::new(),
        preemptible,
    };
    let lister = Arc::new(MockLister::new().scope(
        "us-central1-a",
        Ok(vec![
            instance("old-batch", "TERMINATED", false),
            instance("web", "RUNNING", false),
            instance("spot-worker", "RUNNING", true),
        ]),
    ));
    let auditor = auditor::<ComputeInstances>(lister, MetricClient::new(None, "p"));

    let result = auditor
        .audit_all(Some(&scopes(&["us-central1-a"])))
        .await
        .unwrap();

    assert_eq!(result.total_count, 3);
    assert_eq!(result.untagged_count, 3);
    assert_eq!(result.idle_count, 1);
    assert_eq!(result.recommendations.len(), 2);
    assert_eq!(
        result.recommendations[0].issue,
        "Instance is TERMINATED but still incurring storage costs"
    );
    assert_eq!(result.recommendations[1].resource_name, "web");
    assert_eq!(result.recommendations[1].priority, Priority::Low);
}

#[tokio::test]
async fn test_storage_auditor_disks_and_addresses() {
    let disks = Arc::new(MockLister::new().scope(
        "us-central1-a",
        Ok(vec![
            disk("orphan", "us-central1-a", 500, false),
            disk("boot", "us-central1-a", 10, true),
        ]),
    ));
    let address = |name: &str, kind: &str| StaticAddress {
        name: name.into(),
        region: "us-central1".into(),
        address: "10.0.0.5".into(),
        address_type: kind.into(),
        status: "RESERVED".into(),
        in_use: false,
    };
    let addresses = Arc::new(MockLister::new().scope(
        "us-central1",
        Ok(vec![address("public", "EXTERNAL"), address("private", "INTERNAL")]),
    ));
    let storage = StorageAuditor::new(
        auditor::<PersistentDisks>(disks, MetricClient::new(None, "p")),
        auditor::<StaticAddresses>(addresses, MetricClient::new(None, "p")),
    );

    let disk_result = storage
        .audit_disks(Some(&scopes(&["us-central1-a"])))
        .await
        .unwrap();
    assert_eq!(disk_result.resource_type, "persistent_disks");
    assert_eq!(disk_result.untagged_count, 2);
    assert_eq!(disk_result.idle_count, 1);
    assert!((disk_result.potential_monthly_savings - 20.0).abs() < 1e-9);

    let ip_result = storage
        .audit_static_ips(Some(&scopes(&["us-central1"])))
        .await
        .unwrap();
    assert_eq!(ip_result.resource_type, "static_ips");
    assert_eq!(ip_result.untagged_count, 0);
    assert_eq!(ip_result.idle_count, 2);
    assert_eq!(ip_result.recommendations[0].potential_monthly_savings, 7.0);
    assert_eq!(ip_result.recommendations[1].potential_monthly_savings, 0.0);
    assert_eq!(ip_result.potential_monthly_savings, 7.0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_scopes_merge_in_scope_order() {
    let lister = Arc::new(
        MockLister::new()
            .scope("us-central1-a", Ok(vec![disk("slow", "us-central1-a", 100, false)]))
            .delay("us-central1-a", Duration::from_secs(5))
            .scope("us-east1-b", Ok(vec![disk("fast", "us-east1-b", 50, false)]))
            .scope(
                "us-west1-a",
                Err(AuditError::transient(TransientKind::Unavailable, "busy")),
            ),
    );
    let auditor = auditor::<PersistentDisks>(lister, MetricClient::new(None, "p"))
        .with_max_concurrent_scopes(3);

    let result = auditor
        .audit_all(Some(&scopes(&["us-central1-a", "us-east1-b", "us-west1-a"])))
        .await
        .unwrap();

    let names: Vec<_> = result
        .recommendations
        .iter()
        .map(|r| r.resource_name.as_str())
        .collect();
    assert_eq!(names, vec!["slow", "fast"]);
    assert_eq!(
        result.issues,
        vec!["Error auditing zone us-west1-a: service unavailable: busy"]
    );
}

#[tokio::test]
async fn test_savings_always_match_recommendations() {
    let lister = Arc::new(
        MockLister::new()
            .scope("us-central1", Ok(vec![service("a", "us-central1", 2)]))
            .scope("us-east1", Ok(vec![service("b", "us-east1", 0)])),
    );
    for metrics in [busy_metrics(), metric_client(vec![])] {
        let auditor = auditor::<ServerlessServices>(lister.clone(), metrics);
        let result = auditor.audit_all(None).await.unwrap();
        assert_eq!(result.potential_monthly_savings, result.recommended_savings());
    }
}

#[tokio::test]
async fn test_repeated_audits_are_identical() {
    let lister = Arc::new(
        MockLister::new()
            .scope("us-central1", Ok(vec![service("a", "us-central1", 1)]))
            .scope(
                "asia-east1",
                Err(AuditError::PermissionDenied("run.services.list".into())),
            ),
    );
    let auditor = auditor::<ServerlessServices>(lister, busy_metrics());

    let first = serde_json::to_string(&auditor.audit_all(None).await.unwrap()).unwrap();
    let second = serde_json::to_string(&auditor.audit_all(None).await.unwrap()).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_scope_issue_wording() {
    assert_eq!(
        scope_issue(
            ScopeKind::Zone,
            "us-east1-b",
            &AuditError::PermissionDenied("x".into())
        ),
        "Permission denied for zone us-east1-b"
    );
    assert_eq!(
        scope_issue(
            ScopeKind::Region,
            "us-east1",
            &AuditError::Unknown("boom".into())
        ),
        "Error auditing region us-east1: boom"
    );
}

#[test]
fn test_auditor_rejects_empty_project() {
    let lister: Arc<dyn ResourceLister<PersistentDisk>> = Arc::new(MockLister::new());
    let result = ResourceAuditor::<PersistentDisks>::new(
        "",
        lister,
        MetricClient::new(None, ""),
        Arc::new(AuditConfig::default()),
    );
    assert!(matches!(result, Err(AuditError::Validation(_))));
}
