//! Audit orchestration across audit types, projects and project groups

use crate::aggregate::merge_results;
use crate::auditor::{
    CloudFunctions, ComputeInstances, DatabaseInstances, PersistentDisks, ResourceAuditor,
    ResourceKind, ResourceLister, ServerlessServices, StaticAddresses, StorageAuditor,
    DEFAULT_MAX_CONCURRENT_SCOPES,
};
use crate::error::{AuditError, Result};
use crate::metrics::{MetricClient, RetryPolicy, TimeSeriesSource};
use crate::models::{
    AuditResult, CloudFunction, ComputeInstance, DatabaseInstance, OptimizationRecommendation,
    PersistentDisk, ProjectData, ServerlessService, StaticAddress,
};
use crate::observability::{AuditLogger, AuditMetrics};
use crate::projects::billing_key;
use crate::thresholds::AuditConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

/// The six audits run for every project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    CloudRun,
    CloudFunctions,
    ComputeEngine,
    CloudSql,
    PersistentDisks,
    StaticIps,
}

impl AuditType {
    pub const ALL: [AuditType; 6] = [
        AuditType::CloudRun,
        AuditType::CloudFunctions,
        AuditType::ComputeEngine,
        AuditType::CloudSql,
        AuditType::PersistentDisks,
        AuditType::StaticIps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditType::CloudRun => ServerlessServices::AUDIT_TYPE,
            AuditType::CloudFunctions => CloudFunctions::AUDIT_TYPE,
            AuditType::ComputeEngine => ComputeInstances::AUDIT_TYPE,
            AuditType::CloudSql => DatabaseInstances::AUDIT_TYPE,
            AuditType::PersistentDisks => PersistentDisks::AUDIT_TYPE,
            AuditType::StaticIps => StaticAddresses::AUDIT_TYPE,
        }
    }
}

impl std::fmt::Display for AuditType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditType {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        AuditType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| AuditError::Validation(format!("unknown audit type: {}", s)))
    }
}

/// Listing clients for every resource kind plus the metric backend
#[derive(Clone)]
pub struct CloudClients {
    pub services: Arc<dyn ResourceLister<ServerlessService>>,
    pub functions: Arc<dyn ResourceLister<CloudFunction>>,
    pub instances: Arc<dyn ResourceLister<ComputeInstance>>,
    pub databases: Arc<dyn ResourceLister<DatabaseInstance>>,
    pub disks: Arc<dyn ResourceLister<PersistentDisk>>,
    pub addresses: Arc<dyn ResourceLister<StaticAddress>>,
    /// Without a backend every usage metric reads as zero
    pub time_series: Option<Arc<dyn TimeSeriesSource>>,
}

/// Which scopes to scan and how hard
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeSelection {
    /// Overrides the region defaults of region-scoped kinds
    pub regions: Option<Vec<String>>,
    /// Overrides the zone defaults of zone-scoped kinds
    pub zones: Option<Vec<String>>,
    pub max_concurrent_scopes: usize,
    pub retry: RetryPolicy,
}

impl Default for ScopeSelection {
    fn default() -> Self {
        Self {
            regions: None,
            zones: None,
            max_concurrent_scopes: DEFAULT_MAX_CONCURRENT_SCOPES,
            retry: RetryPolicy::default(),
        }
    }
}

/// All audit results for one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub project_id: String,
    pub billing_account_id: Option<String>,
    /// Keyed by audit type
    pub results: BTreeMap<String, AuditResult>,
    pub total_potential_savings: f64,
}

impl ProjectReport {
    /// Every recommendation, high priority first, then by savings
    pub fn recommendations_by_priority(&self) -> Vec<&OptimizationRecommendation> {
        let mut recommendations: Vec<_> = self
            .results
            .values()
            .flat_map(|r| r.recommendations.iter())
            .collect();
        sort_by_priority(&mut recommendations);
        recommendations
    }

    pub fn issue_count(&self) -> usize {
        self.results.values().map(|r| r.issues.len()).sum()
    }
}

/// Order recommendations by severity, then by savings, both descending
pub fn sort_by_priority(recommendations: &mut [&OptimizationRecommendation]) {
    recommendations.sort_by(|a, b| {
        b.priority.cmp(&a.priority).then_with(|| {
            b.potential_monthly_savings
                .total_cmp(&a.potential_monthly_savings)
        })
    });
}

/// One project group: member reports plus results merged across members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    pub group_key: String,
    pub billing_account_id: Option<String>,
    pub projects: Vec<ProjectReport>,
    pub results: BTreeMap<String, AuditResult>,
    pub total_potential_savings: f64,
}

/// Compact view of a group for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_key: String,
    pub billing_account_id: Option<String>,
    pub project_ids: Vec<String>,
    pub total_recommendations: usize,
    pub issues: usize,
    pub potential_monthly_savings: f64,
}

impl GroupReport {
    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            group_key: self.group_key.clone(),
            billing_account_id: self.billing_account_id.clone(),
            project_ids: self.projects.iter().map(|p| p.project_id.clone()).collect(),
            total_recommendations: self
                .results
                .values()
                .map(|r| r.recommendations.len())
                .sum(),
            issues: self.results.values().map(|r| r.issues.len()).sum(),
            potential_monthly_savings: self.total_potential_savings,
        }
    }
}

/// Outcome of a whole audit run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiProjectReport {
    pub generated_at: DateTime<Utc>,
    pub groups: Vec<GroupReport>,
    /// Keyed by audit type, merged over every audited project
    pub results: BTreeMap<String, AuditResult>,
    pub total_potential_savings: f64,
}

impl MultiProjectReport {
    pub fn project_count(&self) -> usize {
        self.groups.iter().map(|g| g.projects.len()).sum()
    }

    pub fn issue_count(&self) -> usize {
        self.results.values().map(|r| r.issues.len()).sum()
    }

    pub fn recommendations_by_priority(&self) -> Vec<&OptimizationRecommendation> {
        let mut recommendations: Vec<_> = self
            .results
            .values()
            .flat_map(|r| r.recommendations.iter())
            .collect();
        sort_by_priority(&mut recommendations);
        recommendations
    }
}

/// Runs the audit types over projects with shared clients
#[derive(Clone)]
pub struct AuditRunner {
    clients: CloudClients,
    config: Arc<AuditConfig>,
    scopes: ScopeSelection,
    cancel: Option<watch::Receiver<bool>>,
    logger: AuditLogger,
    metrics: AuditMetrics,
}

impl AuditRunner {
    pub fn new(clients: CloudClients, config: Arc<AuditConfig>, scopes: ScopeSelection) -> Self {
        Self {
            clients,
            config,
            scopes,
            cancel: None,
            logger: AuditLogger::new("audit-runner"),
            metrics: AuditMetrics::new(),
        }
    }

    /// Abort metric retries once the flag flips to `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_logger(mut self, logger: AuditLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Whether usage metrics come from a real monitoring backend
    pub fn has_time_series(&self) -> bool {
        self.clients.time_series.is_some()
    }

    /// Scopes an audit type scans under the current selection
    pub fn scopes_for(&self, audit_type: AuditType) -> Vec<String> {
        let regions = self.scopes.regions.clone();
        let zones = self.scopes.zones.clone();
        match audit_type {
            AuditType::CloudRun => regions.unwrap_or_else(ServerlessServices::default_scopes),
            AuditType::CloudFunctions => regions.unwrap_or_else(CloudFunctions::default_scopes),
            AuditType::ComputeEngine => zones.unwrap_or_else(ComputeInstances::default_scopes),
            AuditType::CloudSql => regions.unwrap_or_else(DatabaseInstances::default_scopes),
            AuditType::PersistentDisks => zones.unwrap_or_else(PersistentDisks::default_scopes),
            AuditType::StaticIps => regions.unwrap_or_else(StaticAddresses::default_scopes),
        }
    }

    /// Run one audit type for one project
    pub async fn run_specific_audit(
        &self,
        project_id: &str,
        audit_type: AuditType,
    ) -> Result<AuditResult> {
        let scopes = self.scopes_for(audit_type);
        self.logger
            .log_audit_started(project_id, audit_type.as_str(), scopes.len());
        let started = Instant::now();

        let result = match audit_type {
            AuditType::CloudRun => {
                self.auditor::<ServerlessServices>(project_id, &self.clients.services)?
                    .audit_all(Some(&scopes))
                    .await?
            }
            AuditType::CloudFunctions => {
                self.auditor::<CloudFunctions>(project_id, &self.clients.functions)?
                    .audit_all(Some(&scopes))
                    .await?
            }
            AuditType::ComputeEngine => {
                self.auditor::<ComputeInstances>(project_id, &self.clients.instances)?
                    .audit_all(Some(&scopes))
                    .await?
            }
            AuditType::CloudSql => {
                self.auditor::<DatabaseInstances>(project_id, &self.clients.databases)?
                    .audit_all(Some(&scopes))
                    .await?
            }
            AuditType::PersistentDisks => {
                self.storage_auditor(project_id)?
                    .audit_disks(Some(&scopes))
                    .await?
            }
            AuditType::StaticIps => {
                self.storage_auditor(project_id)?
                    .audit_static_ips(Some(&scopes))
                    .await?
            }
        };

        for issue in &result.issues {
            self.logger
                .log_scope_issue(project_id, audit_type.as_str(), issue);
        }
        self.logger
            .log_audit_completed(project_id, &result, started.elapsed().as_millis());
        Ok(result)
    }

    /// Run every audit type for one project
    ///
    /// An audit type that fails outright leaves an empty result carrying
    /// one issue; the remaining types still run.
    pub async fn run_project(&self, project: &ProjectData) -> ProjectReport {
        let mut results = BTreeMap::new();

        for audit_type in AuditType::ALL {
            let result = match self.run_specific_audit(&project.project_id, audit_type).await {
                Ok(result) => result,
                Err(err) => {
                    let issue = format!("{} audit failed: {}", audit_type, err);
                    self.logger
                        .log_scope_issue(&project.project_id, audit_type.as_str(), &issue);
                    AuditResult {
                        issues: vec![issue],
                        ..AuditResult::empty(audit_type.as_str())
                    }
                }
            };
            results.insert(audit_type.as_str().to_string(), result);
        }

        ProjectReport {
            project_id: project.project_id.clone(),
            billing_account_id: project.billing_account_id.clone(),
            total_potential_savings: total_savings(&results),
            results,
        }
    }

    /// Run every project of one group and merge per audit type
    pub async fn run_group(&self, group_key: &str, projects: &[ProjectData]) -> GroupReport {
        let mut reports = Vec::with_capacity(projects.len());
        for project in projects {
            reports.push(self.run_project(project).await);
        }

        let results = merge_reports(&reports);
        GroupReport {
            group_key: group_key.to_string(),
            billing_account_id: billing_key(group_key)
                .map(str::to_string)
                .or_else(|| shared_billing_account(&reports)),
            total_potential_savings: total_savings(&results),
            projects: reports,
            results,
        }
    }

    /// Run every group and merge over all projects
    pub async fn run_groups(&self, groups: &BTreeMap<String, Vec<ProjectData>>) -> MultiProjectReport {
        let mut reports = Vec::with_capacity(groups.len());
        for (key, projects) in groups {
            reports.push(self.run_group(key, projects).await);
        }

        let all_projects: Vec<ProjectReport> = reports
            .iter()
            .flat_map(|g| g.projects.iter().cloned())
            .collect();
        let results = merge_reports(&all_projects);

        let report = MultiProjectReport {
            generated_at: Utc::now(),
            groups: reports,
            total_potential_savings: total_savings(&results),
            results,
        };

        for result in report.results.values() {
            self.metrics.record_result(result);
        }
        self.metrics
            .set_projects_audited(report.project_count() as i64);
        self.metrics.mark_run_finished();
        self.logger.log_run_completed(
            report.groups.len(),
            report.project_count(),
            report.total_potential_savings,
            report.issue_count(),
        );

        report
    }

    fn metric_client(&self, project_id: &str) -> MetricClient {
        let client = MetricClient::new(self.clients.time_series.clone(), project_id)
            .with_retry_policy(self.scopes.retry.clone());
        match &self.cancel {
            Some(cancel) => client.with_cancellation(cancel.clone()),
            None => client,
        }
    }

    fn auditor<K: ResourceKind>(
        &self,
        project_id: &str,
        lister: &Arc<dyn ResourceLister<K::Resource>>,
    ) -> Result<ResourceAuditor<K>> {
        Ok(ResourceAuditor::new(
            project_id,
            Arc::clone(lister),
            self.metric_client(project_id),
            Arc::clone(&self.config),
        )?
        .with_max_concurrent_scopes(self.scopes.max_concurrent_scopes))
    }

    fn storage_auditor(&self, project_id: &str) -> Result<StorageAuditor> {
        Ok(StorageAuditor::new(
            self.auditor::<PersistentDisks>(project_id, &self.clients.disks)?,
            self.auditor::<StaticAddresses>(project_id, &self.clients.addresses)?,
        ))
    }
}

fn total_savings(results: &BTreeMap<String, AuditResult>) -> f64 {
    results
        .values()
        .fold(0.0, |total, r| total + r.potential_monthly_savings)
}

fn merge_reports(reports: &[ProjectReport]) -> BTreeMap<String, AuditResult> {
    AuditType::ALL
        .into_iter()
        .map(|audit_type| {
            let key = audit_type.as_str();
            let merged = merge_results(
                key,
                reports.iter().filter_map(|report| {
                    report
                        .results
                        .get(key)
                        .map(|result| (report.project_id.as_str(), result))
                }),
            );
            (key.to_string(), merged)
        })
        .collect()
}

/// Billing account every member agrees on, if any
fn shared_billing_account(reports: &[ProjectReport]) -> Option<String> {
    let first = reports.first()?.billing_account_id.clone()?;
    reports
        .iter()
        .all(|r| r.billing_account_id.as_deref() == Some(first.as_str()))
        .then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Labels, Priority};
    use async_trait::async_trait;

    /// Lister returning the same resources for every scope of every project,
    /// except projects it denies
    struct FixedLister<R> {
        resources: Vec<R>,
        denied_project: Option<&'static str>,
    }

    impl<R> FixedLister<R> {
        fn empty() -> Arc<Self> {
            Arc::new(Self {
                resources: Vec::new(),
                denied_project: None,
            })
        }
    }

    #[async_trait]
    impl<R: Clone + Send + Sync> ResourceLister<R> for FixedLister<R> {
        async fn list(&self, project_id: &str, _scope: &str) -> Result<Vec<R>> {
            if self.denied_project == Some(project_id) {
                return Err(AuditError::PermissionDenied("list".into()));
            }
            Ok(self.resources.clone())
        }
    }

    fn disk(name: &str, size_gb: u64) -> PersistentDisk {
        PersistentDisk {
            name: name.into(),
            zone: "us-central1-a".into(),
            size_gb,
            disk_type: "pd-ssd".into(),
            status: "READY".into(),
            in_use: false,
            labels: Labels::new(),
        }
    }

    fn service(name: &str, min_instances: u32) -> ServerlessService {
        ServerlessService {
            name: name.into(),
            region: "us-central1".into(),
            labels: Labels::new(),
            cpu_always_allocated: false,
            memory_limit: "256Mi".into(),
            min_instances,
            max_instances: 10,
            ingress: "INGRESS_TRAFFIC_ALL".into(),
        }
    }

    fn clients(
        services: Vec<ServerlessService>,
        disks: Vec<PersistentDisk>,
        denied_disks: Option<&'static str>,
    ) -> CloudClients {
        CloudClients {
            services: Arc::new(FixedLister {
                resources: services,
                denied_project: None,
            }),
            functions: FixedLister::empty(),
            instances: FixedLister::empty(),
            databases: FixedLister::empty(),
            disks: Arc::new(FixedLister {
                resources: disks,
                denied_project: denied_disks,
            }),
            addresses: FixedLister::empty(),
            time_series: None,
        }
    }

    fn single_scopes() -> ScopeSelection {
        ScopeSelection {
            regions: Some(vec!["us-central1".into()]),
            zones: Some(vec!["us-central1-a".into()]),
            ..ScopeSelection::default()
        }
    }

    fn project(id: &str, billing: Option<&str>) -> ProjectData {
        ProjectData {
            project_id: id.into(),
            billing_account_id: billing.map(str::to_string),
        }
    }

    #[test]
    fn test_audit_type_names() {
        let names: Vec<_> = AuditType::ALL.iter().map(AuditType::as_str).collect();
        assert_eq!(
            names,
            vec![
                "cloud_run",
                "cloud_functions",
                "compute_engine",
                "cloud_sql",
                "persistent_disks",
                "static_ips"
            ]
        );
        assert_eq!("cloud_sql".parse::<AuditType>().unwrap(), AuditType::CloudSql);
        assert!("gke".parse::<AuditType>().is_err());
        assert_eq!(
            serde_json::to_string(&AuditType::StaticIps).unwrap(),
            "\"static_ips\""
        );
    }

    #[test]
    fn test_scope_overrides() {
        let runner = AuditRunner::new(
            clients(vec![], vec![], None),
            Arc::new(AuditConfig::default()),
            ScopeSelection {
                regions: Some(vec!["europe-west1".into()]),
                ..ScopeSelection::default()
            },
        );
        assert_eq!(runner.scopes_for(AuditType::CloudSql), vec!["europe-west1"]);
        assert_eq!(runner.scopes_for(AuditType::StaticIps), vec!["europe-west1"]);
        assert_eq!(
            runner.scopes_for(AuditType::ComputeEngine),
            ComputeInstances::default_scopes()
        );
    }

    #[tokio::test]
    async fn test_run_specific_audit() {
        let runner = AuditRunner::new(
            clients(vec![service("api", 2)], vec![], None),
            Arc::new(AuditConfig::default()),
            single_scopes(),
        );

        let result = runner
            .run_specific_audit("shop-prod", AuditType::CloudRun)
            .await
            .unwrap();

        assert_eq!(result.resource_type, "cloud_run");
        assert_eq!(result.total_count, 1);
        // idle (no metrics backend), low memory, min instances
        assert_eq!(result.recommendations.len(), 3);
        assert_eq!(result.potential_monthly_savings, 10.0 + 15.0 + 80.0);
    }

    #[tokio::test]
    async fn test_invalid_project_fails_fast() {
        let runner = AuditRunner::new(
            clients(vec![], vec![], None),
            Arc::new(AuditConfig::default()),
            single_scopes(),
        );
        let err = runner
            .run_specific_audit("bad project", AuditType::ComputeEngine)
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Validation(_)));
    }

    #[tokio::test]
    async fn test_failed_audit_type_does_not_stop_project() {
        let runner = AuditRunner::new(
            clients(vec![service("api", 1)], vec![disk("orphan", 100)], None),
            Arc::new(AuditConfig::default()),
            ScopeSelection {
                regions: Some(vec!["us central1".into()]),
                zones: Some(vec!["us-central1-a".into()]),
                ..ScopeSelection::default()
            },
        );

        let report = runner.run_project(&project("shop-prod", None)).await;

        assert_eq!(report.results.len(), 6);
        let cloud_run = &report.results["cloud_run"];
        assert_eq!(cloud_run.total_count, 0);
        assert_eq!(cloud_run.issues.len(), 1);
        assert!(cloud_run.issues[0].starts_with("cloud_run audit failed: invalid input"));

        let disks = &report.results["persistent_disks"];
        assert_eq!(disks.idle_count, 1);
        assert!((report.total_potential_savings - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_run_groups_merges_projects() {
        let runner = AuditRunner::new(
            clients(
                vec![service("api", 1)],
                vec![disk("orphan", 250)],
                Some("shop-dev"),
            ),
            Arc::new(AuditConfig::default()),
            single_scopes(),
        );
        let mut groups = BTreeMap::new();
        groups.insert(
            "0A1B2C-3D4E5F-6A7B8C".to_string(),
            vec![
                project("shop-prod", Some("0A1B2C-3D4E5F-6A7B8C")),
                project("shop-dev", Some("0A1B2C-3D4E5F-6A7B8C")),
            ],
        );
        groups.insert(
            "SINGLE_data-lake".to_string(),
            vec![project("data-lake", Some("99ZZ00-11YY22-33XX44"))],
        );

        let report = runner.run_groups(&groups).await;

        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.project_count(), 3);
        assert_eq!(
            report.groups[1].billing_account_id.as_deref(),
            Some("99ZZ00-11YY22-33XX44")
        );

        let disks = &report.results["persistent_disks"];
        assert_eq!(disks.total_count, 2);
        assert_eq!(
            disks.issues,
            vec!["[shop-dev] Permission denied for zone us-central1-a"]
        );

        let merged: f64 = report
            .results
            .values()
            .map(|r| r.potential_monthly_savings)
            .sum();
        assert!((report.total_potential_savings - merged).abs() < 1e-9);
        let by_group: f64 = report.groups.iter().map(|g| g.total_potential_savings).sum();
        assert!((report.total_potential_savings - by_group).abs() < 1e-9);

        let summary = report.groups[0].summary();
        assert_eq!(summary.project_ids, vec!["shop-prod", "shop-dev"]);
        assert_eq!(summary.issues, 1);
    }

    #[tokio::test]
    async fn test_recommendations_by_priority() {
        let runner = AuditRunner::new(
            clients(vec![service("api", 1)], vec![disk("big", 2000)], None),
            Arc::new(AuditConfig::default()),
            single_scopes(),
        );

        let report = runner.run_project(&project("shop-prod", None)).await;
        let ordered = report.recommendations_by_priority();

        let priorities: Vec<_> = ordered.iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);

        // Unattached 2000 GB disk outranks the min-instance finding
        assert_eq!(ordered[0].resource_name, "big");
        assert_eq!(ordered[1].issue, "Min instances set to 1 (always-on cost)");
        assert_eq!(ordered.last().map(|r| r.priority), Some(Priority::Medium));
    }
}
