//! Resource auditors
//!
//! One generic [`ResourceAuditor`] drives every resource kind. A kind
//! supplies its listing client, how to collect usage metrics, and a rule
//! table; the auditor handles scope validation, concurrent per-scope scans,
//! issue recording and aggregation.
//!
//! Supported kinds:
//! - [`ServerlessServices`]: request-driven serverless services
//! - [`CloudFunctions`]: event-driven functions
//! - [`ComputeInstances`]: virtual machines
//! - [`DatabaseInstances`]: managed relational databases
//! - [`PersistentDisks`] and [`StaticAddresses`]: storage and network artifacts

mod compute;
mod database;
mod functions;
mod serverless;
mod storage;

#[cfg(test)]
mod tests;

pub use compute::ComputeInstances;
pub use database::DatabaseInstances;
pub use functions::CloudFunctions;
pub use serverless::ServerlessServices;
pub use storage::{PersistentDisks, StaticAddresses, StorageAuditor};

use crate::aggregate::{aggregate, ScopeTally};
use crate::error::{AuditError, Result};
use crate::metrics::{MetricClient, TimeWindow};
use crate::models::{AuditResult, OptimizationRecommendation, Priority, ResourceDescriptor};
use crate::observability::AuditMetrics;
use crate::scope::{validate_project_id, validate_scope, ScopeKind};
use crate::thresholds::AuditConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Scopes scanned in parallel unless configured otherwise
pub const DEFAULT_MAX_CONCURRENT_SCOPES: usize = 4;

/// Lists resources of one kind in one scope
#[async_trait]
pub trait ResourceLister<R>: Send + Sync {
    async fn list(&self, project_id: &str, scope: &str) -> Result<Vec<R>>;
}

/// Counter a firing rule increments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Idle,
    OverProvisioned,
}

/// Outcome of a rule that fired
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub priority: Priority,
    pub issue: String,
    pub recommendation: String,
    pub potential_monthly_savings: f64,
    pub details: BTreeMap<String, Value>,
}

impl Finding {
    pub fn new(
        priority: Priority,
        issue: impl Into<String>,
        recommendation: impl Into<String>,
        potential_monthly_savings: f64,
    ) -> Self {
        Self {
            priority,
            issue: issue.into(),
            recommendation: recommendation.into(),
            potential_monthly_savings,
            details: BTreeMap::new(),
        }
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// One row of a kind's rule table
pub struct Rule<K: ResourceKind> {
    pub name: &'static str,
    pub counts_as: Option<Counter>,
    pub check: fn(&K::Resource, &K::Metrics, &AuditConfig) -> Option<Finding>,
}

/// A resource kind the generic auditor can scan
#[async_trait]
pub trait ResourceKind: Sized + Send + Sync + 'static {
    type Resource: ResourceDescriptor + Clone + Send + Sync + 'static;
    type Metrics: Default + Send + Sync + 'static;

    /// Tag carried by each recommendation
    const RESOURCE_TYPE: &'static str;
    /// Key of the summary result
    const AUDIT_TYPE: &'static str;
    const SCOPE_KIND: ScopeKind;

    fn default_scopes() -> Vec<String>;

    /// Rules evaluated in order for every resource
    fn rules() -> &'static [Rule<Self>];

    /// Usage metrics for one resource; kinds without metrics keep the default
    async fn collect_metrics(
        _resource: &Self::Resource,
        _client: &MetricClient,
        _window: &TimeWindow,
    ) -> Self::Metrics {
        Self::Metrics::default()
    }
}

/// Run every rule against one resource, updating the tally
pub fn evaluate_rules<K: ResourceKind>(
    resource: &K::Resource,
    metrics: &K::Metrics,
    config: &AuditConfig,
    tally: &mut ScopeTally,
) {
    for rule in K::rules() {
        let Some(finding) = (rule.check)(resource, metrics, config) else {
            continue;
        };

        match rule.counts_as {
            Some(Counter::Idle) => tally.idle_count += 1,
            Some(Counter::OverProvisioned) => tally.over_provisioned_count += 1,
            None => {}
        }

        debug!(
            resource_type = K::RESOURCE_TYPE,
            resource = %resource.name(),
            rule = rule.name,
            "Rule fired"
        );

        tally.recommendations.push(OptimizationRecommendation {
            resource_type: K::RESOURCE_TYPE.to_string(),
            resource_name: resource.name().to_string(),
            region: resource.location().to_string(),
            issue: finding.issue,
            recommendation: finding.recommendation,
            potential_monthly_savings: finding.potential_monthly_savings.max(0.0),
            priority: finding.priority,
            details: finding.details,
        });
    }
}

/// Issue string recorded for a scope that could not be scanned
pub fn scope_issue(kind: ScopeKind, scope: &str, err: &AuditError) -> String {
    match err {
        AuditError::PermissionDenied(_) => format!("Permission denied for {} {}", kind, scope),
        other => format!("Error auditing {} {}: {}", kind, scope, other),
    }
}

/// Audits one resource kind in one project
pub struct ResourceAuditor<K: ResourceKind> {
    project_id: String,
    lister: Arc<dyn ResourceLister<K::Resource>>,
    metrics: MetricClient,
    config: Arc<AuditConfig>,
    max_concurrent_scopes: usize,
    telemetry: AuditMetrics,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> Clone for ResourceAuditor<K> {
    fn clone(&self) -> Self {
        Self {
            project_id: self.project_id.clone(),
            lister: Arc::clone(&self.lister),
            metrics: self.metrics.clone(),
            config: Arc::clone(&self.config),
            max_concurrent_scopes: self.max_concurrent_scopes,
            telemetry: self.telemetry.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: ResourceKind> ResourceAuditor<K> {
    pub fn new(
        project_id: impl Into<String>,
        lister: Arc<dyn ResourceLister<K::Resource>>,
        metrics: MetricClient,
        config: Arc<AuditConfig>,
    ) -> Result<Self> {
        let project_id = project_id.into();
        validate_project_id(&project_id)?;

        Ok(Self {
            project_id,
            lister,
            metrics,
            config,
            max_concurrent_scopes: DEFAULT_MAX_CONCURRENT_SCOPES,
            telemetry: AuditMetrics::new(),
            _kind: PhantomData,
        })
    }

    pub fn with_max_concurrent_scopes(mut self, max: usize) -> Self {
        self.max_concurrent_scopes = max.max(1);
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Resources of this kind in one scope; a missing scope is empty
    pub async fn list_resources(&self, scope: &str) -> Result<Vec<K::Resource>> {
        validate_scope(K::SCOPE_KIND, scope)?;

        match self.lister.list(&self.project_id, scope).await {
            Ok(resources) => Ok(resources),
            Err(AuditError::NotFound(message)) => {
                debug!(
                    project_id = %self.project_id,
                    audit_type = K::AUDIT_TYPE,
                    scope = %scope,
                    message = %message,
                    "Scope has no resources"
                );
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Audit every scope, or the kind's defaults when `scopes` is `None`
    ///
    /// Invalid scopes fail the whole call before any request is made. Any
    /// failure inside a scope becomes one issue string and the other
    /// scopes carry on.
    pub async fn audit_all(&self, scopes: Option<&[String]>) -> Result<AuditResult> {
        let scopes = match scopes {
            Some(scopes) => scopes.to_vec(),
            None => K::default_scopes(),
        };
        for scope in &scopes {
            validate_scope(K::SCOPE_KIND, scope)?;
        }

        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_scopes.max(1)));
        let mut tasks = JoinSet::new();

        for (index, scope) in scopes.iter().cloned().enumerate() {
            let auditor = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (index, auditor.scan_scope(&scope).await)
            });
        }

        // Each worker owns its tally; merge afterwards in scope order
        let mut slots: Vec<Option<ScopeTally>> = (0..scopes.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, tally)) => slots[index] = Some(tally),
                Err(err) => error!(
                    project_id = %self.project_id,
                    audit_type = K::AUDIT_TYPE,
                    error = %err,
                    "Scope scan task failed"
                ),
            }
        }

        let tallies = slots.into_iter().zip(&scopes).map(|(slot, scope)| {
            slot.unwrap_or_else(|| {
                self.telemetry.inc_scope_issues(K::AUDIT_TYPE);
                ScopeTally::with_issue(format!(
                    "Error auditing {} {}: scan task aborted",
                    K::SCOPE_KIND,
                    scope
                ))
            })
        });
        let result = aggregate(K::AUDIT_TYPE, tallies);

        self.telemetry
            .observe_audit_duration(K::AUDIT_TYPE, started.elapsed().as_secs_f64());
        Ok(result)
    }

    async fn scan_scope(&self, scope: &str) -> ScopeTally {
        let mut tally = ScopeTally::default();

        if let Err(err) = self.scan_into(scope, &mut tally).await {
            let issue = scope_issue(K::SCOPE_KIND, scope, &err);
            if err.is_permission_denied() {
                warn!(
                    project_id = %self.project_id,
                    audit_type = K::AUDIT_TYPE,
                    scope = %scope,
                    "{}", issue
                );
            } else {
                error!(
                    project_id = %self.project_id,
                    audit_type = K::AUDIT_TYPE,
                    scope = %scope,
                    error = %err,
                    "{}", issue
                );
            }
            self.telemetry.inc_scope_issues(K::AUDIT_TYPE);
            tally.issues.push(issue);
        }

        tally
    }

    async fn scan_into(&self, scope: &str, tally: &mut ScopeTally) -> Result<()> {
        let resources = self.list_resources(scope).await?;
        tally.total_count += resources.len() as u64;

        let window = TimeWindow::last_days(self.config.lookback_days);
        for resource in &resources {
            if resource.is_untagged() {
                tally.untagged_count += 1;
            }
            let metrics = K::collect_metrics(resource, &self.metrics, &window).await;
            evaluate_rules::<K>(resource, &metrics, &self.config, tally);
        }

        Ok(())
    }
}
