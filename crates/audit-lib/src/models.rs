//! Data models for the audit engine
//!
//! Resource descriptors are listed fresh on every scan. Recommendations and
//! audit results are the structures serialized outward to the API and CLI.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource labels, ordered so serialized output is stable
pub type Labels = BTreeMap<String, String>;

/// Common view over every listed resource kind
pub trait ResourceDescriptor {
    fn name(&self) -> &str;

    /// Region or zone the resource lives in
    fn location(&self) -> &str;

    /// Label mapping, or `None` for kinds that cannot carry labels
    fn labels(&self) -> Option<&Labels>;

    fn is_untagged(&self) -> bool {
        self.labels().map(|labels| labels.is_empty()).unwrap_or(false)
    }
}

macro_rules! impl_descriptor {
    ($ty:ty, $location:ident) => {
        impl ResourceDescriptor for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn location(&self) -> &str {
                &self.$location
            }

            fn labels(&self) -> Option<&Labels> {
                Some(&self.labels)
            }
        }
    };
}

/// Request-driven serverless service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerlessService {
    pub name: String,
    pub region: String,
    pub labels: Labels,
    /// CPU stays allocated between requests
    pub cpu_always_allocated: bool,
    /// Container memory limit as written in the service spec, e.g. `512Mi`
    pub memory_limit: String,
    pub min_instances: u32,
    pub max_instances: u32,
    pub ingress: String,
}

/// Event- or HTTP-triggered function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudFunction {
    pub name: String,
    pub region: String,
    pub runtime: String,
    pub memory_mb: u64,
    pub timeout_seconds: u64,
    pub labels: Labels,
    pub trigger_type: TriggerType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Http,
    Event,
    Unknown,
}

/// Virtual machine instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeInstance {
    pub name: String,
    pub zone: String,
    pub machine_type: String,
    /// Lifecycle status such as `RUNNING` or `TERMINATED`
    pub status: String,
    pub labels: Labels,
    /// Preemptible or spot pricing
    pub preemptible: bool,
}

/// Managed relational database instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInstance {
    pub name: String,
    pub region: String,
    pub database_version: String,
    pub tier: String,
    /// Instance state; `RUNNABLE` means serving
    pub state: String,
    pub labels: Labels,
    pub storage_gb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentDisk {
    pub name: String,
    pub zone: String,
    pub size_gb: u64,
    pub disk_type: String,
    pub status: String,
    /// Attached to at least one instance
    pub in_use: bool,
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticAddress {
    pub name: String,
    pub region: String,
    pub address: String,
    /// `EXTERNAL` or `INTERNAL`
    pub address_type: String,
    pub status: String,
    pub in_use: bool,
}

impl_descriptor!(ServerlessService, region);
impl_descriptor!(CloudFunction, region);
impl_descriptor!(ComputeInstance, zone);
impl_descriptor!(DatabaseInstance, region);
impl_descriptor!(PersistentDisk, zone);

impl ResourceDescriptor for StaticAddress {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &str {
        &self.region
    }

    // Addresses carry no labels and never count as untagged
    fn labels(&self) -> Option<&Labels> {
        None
    }
}

/// Usage over the lookback window for a serverless service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub request_count: u64,
    /// Percent, 0-100
    pub avg_cpu_utilization: f64,
    /// Percent, 0-100
    pub avg_memory_utilization: f64,
    pub cold_start_count: u64,
    pub avg_request_latency_ms: f64,
}

/// Usage over the lookback window for a function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetrics {
    pub invocations: u64,
    pub avg_execution_time_ms: f64,
    pub error_count: u64,
    pub avg_memory_usage_mb: f64,
}

impl FunctionMetrics {
    /// Failed invocations as a percentage; zero when nothing ran
    pub fn error_rate(&self) -> f64 {
        if self.invocations == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.invocations as f64 * 100.0
    }
}

/// Usage over the lookback window for a database instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMetrics {
    pub avg_connections: f64,
    /// Percent, 0-100
    pub avg_cpu_utilization: f64,
    /// Percent, 0-100
    pub avg_memory_utilization: f64,
}

/// Recommendation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// A single cost-optimization finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecommendation {
    /// Resource kind tag, e.g. `cloud_run` or `persistent_disk`
    pub resource_type: String,
    pub resource_name: String,
    /// Region or zone
    pub region: String,
    pub issue: String,
    pub recommendation: String,
    /// Estimated USD per month, never negative
    pub potential_monthly_savings: f64,
    pub priority: Priority,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

/// Summary of one audit type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub resource_type: String,
    pub total_count: u64,
    pub untagged_count: u64,
    /// May count a resource twice when two idle rules fire for it
    pub idle_count: u64,
    pub over_provisioned_count: u64,
    pub issues: Vec<String>,
    pub recommendations: Vec<OptimizationRecommendation>,
    pub potential_monthly_savings: f64,
}

impl AuditResult {
    /// Empty result for a resource type
    pub fn empty(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    /// Sum of savings over the recommendation list
    pub fn recommended_savings(&self) -> f64 {
        self.recommendations
            .iter()
            .fold(0.0, |total, r| total + r.potential_monthly_savings)
    }
}

/// A project selected for auditing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectData {
    pub project_id: String,
    pub billing_account_id: Option<String>,
}

/// Lifecycle state of a project in the resource directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectState {
    Active,
    DeleteRequested,
    Other(String),
}

impl ProjectState {
    pub fn parse(state: &str) -> Self {
        match state {
            "ACTIVE" => ProjectState::Active,
            "DELETE_REQUESTED" => ProjectState::DeleteRequested,
            other => ProjectState::Other(other.to_string()),
        }
    }
}

/// Project as returned by the resource directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub project_id: String,
    pub display_name: Option<String>,
    pub state: ProjectState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering_and_serde() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
        assert_eq!("MEDIUM".parse::<Priority>().unwrap(), Priority::Medium);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_untagged_detection() {
        let disk = PersistentDisk {
            name: "data".into(),
            zone: "us-central1-a".into(),
            size_gb: 100,
            disk_type: "pd-standard".into(),
            status: "READY".into(),
            in_use: false,
            labels: Labels::new(),
        };
        assert!(disk.is_untagged());

        let address = StaticAddress {
            name: "ip".into(),
            region: "us-central1".into(),
            address: "34.1.2.3".into(),
            address_type: "EXTERNAL".into(),
            status: "RESERVED".into(),
            in_use: false,
        };
        assert!(!address.is_untagged());
        assert_eq!(address.location(), "us-central1");
    }

    #[test]
    fn test_function_error_rate() {
        let metrics = FunctionMetrics {
            invocations: 200,
            error_count: 20,
            ..Default::default()
        };
        assert_eq!(metrics.error_rate(), 10.0);
        assert_eq!(FunctionMetrics::default().error_rate(), 0.0);
    }

    #[test]
    fn test_audit_result_serialization_fields() {
        let result = AuditResult::empty("static_ips");
        let json = serde_json::to_value(&result).unwrap();
        for field in [
            "resource_type",
            "total_count",
            "untagged_count",
            "idle_count",
            "over_provisioned_count",
            "issues",
            "recommendations",
            "potential_monthly_savings",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
    }
}
