//! Threshold and cost-estimate tables
//!
//! Flat monthly USD estimates per finding and the utilization thresholds
//! that trigger them. These are design inputs, not computed values. The
//! engine only reads them; the agent may override them from its config file.

use serde::{Deserialize, Serialize};

/// Lookback window for usage metrics (days)
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Monthly savings estimates in USD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostEstimates {
    pub cloud_function_idle: f64,
    pub cloud_function_memory_optimization: f64,
    pub cloud_function_error_reduction: f64,
    pub cloud_run_idle: f64,
    pub cloud_run_cpu_optimization: f64,
    pub cloud_run_memory_optimization: f64,
    /// Per configured minimum instance
    pub cloud_run_min_instance: f64,
    pub compute_stopped_disk_cost: f64,
    pub compute_preemptible_savings: f64,
    pub cloud_sql_stopped: f64,
    pub cloud_sql_idle: f64,
    pub cloud_sql_downsizing: f64,
    /// Per GB of unattached persistent disk
    pub disk_storage_per_gb: f64,
    pub static_ip_external: f64,
}

impl Default for CostEstimates {
    fn default() -> Self {
        Self {
            cloud_function_idle: 5.0,
            cloud_function_memory_optimization: 8.0,
            cloud_function_error_reduction: 10.0,
            cloud_run_idle: 10.0,
            cloud_run_cpu_optimization: 30.0,
            cloud_run_memory_optimization: 15.0,
            cloud_run_min_instance: 40.0,
            compute_stopped_disk_cost: 20.0,
            compute_preemptible_savings: 100.0,
            cloud_sql_stopped: 50.0,
            cloud_sql_idle: 100.0,
            cloud_sql_downsizing: 50.0,
            disk_storage_per_gb: 0.04,
            static_ip_external: 7.0,
        }
    }
}

/// Thresholds that flag a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Fraction of allocated memory actually used
    pub memory_utilization_low: f64,
    /// Fraction; compared against percent utilization after scaling by 100
    pub memory_utilization_very_low: f64,
    /// Percent
    pub cpu_utilization_low: f64,
    /// Percent
    pub cpu_utilization_very_low: f64,
    /// Percent of invocations
    pub error_rate_high: f64,
    pub connection_count_idle: f64,
    pub invocations_idle: u64,
    pub requests_idle: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            memory_utilization_low: 0.3,
            memory_utilization_very_low: 0.2,
            cpu_utilization_low: 10.0,
            cpu_utilization_very_low: 5.0,
            error_rate_high: 5.0,
            connection_count_idle: 1.0,
            invocations_idle: 0,
            requests_idle: 0,
        }
    }
}

/// How far memory recommendations cut an allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryOptimization {
    pub recommended_reduction_factor: f64,
    pub minimum_memory_mb: u64,
}

impl Default for MemoryOptimization {
    fn default() -> Self {
        Self {
            recommended_reduction_factor: 0.5,
            minimum_memory_mb: 128,
        }
    }
}

impl MemoryOptimization {
    /// Suggested allocation for a resource currently sized at `current_mb`
    pub fn recommended_mb(&self, current_mb: u64) -> u64 {
        let reduced = (current_mb as f64 * self.recommended_reduction_factor) as u64;
        reduced.max(self.minimum_memory_mb)
    }
}

/// Everything the rule tables read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub costs: CostEstimates,
    pub thresholds: Thresholds,
    pub memory: MemoryOptimization,
    pub lookback_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            costs: CostEstimates::default(),
            thresholds: Thresholds::default(),
            memory: MemoryOptimization::default(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

/// Parse a memory quantity such as `512Mi`, `1Gi`, `256M` or `2G` into MB
pub fn parse_memory_mb(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, multiplier) = if let Some(n) = value.strip_suffix("Gi") {
        (n, 1024)
    } else if let Some(n) = value.strip_suffix("Mi") {
        (n, 1)
    } else if let Some(n) = value.strip_suffix('G') {
        (n, 1024)
    } else if let Some(n) = value.strip_suffix('M') {
        (n, 1)
    } else {
        (value, 1)
    };

    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
}

/// Render MB the way serverless memory limits are written
pub fn format_memory_mb(mb: u64) -> String {
    if mb >= 1024 && mb % 1024 == 0 {
        format!("{}Gi", mb / 1024)
    } else {
        format!("{}Mi", mb)
    }
}
