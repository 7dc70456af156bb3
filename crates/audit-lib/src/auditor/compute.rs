//! Virtual machine instances
//!
//! Rules read lifecycle state and pricing model only, no usage metrics.

use super::{Counter, Finding, ResourceKind, Rule};
use crate::models::{ComputeInstance, Priority};
use crate::scope::{to_owned_scopes, ScopeKind, DEFAULT_ZONES};
use crate::thresholds::AuditConfig;
use async_trait::async_trait;

/// States in which the VM is not running but its disks are still billed
const STOPPED_STATES: &[&str] = &["STOPPED", "SUSPENDED", "TERMINATED"];

pub struct ComputeInstances;

const RULES: &[Rule<ComputeInstances>] = &[
    Rule {
        name: "stopped",
        counts_as: Some(Counter::Idle),
        check: stopped,
    },
    Rule {
        name: "on_demand_pricing",
        counts_as: None,
        check: on_demand_pricing,
    },
];

#[async_trait]
impl ResourceKind for ComputeInstances {
    type Resource = ComputeInstance;
    type Metrics = ();

    const RESOURCE_TYPE: &'static str = "compute_instance";
    const AUDIT_TYPE: &'static str = "compute_engine";
    const SCOPE_KIND: ScopeKind = ScopeKind::Zone;

    fn default_scopes() -> Vec<String> {
        to_owned_scopes(DEFAULT_ZONES)
    }

    fn rules() -> &'static [Rule<Self>] {
        RULES
    }
}

fn stopped(i: &ComputeInstance, _: &(), config: &AuditConfig) -> Option<Finding> {
    if !STOPPED_STATES.contains(&i.status.as_str()) {
        return None;
    }
    Some(
        Finding::new(
            Priority::Medium,
            format!("Instance is {} but still incurring storage costs", i.status),
            "Delete instance if no longer needed, or start it if needed",
            config.costs.compute_stopped_disk_cost,
        )
        .detail("status", i.status.as_str()),
    )
}

fn on_demand_pricing(i: &ComputeInstance, _: &(), config: &AuditConfig) -> Option<Finding> {
    if i.status != "RUNNING" || i.preemptible {
        return None;
    }
    Some(
        Finding::new(
            Priority::Low,
            "Non-preemptible instance running",
            "Consider using preemptible VM for up to 80% savings (if workload allows)",
            config.costs.compute_preemptible_savings,
        )
        .detail("machine_type", i.machine_type.as_str())
        .detail("preemptible", false),
    )
}
