//! Storage and network artifacts: unattached disks and unused static addresses

use super::{Counter, Finding, ResourceAuditor, ResourceKind, Rule};
use crate::error::Result;
use crate::models::{AuditResult, PersistentDisk, Priority, StaticAddress};
use crate::scope::{to_owned_scopes, ScopeKind, DEFAULT_REGIONS, DEFAULT_ZONES};
use crate::thresholds::AuditConfig;
use async_trait::async_trait;

pub struct PersistentDisks;

pub struct StaticAddresses;

const DISK_RULES: &[Rule<PersistentDisks>] = &[Rule {
    name: "unattached",
    counts_as: Some(Counter::Idle),
    check: unattached_disk,
}];

const ADDRESS_RULES: &[Rule<StaticAddresses>] = &[Rule {
    name: "unused",
    counts_as: Some(Counter::Idle),
    check: unused_address,
}];

#[async_trait]
impl ResourceKind for PersistentDisks {
    type Resource = PersistentDisk;
    type Metrics = ();

    const RESOURCE_TYPE: &'static str = "persistent_disk";
    const AUDIT_TYPE: &'static str = "persistent_disks";
    const SCOPE_KIND: ScopeKind = ScopeKind::Zone;

    fn default_scopes() -> Vec<String> {
        to_owned_scopes(DEFAULT_ZONES)
    }

    fn rules() -> &'static [Rule<Self>] {
        DISK_RULES
    }
}

#[async_trait]
impl ResourceKind for StaticAddresses {
    type Resource = StaticAddress;
    type Metrics = ();

    const RESOURCE_TYPE: &'static str = "static_ip";
    const AUDIT_TYPE: &'static str = "static_ips";
    const SCOPE_KIND: ScopeKind = ScopeKind::Region;

    fn default_scopes() -> Vec<String> {
        to_owned_scopes(DEFAULT_REGIONS)
    }

    fn rules() -> &'static [Rule<Self>] {
        ADDRESS_RULES
    }
}

fn unattached_disk(d: &PersistentDisk, _: &(), config: &AuditConfig) -> Option<Finding> {
    if d.in_use {
        return None;
    }
    Some(
        Finding::new(
            Priority::High,
            "Unattached disk incurring storage costs",
            "Delete if no longer needed, or create snapshot and delete",
            d.size_gb as f64 * config.costs.disk_storage_per_gb,
        )
        .detail("size_gb", d.size_gb)
        .detail("disk_type", d.disk_type.as_str())
        .detail("in_use", false),
    )
}

fn unused_address(a: &StaticAddress, _: &(), config: &AuditConfig) -> Option<Finding> {
    if a.in_use {
        return None;
    }
    // Internal addresses are free to hold
    let savings = if a.address_type == "EXTERNAL" {
        config.costs.static_ip_external
    } else {
        0.0
    };
    Some(
        Finding::new(
            Priority::Medium,
            "Unused static IP incurring charges",
            "Release if no longer needed",
            savings,
        )
        .detail("address", a.address.as_str())
        .detail("address_type", a.address_type.as_str())
        .detail("in_use", false),
    )
}

/// Disk and address audits for one project behind a single handle
#[derive(Clone)]
pub struct StorageAuditor {
    disks: ResourceAuditor<PersistentDisks>,
    addresses: ResourceAuditor<StaticAddresses>,
}

impl StorageAuditor {
    pub fn new(
        disks: ResourceAuditor<PersistentDisks>,
        addresses: ResourceAuditor<StaticAddresses>,
    ) -> Self {
        Self { disks, addresses }
    }

    pub async fn audit_disks(&self, zones: Option<&[String]>) -> Result<AuditResult> {
        self.disks.audit_all(zones).await
    }

    pub async fn audit_static_ips(&self, regions: Option<&[String]>) -> Result<AuditResult> {
        self.addresses.audit_all(regions).await
    }
}
