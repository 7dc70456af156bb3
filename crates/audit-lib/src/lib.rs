//! Audit library for cloud resource waste detection
//!
//! This crate provides the core functionality for:
//! - Scanning resource inventories per region or zone
//! - Metric retrieval with retry and graceful degradation
//! - Rule-based optimization recommendations with savings estimates
//! - Project discovery and billing-account grouping
//! - Health checks and observability

pub mod aggregate;
pub mod auditor;
pub mod error;
pub mod gcp;
pub mod health;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod projects;
pub mod runner;
pub mod scope;
pub mod thresholds;

pub use error::{AuditError, Result, TransientKind};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AuditLogger, AuditMetrics};
pub use projects::{BillingDirectory, ProjectDirectory, ProjectGroups, ProjectManager};
pub use runner::{
    AuditRunner, AuditType, CloudClients, GroupReport, GroupSummary, MultiProjectReport,
    ProjectReport, ScopeSelection,
};
pub use thresholds::AuditConfig;
