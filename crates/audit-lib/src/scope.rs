//! Scope validation and default scope lists
//!
//! A scope is a region or zone identifier. Scopes end up inside monitoring
//! filter expressions and request paths, so they are checked before any
//! network call is made.

use crate::error::{AuditError, Result};

/// Regions audited when the caller does not pass any
pub const DEFAULT_REGIONS: &[&str] = &[
    "us-central1",
    "us-east1",
    "us-west1",
    "europe-west1",
    "asia-east1",
];

/// Zones audited when the caller does not pass any
pub const DEFAULT_ZONES: &[&str] = &[
    "us-central1-a",
    "us-central1-b",
    "us-east1-b",
    "us-west1-a",
    "europe-west1-b",
    "asia-east1-a",
];

/// Function runtimes are only offered in a subset of regions
pub const FUNCTION_DEFAULT_REGIONS: &[&str] =
    &["us-central1", "us-east1", "us-west1", "europe-west1"];

/// Wildcard location for project-wide listings
pub const ALL_LOCATIONS: &str = "-";

/// Whether a scope names a region or a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Region,
    Zone,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Region => "region",
            ScopeKind::Zone => "zone",
        }
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owned copy of a static scope list
pub fn to_owned_scopes(scopes: &[&str]) -> Vec<String> {
    scopes.iter().map(|s| s.to_string()).collect()
}

/// Reject a region or zone that cannot safely be used in a request
pub fn validate_scope(kind: ScopeKind, scope: &str) -> Result<()> {
    check_identifier(kind.as_str(), scope)
}

pub fn validate_project_id(project_id: &str) -> Result<()> {
    check_identifier("project id", project_id)
}

fn check_identifier(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AuditError::Validation(format!(
            "{} must be a non-empty string",
            what
        )));
    }

    // Quotes and backslashes would break out of a filter literal
    if let Some(bad) = value
        .chars()
        .find(|c| c.is_whitespace() || *c == '"' || *c == '\\')
    {
        return Err(AuditError::Validation(format!(
            "{} {:?} contains invalid character {:?}",
            what, value, bad
        )));
    }

    Ok(())
}
