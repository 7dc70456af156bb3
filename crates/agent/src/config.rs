//! Agent configuration

use anyhow::{Context, Result};
use audit_lib::auditor::DEFAULT_MAX_CONCURRENT_SCOPES;
use audit_lib::gcp::{Endpoints, StaticToken};
use audit_lib::{AuditConfig, ScopeSelection};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Config file read when `AUDIT_CONFIG_FILE` is not set
const DEFAULT_CONFIG_FILE: &str = "audit-agent";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name used in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Ambient default project, used when nothing else selects projects
    #[serde(default)]
    pub project_id: Option<String>,

    /// Comma-separated explicit project ids
    #[serde(default)]
    pub projects: Option<String>,

    /// Audit every accessible project
    #[serde(default)]
    pub all_projects: bool,

    /// Group projects by billing account
    #[serde(default)]
    pub combine: bool,

    /// Comma-separated region override
    #[serde(default)]
    pub regions: Option<String>,

    /// Comma-separated zone override
    #[serde(default)]
    pub zones: Option<String>,

    /// API server port for health/metrics/audit endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds between audit runs
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_max_concurrent_scopes")]
    pub max_concurrent_scopes: usize,

    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub access_token_file: Option<String>,

    /// Threshold and cost table overrides
    #[serde(default)]
    pub audit: AuditConfig,

    /// API base URL overrides
    #[serde(default)]
    pub endpoints: Endpoints,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "audit-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_interval() -> u64 {
    3600
}

fn default_max_concurrent_scopes() -> usize {
    DEFAULT_MAX_CONCURRENT_SCOPES
}

impl AgentConfig {
    /// Load configuration from the config file and `AUDIT_*` environment variables
    pub fn load() -> Result<Self> {
        let file = std::env::var("AUDIT_CONFIG_FILE").ok();
        Self::load_from(file.as_deref())
    }

    /// Load with an explicit config file; a missing default file is ignored
    pub fn load_from(file: Option<&str>) -> Result<Self> {
        let file_source = match file {
            Some(path) => config::File::from(Path::new(path)),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = config::Config::builder()
            .add_source(file_source)
            .add_source(config::Environment::with_prefix("AUDIT"))
            .build()
            .context("Failed to load agent configuration")?;

        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    pub fn project_list(&self) -> Option<Vec<String>> {
        split_list(self.projects.as_deref())
    }

    pub fn scope_selection(&self) -> ScopeSelection {
        ScopeSelection {
            regions: split_list(self.regions.as_deref()),
            zones: split_list(self.zones.as_deref()),
            max_concurrent_scopes: self.max_concurrent_scopes.max(1),
            ..ScopeSelection::default()
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Bearer token for the cloud APIs; an inline token wins over a token file
    pub fn token_source(&self) -> Result<StaticToken> {
        if let Some(token) = self.access_token.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(StaticToken::new(token));
        }
        if let Some(path) = &self.access_token_file {
            return StaticToken::from_file(path);
        }
        warn!("No access token configured, cloud API requests are unauthenticated");
        Ok(StaticToken::anonymous())
    }
}

/// Split a comma-separated list, dropping blanks; `None` when nothing is left
fn split_list(value: Option<&str>) -> Option<Vec<String>> {
    let items: Vec<String> = value?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!items.is_empty()).then_some(items)
}
