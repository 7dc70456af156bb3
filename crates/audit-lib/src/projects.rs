//! Project discovery, validation and billing-account grouping

use crate::error::{AuditError, Result};
use crate::models::{ProjectData, ProjectInfo, ProjectState};
use crate::observability::AuditLogger;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Group key for projects without a linked billing account
pub const NO_BILLING: &str = "NO_BILLING";

/// Prefix of group keys when projects are audited one by one
pub const SINGLE_PREFIX: &str = "SINGLE_";

const BILLING_ACCOUNT_PREFIX: &str = "billingAccounts/";

/// Project groups keyed by billing account id, `NO_BILLING` or `SINGLE_{project}`
pub type ProjectGroups = BTreeMap<String, Vec<String>>;

/// Resource directory of projects
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Every project the caller can see, in any state
    async fn list_projects(&self) -> Result<Vec<ProjectInfo>>;

    async fn get_project(&self, project_id: &str) -> Result<ProjectInfo>;
}

/// Billing linkage lookup
#[async_trait]
pub trait BillingDirectory: Send + Sync {
    /// Full billing account name (`billingAccounts/XXXX`), `None` when unlinked
    async fn billing_account_name(&self, project_id: &str) -> Result<Option<String>>;
}

/// Decides which projects an audit run covers and how they are grouped
#[derive(Clone)]
pub struct ProjectManager {
    directory: Arc<dyn ProjectDirectory>,
    billing: Arc<dyn BillingDirectory>,
    default_project: Option<String>,
    logger: AuditLogger,
}

impl ProjectManager {
    pub fn new(
        directory: Arc<dyn ProjectDirectory>,
        billing: Arc<dyn BillingDirectory>,
        default_project: Option<String>,
    ) -> Self {
        Self {
            directory,
            billing,
            default_project: default_project.filter(|p| !p.trim().is_empty()),
            logger: AuditLogger::new("project-manager"),
        }
    }

    pub fn default_project(&self) -> Option<&str> {
        self.default_project.as_deref()
    }

    /// Ids of active projects; listing failures yield an empty list
    pub async fn list_accessible_projects(&self) -> Vec<String> {
        match self.directory.list_projects().await {
            Ok(projects) => projects
                .into_iter()
                .filter(|p| p.state == ProjectState::Active)
                .map(|p| p.project_id)
                .collect(),
            Err(err) => {
                warn!(error = %err, "Failed to list projects");
                Vec::new()
            }
        }
    }

    /// Keep the ids that exist, are active and can be read
    pub async fn validate_projects(&self, project_ids: &[String]) -> Vec<String> {
        let mut valid = Vec::with_capacity(project_ids.len());

        for project_id in project_ids {
            let reason = match self.directory.get_project(project_id).await {
                Ok(project) if project.state == ProjectState::Active => {
                    valid.push(project_id.clone());
                    continue;
                }
                Ok(project) => format!("Project is not active (state: {:?})", project.state),
                Err(AuditError::NotFound(_)) => "Project not found".to_string(),
                Err(AuditError::PermissionDenied(_)) => "Permission denied".to_string(),
                Err(err) => format!("Error validating project: {}", err),
            };
            self.logger.log_project_skipped(project_id, &reason);
        }

        valid
    }

    /// Billing account id linked to a project, without the `billingAccounts/` prefix
    pub async fn resolve_billing_account(&self, project_id: &str) -> Option<String> {
        if let Err(err) = self.directory.get_project(project_id).await {
            warn!(project_id = %project_id, error = %err, "Cannot look up project for billing");
            return None;
        }

        match self.billing.billing_account_name(project_id).await {
            Ok(Some(name)) => {
                let id = name
                    .strip_prefix(BILLING_ACCOUNT_PREFIX)
                    .unwrap_or(&name)
                    .trim();
                (!id.is_empty()).then(|| id.to_string())
            }
            Ok(None) => {
                warn!(project_id = %project_id, "Project has no billing account linked");
                None
            }
            Err(err) => {
                warn!(project_id = %project_id, error = %err, "Failed to read billing info");
                None
            }
        }
    }

    pub async fn group_by_billing_account(&self, project_ids: &[String]) -> ProjectGroups {
        let mut groups = ProjectGroups::new();
        let mut unbilled = Vec::new();

        for project_id in project_ids {
            match self.resolve_billing_account(project_id).await {
                Some(account) => groups.entry(account).or_default().push(project_id.clone()),
                None => unbilled.push(project_id.clone()),
            }
        }

        if !unbilled.is_empty() {
            warn!(
                count = unbilled.len(),
                "Projects without billing accounts grouped under {}", NO_BILLING
            );
            groups.insert(NO_BILLING.to_string(), unbilled);
        }

        info!(
            projects = project_ids.len(),
            groups = groups.len(),
            "Grouped projects by billing account"
        );
        groups
    }

    /// Resolve the run's project groups
    ///
    /// Explicit ids win over `all`, which wins over the default project.
    /// With `combine` projects sharing a billing account form one group,
    /// otherwise each project is its own `SINGLE_` group.
    pub async fn initialize_projects(
        &self,
        explicit: Option<&[String]>,
        all: bool,
        combine: bool,
    ) -> ProjectGroups {
        let explicit: Vec<String> = explicit
            .unwrap_or_default()
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let project_ids = if !explicit.is_empty() {
            let valid = self.validate_projects(&explicit).await;
            if valid.is_empty() {
                error!("No valid projects found");
            }
            valid
        } else if all {
            let accessible = self.list_accessible_projects().await;
            if accessible.is_empty() {
                error!("No projects found or accessible");
            } else {
                info!(count = accessible.len(), "Found accessible projects");
            }
            accessible
        } else if let Some(project) = &self.default_project {
            info!(project_id = %project, "Using default project");
            vec![project.clone()]
        } else {
            error!("No project specified and no default project found");
            Vec::new()
        };

        if project_ids.is_empty() {
            return ProjectGroups::new();
        }

        if combine {
            self.group_by_billing_account(&project_ids).await
        } else {
            project_ids
                .into_iter()
                .map(|p| (format!("{}{}", SINGLE_PREFIX, p), vec![p]))
                .collect()
        }
    }

    /// Flatten groups into project records carrying their billing account
    pub async fn create_project_data_list(&self, groups: &ProjectGroups) -> Vec<ProjectData> {
        self.project_data_groups(groups)
            .await
            .into_values()
            .flatten()
            .collect()
    }

    /// Same as [`Self::create_project_data_list`] but keeping the grouping
    pub async fn project_data_groups(
        &self,
        groups: &ProjectGroups,
    ) -> BTreeMap<String, Vec<ProjectData>> {
        let mut resolved = BTreeMap::new();

        for (key, members) in groups {
            let mut projects = Vec::with_capacity(members.len());
            for project_id in members {
                let billing_account_id = match billing_key(key) {
                    Some(account) => Some(account.to_string()),
                    None => self.resolve_billing_account(project_id).await,
                };
                projects.push(ProjectData {
                    project_id: project_id.clone(),
                    billing_account_id,
                });
            }
            resolved.insert(key.clone(), projects);
        }

        resolved
    }
}

/// Billing account a group key names, if it names one
pub fn billing_key(key: &str) -> Option<&str> {
    if key == NO_BILLING || key.starts_with(SINGLE_PREFIX) {
        None
    } else {
        Some(key)
    }
}
