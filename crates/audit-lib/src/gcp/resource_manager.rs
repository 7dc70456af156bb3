//! Project directory and billing linkage

use super::client::{Page, RestClient};
use crate::error::Result;
use crate::models::{ProjectInfo, ProjectState};
use crate::projects::{BillingDirectory, ProjectDirectory};
use async_trait::async_trait;
use serde::Deserialize;

pub struct ResourceManagerClient {
    rest: RestClient,
    base: String,
}

impl ResourceManagerClient {
    pub fn new(rest: RestClient, base: impl Into<String>) -> Self {
        Self {
            rest,
            base: base.into(),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireProject {
    project_id: String,
    display_name: Option<String>,
    state: String,
}

impl From<WireProject> for ProjectInfo {
    fn from(p: WireProject) -> Self {
        ProjectInfo {
            project_id: p.project_id,
            display_name: p.display_name,
            state: ProjectState::parse(&p.state),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectsPage {
    #[serde(default)]
    projects: Vec<WireProject>,
    next_page_token: Option<String>,
}

impl Page for ProjectsPage {
    type Item = WireProject;

    fn into_parts(self) -> (Vec<WireProject>, Option<String>) {
        (self.projects, self.next_page_token)
    }
}

#[async_trait]
impl ProjectDirectory for ResourceManagerClient {
    async fn list_projects(&self) -> Result<Vec<ProjectInfo>> {
        let url = self.rest.url(&self.base, "/v3/projects:search")?;
        let projects = self.rest.list_all::<ProjectsPage>(url).await?;
        Ok(projects.into_iter().map(ProjectInfo::from).collect())
    }

    async fn get_project(&self, project_id: &str) -> Result<ProjectInfo> {
        let url = self
            .rest
            .url(&self.base, &format!("/v3/projects/{}", project_id))?;
        let project: WireProject = self.rest.get_json(url).await?;
        Ok(project.into())
    }
}

pub struct BillingClient {
    rest: RestClient,
    base: String,
}

impl BillingClient {
    pub fn new(rest: RestClient, base: impl Into<String>) -> Self {
        Self {
            rest,
            base: base.into(),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireBillingInfo {
    billing_account_name: String,
}

#[async_trait]
impl BillingDirectory for BillingClient {
    async fn billing_account_name(&self, project_id: &str) -> Result<Option<String>> {
        let url = self
            .rest
            .url(&self.base, &format!("/v1/projects/{}/billingInfo", project_id))?;
        let info: WireBillingInfo = self.rest.get_json(url).await?;
        let name = info.billing_account_name.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }
}
