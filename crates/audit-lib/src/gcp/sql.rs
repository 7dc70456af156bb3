//! Managed database instance listing

use super::client::{int_from_string, Page, RestClient};
use crate::auditor::ResourceLister;
use crate::error::Result;
use crate::models::{DatabaseInstance, Labels};
use crate::scope::ALL_LOCATIONS;
use async_trait::async_trait;
use serde::Deserialize;

/// Storage assumed when the API omits the data disk size
const DEFAULT_DATA_DISK_GB: u64 = 10;

pub struct SqlInstanceLister {
    rest: RestClient,
    base: String,
}

impl SqlInstanceLister {
    pub fn new(rest: RestClient, base: impl Into<String>) -> Self {
        Self {
            rest,
            base: base.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstancesPage {
    #[serde(default)]
    items: Vec<WireInstance>,
    next_page_token: Option<String>,
}

impl Page for InstancesPage {
    type Item = WireInstance;

    fn into_parts(self) -> (Vec<WireInstance>, Option<String>) {
        (self.items, self.next_page_token)
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireInstance {
    name: String,
    region: String,
    database_version: String,
    state: String,
    settings: WireSettings,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireSettings {
    tier: String,
    user_labels: Labels,
    #[serde(deserialize_with = "int_from_string")]
    data_disk_size_gb: Option<i64>,
}

#[async_trait]
impl ResourceLister<DatabaseInstance> for SqlInstanceLister {
    /// The API lists the whole project; a region scope filters the listing
    async fn list(&self, project_id: &str, scope: &str) -> Result<Vec<DatabaseInstance>> {
        let url = self
            .rest
            .url(&self.base, &format!("/v1/projects/{}/instances", project_id))?;
        let instances = self.rest.list_all::<InstancesPage>(url).await?;

        Ok(instances
            .into_iter()
            .filter(|i| scope == ALL_LOCATIONS || i.region == scope)
            .map(|i| DatabaseInstance {
                name: i.name,
                region: i.region,
                database_version: i.database_version,
                tier: i.settings.tier,
                state: i.state,
                labels: i.settings.user_labels,
                storage_gb: i
                    .settings
                    .data_disk_size_gb
                    .map(|gb| gb.max(0) as u64)
                    .unwrap_or(DEFAULT_DATA_DISK_GB),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::StaticToken;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_region_filtering() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/projects/shop-prod/instances")
            .with_status(200)
            .with_body(
                r#"{"items": [
                    {"name": "orders", "region": "us-central1", "databaseVersion": "POSTGRES_15",
                     "state": "RUNNABLE",
                     "settings": {"tier": "db-custom-2-7680", "userLabels": {"env": "prod"}, "dataDiskSizeGb": "100"}},
                    {"name": "analytics", "region": "europe-west1", "databaseVersion": "MYSQL_8_0",
                     "state": "SUSPENDED", "settings": {"tier": "db-n1-standard-1"}}
                ]}"#,
            )
            .expect(2)
            .create_async()
            .await;

        let lister = SqlInstanceLister::new(
            RestClient::new(Arc::new(StaticToken::anonymous())).unwrap(),
            server.url(),
        );

        let all = lister.list("shop-prod", ALL_LOCATIONS).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].storage_gb, 100);
        assert_eq!(all[0].labels["env"], "prod");
        assert_eq!(all[1].storage_gb, 10);

        let europe = lister.list("shop-prod", "europe-west1").await.unwrap();
        assert_eq!(europe.len(), 1);
        assert_eq!(europe[0].name, "analytics");
        assert_eq!(europe[0].tier, "db-n1-standard-1");
    }
}
