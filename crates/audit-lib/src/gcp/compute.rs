//! Virtual machine, disk and address listings

use super::client::{int_from_string, last_segment, Page, RestClient};
use crate::auditor::ResourceLister;
use crate::error::Result;
use crate::models::{ComputeInstance, Labels, PersistentDisk, StaticAddress};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const SPOT_PROVISIONING: &str = "SPOT";
const ADDRESS_IN_USE: &str = "IN_USE";
const DEFAULT_ADDRESS_TYPE: &str = "EXTERNAL";

/// Compute list responses share one envelope
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound = "T: DeserializeOwned")]
struct ItemsPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

impl<T: DeserializeOwned> Page for ItemsPage<T> {
    type Item = T;

    fn into_parts(self) -> (Vec<T>, Option<String>) {
        (self.items, self.next_page_token)
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireInstance {
    name: String,
    machine_type: String,
    status: String,
    labels: Labels,
    scheduling: WireScheduling,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireScheduling {
    preemptible: bool,
    provisioning_model: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireDisk {
    name: String,
    #[serde(deserialize_with = "int_from_string")]
    size_gb: Option<i64>,
    #[serde(rename = "type")]
    disk_type: String,
    status: String,
    users: Vec<String>,
    labels: Labels,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireAddress {
    name: String,
    address: String,
    address_type: Option<String>,
    status: String,
    users: Vec<String>,
}

/// One lister per compute collection
pub struct ComputeLister {
    rest: RestClient,
    base: String,
}

impl ComputeLister {
    pub fn new(rest: RestClient, base: impl Into<String>) -> Self {
        Self {
            rest,
            base: base.into(),
        }
    }

    async fn list_items<T: DeserializeOwned>(&self, path: String) -> Result<Vec<T>> {
        let url = self.rest.url(&self.base, &path)?;
        self.rest.list_all::<ItemsPage<T>>(url).await
    }
}

#[async_trait]
impl ResourceLister<ComputeInstance> for ComputeLister {
    async fn list(&self, project_id: &str, zone: &str) -> Result<Vec<ComputeInstance>> {
        let items: Vec<WireInstance> = self
            .list_items(format!(
                "/compute/v1/projects/{}/zones/{}/instances",
                project_id, zone
            ))
            .await?;

        Ok(items
            .into_iter()
            .map(|i| ComputeInstance {
                name: i.name,
                zone: zone.to_string(),
                machine_type: last_segment(&i.machine_type).to_string(),
                status: i.status,
                labels: i.labels,
                preemptible: i.scheduling.preemptible
                    || i.scheduling.provisioning_model.as_deref() == Some(SPOT_PROVISIONING),
            })
            .collect())
    }
}

#[async_trait]
impl ResourceLister<PersistentDisk> for ComputeLister {
    async fn list(&self, project_id: &str, zone: &str) -> Result<Vec<PersistentDisk>> {
        let items: Vec<WireDisk> = self
            .list_items(format!("/compute/v1/projects/{}/zones/{}/disks", project_id, zone))
            .await?;

        Ok(items
            .into_iter()
            .map(|d| PersistentDisk {
                name: d.name,
                zone: zone.to_string(),
                size_gb: d.size_gb.unwrap_or(0).max(0) as u64,
                disk_type: last_segment(&d.disk_type).to_string(),
                status: d.status,
                in_use: !d.users.is_empty(),
                labels: d.labels,
            })
            .collect())
    }
}

#[async_trait]
impl ResourceLister<StaticAddress> for ComputeLister {
    async fn list(&self, project_id: &str, region: &str) -> Result<Vec<StaticAddress>> {
        let items: Vec<WireAddress> = self
            .list_items(format!(
                "/compute/v1/projects/{}/regions/{}/addresses",
                project_id, region
            ))
            .await?;

        Ok(items
            .into_iter()
            .map(|a| StaticAddress {
                in_use: a.status == ADDRESS_IN_USE || !a.users.is_empty(),
                name: a.name,
                region: region.to_string(),
                address: a.address,
                address_type: a
                    .address_type
                    .unwrap_or_else(|| DEFAULT_ADDRESS_TYPE.to_string()),
                status: a.status,
            })
            .collect())
    }
}
