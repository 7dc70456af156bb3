//! Serverless service and function listings

use super::client::{last_segment, Page, RestClient};
use crate::auditor::ResourceLister;
use crate::error::Result;
use crate::models::{CloudFunction, Labels, ServerlessService, TriggerType};
use crate::thresholds::parse_memory_mb;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

const CPU_THROTTLING_ANNOTATION: &str = "run.googleapis.com/cpu-throttling";
const DEFAULT_MEMORY_LIMIT: &str = "256Mi";
const DEFAULT_MAX_INSTANCES: u32 = 100;
const DEFAULT_FUNCTION_MEMORY_MB: u64 = 256;
const DEFAULT_FUNCTION_TIMEOUT_SECS: u64 = 60;

pub struct RunServiceLister {
    rest: RestClient,
    base: String,
}

impl RunServiceLister {
    pub fn new(rest: RestClient, base: impl Into<String>) -> Self {
        Self {
            rest,
            base: base.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServicesPage {
    #[serde(default)]
    services: Vec<WireService>,
    next_page_token: Option<String>,
}

impl Page for ServicesPage {
    type Item = WireService;

    fn into_parts(self) -> (Vec<WireService>, Option<String>) {
        (self.services, self.next_page_token)
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireService {
    name: String,
    labels: Labels,
    annotations: BTreeMap<String, String>,
    ingress: String,
    template: WireTemplate,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireTemplate {
    annotations: BTreeMap<String, String>,
    scaling: WireScaling,
    containers: Vec<WireContainer>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireScaling {
    min_instance_count: Option<u32>,
    max_instance_count: Option<u32>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireContainer {
    resources: WireResources,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireResources {
    limits: BTreeMap<String, String>,
    cpu_idle: Option<bool>,
}

impl WireService {
    fn into_service(self, region: &str) -> ServerlessService {
        let container = self.template.containers.first();
        let throttling_off = |annotations: &BTreeMap<String, String>| {
            annotations
                .get(CPU_THROTTLING_ANNOTATION)
                .map(|v| v == "false")
                .unwrap_or(false)
        };
        let cpu_always_allocated = container.and_then(|c| c.resources.cpu_idle) == Some(false)
            || throttling_off(&self.template.annotations)
            || throttling_off(&self.annotations);
        let memory_limit = container
            .and_then(|c| c.resources.limits.get("memory").cloned())
            .unwrap_or_else(|| DEFAULT_MEMORY_LIMIT.to_string());

        ServerlessService {
            name: last_segment(&self.name).to_string(),
            region: region.to_string(),
            labels: self.labels,
            cpu_always_allocated,
            memory_limit,
            min_instances: self.template.scaling.min_instance_count.unwrap_or(0),
            max_instances: self
                .template
                .scaling
                .max_instance_count
                .unwrap_or(DEFAULT_MAX_INSTANCES),
            ingress: self.ingress,
        }
    }
}

#[async_trait]
impl ResourceLister<ServerlessService> for RunServiceLister {
    async fn list(&self, project_id: &str, scope: &str) -> Result<Vec<ServerlessService>> {
        let url = self.rest.url(
            &self.base,
            &format!("/v2/projects/{}/locations/{}/services", project_id, scope),
        )?;
        let services = self.rest.list_all::<ServicesPage>(url).await?;
        Ok(services.into_iter().map(|s| s.into_service(scope)).collect())
    }
}

pub struct FunctionLister {
    rest: RestClient,
    base: String,
}

impl FunctionLister {
    pub fn new(rest: RestClient, base: impl Into<String>) -> Self {
        Self {
            rest,
            base: base.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionsPage {
    #[serde(default)]
    functions: Vec<WireFunction>,
    next_page_token: Option<String>,
}

impl Page for FunctionsPage {
    type Item = WireFunction;

    fn into_parts(self) -> (Vec<WireFunction>, Option<String>) {
        (self.functions, self.next_page_token)
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireFunction {
    name: String,
    labels: Labels,
    build_config: WireBuildConfig,
    service_config: WireServiceConfig,
    event_trigger: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireBuildConfig {
    runtime: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireServiceConfig {
    available_memory: Option<String>,
    timeout_seconds: Option<u64>,
}

impl WireFunction {
    fn into_function(self, region: &str) -> CloudFunction {
        CloudFunction {
            name: last_segment(&self.name).to_string(),
            region: region.to_string(),
            runtime: self.build_config.runtime,
            memory_mb: self
                .service_config
                .available_memory
                .as_deref()
                .and_then(parse_memory_mb)
                .unwrap_or(DEFAULT_FUNCTION_MEMORY_MB),
            timeout_seconds: self
                .service_config
                .timeout_seconds
                .unwrap_or(DEFAULT_FUNCTION_TIMEOUT_SECS),
            labels: self.labels,
            trigger_type: if self.event_trigger.is_some() {
                TriggerType::Event
            } else {
                TriggerType::Http
            },
        }
    }
}

#[async_trait]
impl ResourceLister<CloudFunction> for FunctionLister {
    async fn list(&self, project_id: &str, scope: &str) -> Result<Vec<CloudFunction>> {
        let url = self.rest.url(
            &self.base,
            &format!("/v2/projects/{}/locations/{}/functions", project_id, scope),
        )?;
        let functions = self.rest.list_all::<FunctionsPage>(url).await?;
        Ok(functions
            .into_iter()
            .map(|f| f.into_function(scope))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use crate::gcp::StaticToken;
    use std::sync::Arc;

    fn rest() -> RestClient {
        RestClient::new(Arc::new(StaticToken::anonymous())).unwrap()
    }

    #[tokio::test]
    async fn test_list_services() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/projects/shop-prod/locations/us-central1/services")
            .with_status(200)
            .with_body(
                r#"{"services": [
                    {
                        "name": "projects/shop-prod/locations/us-central1/services/api",
                        "labels": {"team": "web"},
                        "ingress": "INGRESS_TRAFFIC_ALL",
                        "template": {
                            "scaling": {"minInstanceCount": 2, "maxInstanceCount": 20},
                            "containers": [{"resources": {"limits": {"memory": "1Gi", "cpu": "1"}, "cpuIdle": false}}]
                        }
                    },
                    {
                        "name": "projects/shop-prod/locations/us-central1/services/worker",
                        "template": {
                            "annotations": {"run.googleapis.com/cpu-throttling": "false"},
                            "containers": [{}]
                        }
                    },
                    {"name": "projects/shop-prod/locations/us-central1/services/hello"}
                ]}"#,
            )
            .create_async()
            .await;

        let lister = RunServiceLister::new(rest(), server.url());
        let services = lister.list("shop-prod", "us-central1").await.unwrap();

        assert_eq!(services.len(), 3);
        let api = &services[0];
        assert_eq!(api.name, "api");
        assert_eq!(api.region, "us-central1");
        assert!(api.cpu_always_allocated);
        assert_eq!(api.memory_limit, "1Gi");
        assert_eq!((api.min_instances, api.max_instances), (2, 20));

        assert!(services[1].cpu_always_allocated);

        let hello = &services[2];
        assert!(!hello.cpu_always_allocated);
        assert_eq!(hello.memory_limit, "256Mi");
        assert_eq!((hello.min_instances, hello.max_instances), (0, 100));
        assert!(hello.labels.is_empty());
    }

    #[tokio::test]
    async fn test_permission_denied_listing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/projects/shop-prod/locations/us-east1/services")
            .with_status(403)
            .with_body(r#"{"error": {"code": 403, "message": "Permission 'run.services.list' denied"}}"#)
            .create_async()
            .await;

        let lister = RunServiceLister::new(rest(), server.url());
        let err = lister.list("shop-prod", "us-east1").await.unwrap_err();
        assert_eq!(
            err,
            AuditError::PermissionDenied("Permission 'run.services.list' denied".into())
        );
    }

    #[tokio::test]
    async fn test_list_functions() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/projects/shop-prod/locations/europe-west1/functions")
            .with_status(200)
            .with_body(
                r#"{"functions": [
                    {
                        "name": "projects/shop-prod/locations/europe-west1/functions/resize",
                        "buildConfig": {"runtime": "nodejs20"},
                        "serviceConfig": {"availableMemory": "512M", "timeoutSeconds": 120},
                        "eventTrigger": {"eventType": "google.cloud.storage.object.v1.finalized"}
                    },
                    {
                        "name": "projects/shop-prod/locations/europe-west1/functions/webhook",
                        "labels": {"env": "prod"}
                    }
                ]}"#,
            )
            .create_async()
            .await;

        let lister = FunctionLister::new(rest(), server.url());
        let functions = lister.list("shop-prod", "europe-west1").await.unwrap();

        assert_eq!(functions[0].name, "resize");
        assert_eq!(functions[0].runtime, "nodejs20");
        assert_eq!(functions[0].memory_mb, 512);
        assert_eq!(functions[0].timeout_seconds, 120);
        assert_eq!(functions[0].trigger_type, TriggerType::Event);

        assert_eq!(functions[1].memory_mb, 256);
        assert_eq!(functions[1].timeout_seconds, 60);
        assert_eq!(functions[1].trigger_type, TriggerType::Http);
        assert_eq!(functions[1].labels["env"], "prod");
    }
}
