//! REST adapters for the cloud provider APIs
//!
//! Each adapter implements one of the client traits the engine consumes
//! and maps HTTP failures onto [`crate::AuditError`].

mod client;
mod compute;
mod monitoring;
mod resource_manager;
mod run;
mod sql;

pub use client::{Endpoints, Page, RestClient, StaticToken, TokenSource};
pub use compute::ComputeLister;
pub use monitoring::MonitoringClient;
pub use resource_manager::{BillingClient, ResourceManagerClient};
pub use run::{FunctionLister, RunServiceLister};
pub use sql::SqlInstanceLister;

use crate::projects::{BillingDirectory, ProjectDirectory};
use crate::runner::CloudClients;
use std::sync::Arc;

/// Every adapter wired against one set of endpoints
pub struct GcpBackend {
    pub clients: CloudClients,
    pub projects: Arc<dyn ProjectDirectory>,
    pub billing: Arc<dyn BillingDirectory>,
}

impl GcpBackend {
    pub fn new(rest: RestClient, endpoints: &Endpoints) -> Self {
        let compute = Arc::new(ComputeLister::new(rest.clone(), endpoints.compute.clone()));

        let clients = CloudClients {
            services: Arc::new(RunServiceLister::new(rest.clone(), endpoints.run.clone())),
            functions: Arc::new(FunctionLister::new(
                rest.clone(),
                endpoints.functions.clone(),
            )),
            instances: compute.clone(),
            databases: Arc::new(SqlInstanceLister::new(rest.clone(), endpoints.sql.clone())),
            disks: compute.clone(),
            addresses: compute,
            time_series: Some(Arc::new(MonitoringClient::new(
                rest.clone(),
                endpoints.monitoring.clone(),
            ))),
        };

        Self {
            clients,
            projects: Arc::new(ResourceManagerClient::new(
                rest.clone(),
                endpoints.resource_manager.clone(),
            )),
            billing: Arc::new(BillingClient::new(rest, endpoints.billing.clone())),
        }
    }
}
