//! API client for the audit agent

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Non-success reply from the agent
#[derive(Debug, Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

/// API client for the audit agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request without a body
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ApiError { status, message }.into());
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub resource_type: String,
    pub resource_name: String,
    pub region: String,
    pub issue: String,
    pub recommendation: String,
    pub potential_monthly_savings: f64,
    pub priority: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub resource_type: String,
    pub total_count: u64,
    pub untagged_count: u64,
    pub idle_count: u64,
    pub over_provisioned_count: u64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    pub potential_monthly_savings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditOverview {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub projects: usize,
    pub issues: usize,
    pub total_potential_savings: f64,
    pub results: BTreeMap<String, AuditResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_key: String,
    pub billing_account_id: Option<String>,
    pub project_ids: Vec<String>,
    pub total_recommendations: usize,
    pub issues: usize,
    pub potential_monthly_savings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Query string for the recommendations listing
pub fn recommendations_path(
    priority: Option<&str>,
    resource_type: Option<&str>,
    limit: Option<usize>,
) -> String {
    let mut url = match Url::parse("http://agent/api/recommendations") {
        Ok(url) => url,
        Err(_) => return "api/recommendations".to_string(),
    };
    {
        let mut query = url.query_pairs_mut();
        if let Some(priority) = priority {
            query.append_pair("priority", priority);
        }
        if let Some(resource_type) = resource_type {
            query.append_pair("resource_type", resource_type);
        }
        if let Some(limit) = limit {
            query.append_pair("limit", &limit.to_string());
        }
    }

    match url.query().filter(|q| !q.is_empty()) {
        Some(query) => format!("api/recommendations?{}", query),
        None => "api/recommendations".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_get_overview() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/audits")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "generated_at": "2026-10-19T08:00:00Z",
                    "projects": 2,
                    "issues": 0,
                    "total_potential_savings": 45.5,
                    "results": {
                        "static_ips": {
                            "resource_type": "static_ips",
                            "total_count": 1,
                            "untagged_count": 0,
                            "idle_count": 1,
                            "over_provisioned_count": 0,
                            "issues": [],
                            "recommendations": [{
                                "resource_type": "static_ip",
                                "resource_name": "old-lb",
                                "region": "us-central1",
                                "issue": "Static IP not in use",
                                "recommendation": "Release the address",
                                "potential_monthly_savings": 7.3,
                                "priority": "medium",
                                "details": {}
                            }],
                            "potential_monthly_savings": 7.3
                        }
                    }
                }"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let overview: AuditOverview = client.get("api/audits").await.unwrap();

        mock.assert_async().await;
        assert_eq!(overview.projects, 2);
        let ips = &overview.results["static_ips"];
        assert_eq!(ips.recommendations[0].resource_name, "old-lb");
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/audits/bigtable")
            .with_status(404)
            .with_body(r#"{"error":"invalid input: unknown audit type: bigtable"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<AuditResult>("api/audits/bigtable")
            .await
            .unwrap_err();

        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api_err.status, 404);
        assert_eq!(
            err.to_string(),
            "API error (404): invalid input: unknown audit type: bigtable"
        );
    }

    #[tokio::test]
    async fn test_post_refresh() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/audits/refresh")
            .with_status(202)
            .with_body(r#"{"status":"scheduled"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response: RefreshResponse = client.post("api/audits/refresh").await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, "scheduled");
    }

    #[tokio::test]
    async fn test_recommendation_filters_in_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/recommendations")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("priority".into(), "high".into()),
                Matcher::UrlEncoded("limit".into(), "5".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let path = recommendations_path(Some("high"), None, Some(5));
        let items: Vec<Recommendation> = client.get(&path).await.unwrap();

        mock.assert_async().await;
        assert!(items.is_empty());
    }

    #[test]
    fn test_recommendations_path() {
        assert_eq!(recommendations_path(None, None, None), "api/recommendations");
        assert_eq!(
            recommendations_path(None, Some("cloud_sql"), None),
            "api/recommendations?resource_type=cloud_sql"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
