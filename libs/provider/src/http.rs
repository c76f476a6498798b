//! HTTP JSON client for the provider API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::types::{InstanceDescriptor, InstanceId, LaunchSpec};
use crate::{Provider, ProviderResult};

/// Client for a provider exposing the instance API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    spec: &'a LaunchSpec,
    count: usize,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    instance_ids: Vec<InstanceId>,
}

#[derive(Debug, Serialize)]
struct TagRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    instances: Vec<InstanceDescriptor>,
}

#[derive(Debug, Serialize)]
struct TerminateRequest<'a> {
    instance_ids: &'a [InstanceId],
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    message: String,
}

impl HttpProvider {
    /// Create a client for the given endpoint and API token.
    pub fn new(base_url: &str, api_token: &str) -> ProviderResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_token))
                .map_err(|e| ProviderError::InvalidResponse(format!("invalid token: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Interpret a response, mapping non-success statuses onto the error
    /// taxonomy.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ProviderResult<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
        } else {
            Err(self.handle_error(response).await)
        }
    }

    async fn handle_error(&self, response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let body: ApiErrorResponse = response.json().await.unwrap_or_else(|_| ApiErrorResponse {
            message: "unknown error".to_string(),
        });

        ProviderError::Api {
            status,
            message: body.message,
        }
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn create_instances(
        &self,
        spec: &LaunchSpec,
        count: usize,
    ) -> ProviderResult<Vec<InstanceId>> {
        debug!(count, instance_type = %spec.instance_type, "Requesting instances");

        let response = self
            .client
            .post(self.url("/v1/instances"))
            .json(&CreateRequest { spec, count })
            .send()
            .await?;

        let created: CreateResponse = self.handle_response(response).await?;
        Ok(created.instance_ids)
    }

    async fn tag_instance(&self, id: &InstanceId, name: &str) -> ProviderResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/v1/instances/{}/tags", id)))
            .json(&TagRequest { name })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.handle_error(response).await)
        }
    }

    async fn list_instances(&self, key_name: &str) -> ProviderResult<Vec<InstanceDescriptor>> {
        let response = self
            .client
            .get(self.url("/v1/instances"))
            .query(&[("key_name", key_name)])
            .send()
            .await?;

        let listing: ListResponse = self.handle_response(response).await?;
        Ok(listing.instances)
    }

    async fn terminate_instances(&self, ids: &[InstanceId]) -> ProviderResult<()> {
        debug!(count = ids.len(), "Requesting termination");

        let response = self
            .client
            .post(self.url("/v1/instances/terminate"))
            .json(&TerminateRequest { instance_ids: ids })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.handle_error(response).await)
        }
    }
}
