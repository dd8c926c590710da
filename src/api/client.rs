use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::auth::AuthAgent;
use super::error::GatewayError;
use super::types::{
    AccessTokenResponse, CreateJobRequest, ListResponse, PreviousJobOutput, PreviousOutputsRequest,
    RemoteEvent, RemoteJob, RemoteOutput, SendInputRequest,
};
use super::Gateway;
use crate::config::ClientConfig;
use crate::job::{JobInput, Tds};

// Gateway errors worth re-sending; everything else fails on the first attempt.
const RETRYABLE_STATUSES: [StatusCode; 3] = [
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Gateway backed by the Automation Cloud REST API.
pub struct HttpGateway {
    http: Client,
    base_url: String,
    headers: HeaderMap,
    auth: AuthAgent,
    retry_count: u32,
    retry_delay: Duration,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.additional_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                GatewayError::new("InvalidHeader", format!("invalid header name {name:?}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                GatewayError::new("InvalidHeader", format!("invalid value for {name}: {e}"))
            })?;
            headers.insert(name, value);
        }

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            headers,
            auth: AuthAgent::new(config.auth.clone(), config.api_token_url.clone()),
            retry_count: config.request_retry_count,
            retry_delay: config.request_retry_delay(),
        })
    }

    /// Sends a request, re-sending it on network errors and retryable statuses.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Response, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .headers(self.headers.clone());
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }
            let request = self.auth.authorize(&self.http, request).await?;

            let outcome = request.send().await;
            let retryable = match &outcome {
                Ok(response) => RETRYABLE_STATUSES.contains(&response.status()),
                Err(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            };
            if retryable && attempt < self.retry_count {
                attempt += 1;
                debug!(%method, path, attempt, max = self.retry_count, "retrying request");
                sleep(self.retry_delay).await;
                continue;
            }

            let response = outcome?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if status == StatusCode::UNAUTHORIZED {
                self.auth.invalidate().await;
            }
            let body = response.bytes().await.unwrap_or_default();
            let error = GatewayError::from_body(&body, status.as_u16()).unwrap_or_else(|| {
                GatewayError::request_failed(method.as_str(), path, status.as_u16())
            });
            if status != StatusCode::NOT_FOUND {
                warn!(%method, path, status = status.as_u16(), name = %error.name, "request failed");
            }
            return Err(error);
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let response = self.send(Method::GET, path, query, None).await?;
        Ok(response.json::<T>().await?)
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Response, GatewayError> {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| GatewayError::new("SerializationError", e.to_string()))?;
        self.send(Method::POST, path, query, body).await
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn create_job(&self, request: &CreateJobRequest) -> Result<RemoteJob, GatewayError> {
        let response = self.post("/jobs", &[], Some(request)).await?;
        Ok(response.json::<RemoteJob>().await?)
    }

    async fn get_job(&self, job_id: &str) -> Result<RemoteJob, GatewayError> {
        self.get(&format!("/jobs/{job_id}"), &[]).await
    }

    async fn get_job_access_token(&self, job_id: &str) -> Result<String, GatewayError> {
        let body: AccessTokenResponse = self.get(&format!("/jobs/{job_id}/end-user"), &[]).await?;
        Ok(body.token)
    }

    async fn get_job_events(
        &self,
        job_id: &str,
        offset: usize,
    ) -> Result<Vec<RemoteEvent>, GatewayError> {
        let body: ListResponse<RemoteEvent> = self
            .get(
                &format!("/jobs/{job_id}/events"),
                &[("offset", offset.to_string())],
            )
            .await?;
        Ok(body.data)
    }

    async fn get_job_output(
        &self,
        job_id: &str,
        key: &str,
    ) -> Result<Option<RemoteOutput>, GatewayError> {
        match self.get(&format!("/jobs/{job_id}/outputs/{key}"), &[]).await {
            Ok(output) => Ok(Some(output)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn send_job_input(
        &self,
        job_id: &str,
        key: &str,
        data: &Value,
    ) -> Result<(), GatewayError> {
        let body = SendInputRequest { key, data };
        self.post(&format!("/jobs/{job_id}/inputs"), &[], Some(&body))
            .await?;
        Ok(())
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), GatewayError> {
        self.post::<Value>(&format!("/jobs/{job_id}/cancel"), &[], None)
            .await?;
        Ok(())
    }

    async fn query_previous_outputs(
        &self,
        service_id: &str,
        key: Option<&str>,
        inputs: &[JobInput],
    ) -> Result<Vec<PreviousJobOutput>, GatewayError> {
        let query: Vec<(&str, String)> = key.map(|k| ("key", k.to_string())).into_iter().collect();
        let body = PreviousOutputsRequest { inputs };
        let response = self
            .post(
                &format!("/services/{service_id}/previous-job-outputs"),
                &query,
                Some(&body),
            )
            .await?;
        let body = response.json::<ListResponse<PreviousJobOutput>>().await?;
        Ok(body.data)
    }

    async fn get_tds(&self, tds_id: &str) -> Result<Tds, GatewayError> {
        self.get(&format!("/3d-secure/{tds_id}"), &[]).await
    }
}
