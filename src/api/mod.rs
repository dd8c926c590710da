pub mod auth;
pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

pub use client::HttpGateway;
pub use error::GatewayError;
pub use types::{CreateJobRequest, PreviousJobOutput, RemoteEvent, RemoteEventName, RemoteJob, RemoteOutput};

use crate::job::{JobInput, Tds};

/// The remote operations a job tracker depends on.
///
/// [`HttpGateway`] talks to the real API; tests substitute an in-memory fake.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn create_job(&self, request: &CreateJobRequest) -> Result<RemoteJob, GatewayError>;

    async fn get_job(&self, job_id: &str) -> Result<RemoteJob, GatewayError>;

    async fn get_job_access_token(&self, job_id: &str) -> Result<String, GatewayError>;

    /// Events of the job log starting at `offset`, in log order.
    async fn get_job_events(
        &self,
        job_id: &str,
        offset: usize,
    ) -> Result<Vec<RemoteEvent>, GatewayError>;

    /// `None` when the output does not exist (yet).
    async fn get_job_output(
        &self,
        job_id: &str,
        key: &str,
    ) -> Result<Option<RemoteOutput>, GatewayError>;

    async fn send_job_input(&self, job_id: &str, key: &str, data: &Value)
    -> Result<(), GatewayError>;

    async fn cancel_job(&self, job_id: &str) -> Result<(), GatewayError>;

    async fn query_previous_outputs(
        &self,
        service_id: &str,
        key: Option<&str>,
        inputs: &[JobInput],
    ) -> Result<Vec<PreviousJobOutput>, GatewayError>;

    async fn get_tds(&self, tds_id: &str) -> Result<Tds, GatewayError>;
}
