use std::sync::Arc;

use tracing::debug;

use crate::api::{Gateway, HttpGateway, PreviousJobOutput};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::job::{Job, JobInitParams, JobInput};

/// Entry point of the SDK: holds the configuration and creates job trackers.
///
/// Cloning is cheap; clones share the configuration and the HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    api: Arc<dyn Gateway>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api = HttpGateway::new(&config).map_err(|e| Error::ClientConfig(e.message))?;
        Ok(Self::with_gateway(config, Arc::new(api)))
    }

    /// Builds a client on top of a custom gateway implementation.
    pub fn with_gateway(config: ClientConfig, api: Arc<dyn Gateway>) -> Self {
        Self {
            config: Arc::new(config),
            api,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A tracker for a job that is not created yet; call [`Job::start`] to create it.
    pub fn new_job(&self, params: JobInitParams) -> Job {
        Job::new(self.api.clone(), self.config.clone(), params)
    }

    /// Creates a remote job and, with `auto_track` enabled, starts tracking it.
    pub async fn create_job(&self, params: JobInitParams) -> Result<Job> {
        let job = self.new_job(params);
        job.start().await?;
        Ok(job)
    }

    /// Resumes tracking of an existing job.
    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        let job = self.new_job(JobInitParams::new());
        job.track_existing(job_id).await?;
        Ok(job)
    }

    /// Looks up an output produced by a previous job of the configured service.
    ///
    /// Returns the first match, or `None` when no previous job produced `key`
    /// for the given inputs.
    pub async fn query_previous_output(
        &self,
        key: &str,
        inputs: &[JobInput],
    ) -> Result<Option<PreviousJobOutput>> {
        let service_id = self.config.service_id.as_deref().ok_or_else(|| {
            Error::ClientConfig("serviceId is required to query previous outputs".into())
        })?;
        let outputs = self
            .api
            .query_previous_outputs(service_id, Some(key), inputs)
            .await?;
        debug!(service_id, key, count = outputs.len(), "queried previous outputs");
        Ok(outputs.into_iter().next())
    }
}
