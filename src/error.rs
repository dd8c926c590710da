use thiserror::Error;

use crate::api::GatewayError;
use crate::job::{JobError, JobState};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Client config error: {0}")]
    ClientConfig(String),

    #[error("Job is already initialized: {job_id}")]
    JobAlreadyStarted { job_id: String },

    #[error("Invalid state: job not yet initialized")]
    JobNotInitialized,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    JobFailed(#[from] JobFailedError),

    #[error(transparent)]
    Track(#[from] TrackError),

    #[error(transparent)]
    OutputWait(#[from] OutputWaitError),
}

impl Error {
    /// Error name in the API's naming scheme.
    ///
    /// Job failures are named after their error code, gateway errors keep the
    /// name sent by the server.
    pub fn name(&self) -> &str {
        match self {
            Error::ClientConfig(_) => "ClientConfigError",
            Error::JobAlreadyStarted { .. } => "JobAlreadyStartedError",
            Error::JobNotInitialized => "JobNotInitializedError",
            Error::Gateway(err) => &err.name,
            Error::JobFailed(err) => err.name(),
            Error::Track(_) => "JobTrackError",
            Error::OutputWait(_) => "JobOutputWaitError",
        }
    }
}

/// The remote job finished in the `Fail` state.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", .error.message)]
pub struct JobFailedError {
    pub error: JobError,
}

impl JobFailedError {
    pub fn name(&self) -> &str {
        &self.error.code
    }
}

impl From<JobError> for JobFailedError {
    fn from(error: JobError) -> Self {
        Self { error }
    }
}

/// Fetching job events failed, which ends the tracking session.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Job tracking failed: {}", .cause.message)]
pub struct TrackError {
    pub cause: GatewayError,
}

impl From<GatewayError> for TrackError {
    fn from(cause: GatewayError) -> Self {
        Self { cause }
    }
}

/// Why a `wait_for_outputs` call gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputWaitReason {
    Succeeded,
    Failed,
    /// Tracking stopped before the job reached a terminal state.
    TrackingStopped,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", .reason.message())]
pub struct OutputWaitError {
    pub reason: OutputWaitReason,
    pub job_id: String,
    pub state: JobState,
    /// Requested keys that were never emitted.
    pub missing: Vec<String>,
}

impl OutputWaitReason {
    fn message(self) -> &'static str {
        match self {
            OutputWaitReason::Succeeded => "Job succeeded, but specified outputs were not emitted",
            OutputWaitReason::Failed => "Job failed, and specified outputs were not emitted",
            OutputWaitReason::TrackingStopped => {
                "Job tracking stopped before specified outputs were emitted"
            }
        }
    }
}
