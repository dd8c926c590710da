//! Scripted in-memory gateway used by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::state::JobState;
use super::types::{JobCategory, JobError, JobInput, Tds};
use crate::api::{
    CreateJobRequest, Gateway, GatewayError, PreviousJobOutput, RemoteEvent, RemoteEventName,
    RemoteJob, RemoteOutput,
};

const JOB_ID: &str = "job-1";

#[derive(Default)]
struct FakeState {
    job: Option<RemoteJob>,
    events: Vec<RemoteEvent>,
    outputs: HashMap<String, Value>,
    inputs: Vec<JobInput>,
    event_poll_error: Option<GatewayError>,
    event_offsets: Vec<usize>,
    create_calls: usize,
    get_job_calls: usize,
    cancelled: bool,
    tds: Option<Tds>,
}

#[derive(Default)]
pub(crate) struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub(crate) fn push_event(&self, name: RemoteEventName, key: Option<&str>) {
        self.with_state(|s| {
            let id = format!("event-{}", s.events.len());
            s.events.push(RemoteEvent {
                id,
                name,
                key: key.map(String::from),
                created_at: None,
            });
        });
    }

    pub(crate) fn add_output(&self, key: &str, data: Value) {
        self.with_state(|s| {
            s.outputs.insert(key.to_string(), data);
        });
        self.push_event(RemoteEventName::CreateOutput, Some(key));
    }

    pub(crate) fn remove_outputs(&self) {
        self.with_state(|s| s.outputs.clear());
    }

    pub(crate) fn request_input(&self, key: &str) {
        self.push_event(RemoteEventName::AwaitingInput, Some(key));
    }

    pub(crate) fn succeed(&self) {
        self.push_event(RemoteEventName::Success, None);
    }

    pub(crate) fn fail(&self, error: JobError) {
        // Snapshot state stays as is; the failure arrives through the event log.
        self.with_state(|s| s.job.get_or_insert_with(new_job).error = Some(error));
        self.push_event(RemoteEventName::Fail, None);
    }

    /// Overrides the state reported by the job snapshot.
    pub(crate) fn set_state(&self, state: JobState) {
        self.with_state(|s| s.job.get_or_insert_with(new_job).state = state);
    }

    pub(crate) fn fail_event_polls(&self, error: GatewayError) {
        self.with_state(|s| s.event_poll_error = Some(error));
    }

    pub(crate) fn set_tds(&self, tds: Tds) {
        self.with_state(|s| {
            s.job.get_or_insert_with(new_job).tds_id = Some(tds.id.clone());
            s.tds = Some(tds);
        });
        self.push_event(RemoteEventName::TdsStart, None);
    }

    pub(crate) fn input(&self, key: &str) -> Option<Value> {
        self.with_state(|s| {
            s.inputs
                .iter()
                .rev()
                .find(|i| i.key == key)
                .map(|i| i.data.clone())
        })
    }

    pub(crate) fn event_offsets(&self) -> Vec<usize> {
        self.with_state(|s| s.event_offsets.clone())
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.with_state(|s| s.create_calls)
    }

    pub(crate) fn get_job_calls(&self) -> usize {
        self.with_state(|s| s.get_job_calls)
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.with_state(|s| s.cancelled)
    }
}

fn new_job() -> RemoteJob {
    RemoteJob {
        id: JOB_ID.to_string(),
        service_id: None,
        category: JobCategory::Test,
        state: JobState::Processing,
        awaiting_input_key: None,
        error: None,
        tds_id: None,
    }
}

fn not_found(what: &str) -> GatewayError {
    GatewayError::new("NotFound", format!("{what} not found")).with_status(404)
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn create_job(&self, request: &CreateJobRequest) -> Result<RemoteJob, GatewayError> {
        Ok(self.with_state(|s| {
            s.create_calls += 1;
            let job = s.job.get_or_insert_with(new_job);
            job.service_id = Some(request.service_id.clone());
            job.category = request.category;
            let job = job.clone();
            for (key, data) in &request.input {
                s.inputs.push(JobInput {
                    key: key.clone(),
                    data: data.clone(),
                });
            }
            job
        }))
    }

    async fn get_job(&self, job_id: &str) -> Result<RemoteJob, GatewayError> {
        self.with_state(|s| {
            s.get_job_calls += 1;
            s.job
                .clone()
                .filter(|j| j.id == job_id)
                .ok_or_else(|| not_found("job"))
        })
    }

    async fn get_job_access_token(&self, job_id: &str) -> Result<String, GatewayError> {
        Ok(format!("job-access-token-{job_id}"))
    }

    async fn get_job_events(
        &self,
        _job_id: &str,
        offset: usize,
    ) -> Result<Vec<RemoteEvent>, GatewayError> {
        self.with_state(|s| {
            s.event_offsets.push(offset);
            if let Some(err) = &s.event_poll_error {
                return Err(err.clone());
            }
            Ok(s.events.iter().skip(offset).cloned().collect())
        })
    }

    async fn get_job_output(
        &self,
        job_id: &str,
        key: &str,
    ) -> Result<Option<RemoteOutput>, GatewayError> {
        Ok(self.with_state(|s| {
            s.outputs.get(key).map(|data| RemoteOutput {
                job_id: Some(job_id.to_string()),
                key: key.to_string(),
                data: data.clone(),
            })
        }))
    }

    async fn send_job_input(
        &self,
        _job_id: &str,
        key: &str,
        data: &Value,
    ) -> Result<(), GatewayError> {
        self.with_state(|s| {
            s.inputs.push(JobInput {
                key: key.to_string(),
                data: data.clone(),
            })
        });
        Ok(())
    }

    async fn cancel_job(&self, _job_id: &str) -> Result<(), GatewayError> {
        self.with_state(|s| s.cancelled = true);
        Ok(())
    }

    async fn query_previous_outputs(
        &self,
        _service_id: &str,
        key: Option<&str>,
        _inputs: &[JobInput],
    ) -> Result<Vec<PreviousJobOutput>, GatewayError> {
        Ok(self.with_state(|s| {
            s.outputs
                .iter()
                .filter(|(k, _)| key.is_none_or(|key| key == k.as_str()))
                .map(|(k, data)| PreviousJobOutput {
                    job_id: JOB_ID.to_string(),
                    key: k.clone(),
                    data: data.clone(),
                    variability: 1.0,
                })
                .collect()
        }))
    }

    async fn get_tds(&self, tds_id: &str) -> Result<Tds, GatewayError> {
        self.with_state(|s| {
            s.tds
                .clone()
                .filter(|t| t.id == tds_id)
                .ok_or_else(|| not_found("3-D Secure challenge"))
        })
    }
}
