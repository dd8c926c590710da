//! The job tracker: local mirror of one remote job.
//!
//! A [`Job`] owns the job identity, its last known state, the input and
//! output caches and the polling loop. The loop is the only writer of state,
//! caches and event offset; everything else reads snapshots taken between
//! polls or during event application. Locks are never held across an await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::events::{EventBus, JobEvent};
use super::state::{IgnoreReason, JobState, StateMachine, Transition};
use super::types::{JobCategory, JobError, JobInitParams, JobInput, JobOutput, Tds};
use crate::api::{CreateJobRequest, Gateway, GatewayError, RemoteEvent, RemoteEventName};
use crate::config::ClientConfig;
use crate::error::{Error, JobFailedError, Result, TrackError};

/// Outcome of the tracking loop, observed by `wait_for_completion`.
#[derive(Debug, Clone, Default)]
pub(crate) enum TrackStatus {
    /// Tracking was never started.
    #[default]
    Idle,
    Running,
    /// The job reached `Success`.
    Completed,
    /// `stop_tracking` ended the loop before a terminal state.
    Stopped,
    Failed(Error),
}

enum TrackEnd {
    Completed,
    Stopped,
}

#[derive(Debug, Default)]
pub(super) struct JobData {
    pub(super) job_id: Option<String>,
    pub(super) state: JobState,
    pub(super) error: Option<JobError>,
    pub(super) awaiting_input_key: Option<String>,
    pub(super) inputs: HashMap<String, JobInput>,
    pub(super) outputs: HashMap<String, JobOutput>,
    pub(super) event_offset: usize,
    // Set until the log below a final snapshot has been replayed.
    pub(super) replaying: bool,
}

pub(super) struct JobInner {
    api: Arc<dyn Gateway>,
    config: Arc<ClientConfig>,
    params: Mutex<JobInitParams>,
    data: Mutex<JobData>,
    pub(super) events: EventBus,
    // Cooperative stop flag, read at loop-iteration boundaries.
    tracking: AtomicBool,
    // `Running` while a loop task exists. Entering and leaving it happen
    // under the channel lock, so a start never races the exit of a loop.
    pub(super) status: watch::Sender<TrackStatus>,
}

/// Handle to a tracked job. Clones share the same tracker.
///
/// Create jobs with [`Client::create_job`](crate::Client::create_job) or resume
/// them with [`Client::get_job`](crate::Client::get_job). Consumers should
/// always await [`wait_for_completion`](Job::wait_for_completion); a loop
/// failure is otherwise only visible through `on_fail` and wait primitives.
#[derive(Clone)]
pub struct Job {
    pub(super) inner: Arc<JobInner>,
}

impl Job {
    pub(crate) fn new(api: Arc<dyn Gateway>, config: Arc<ClientConfig>, params: JobInitParams) -> Self {
        let (status, _) = watch::channel(TrackStatus::Idle);
        Self {
            inner: Arc::new(JobInner {
                api,
                config,
                params: Mutex::new(params),
                data: Mutex::new(JobData::default()),
                events: EventBus::new(),
                tracking: AtomicBool::new(false),
                status,
            }),
        }
    }

    pub(super) fn data(&self) -> MutexGuard<'_, JobData> {
        self.inner.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn params(&self) -> MutexGuard<'_, JobInitParams> {
        self.inner.params.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remote id of the job; usable with `Client::get_job` to resume tracking.
    pub fn job_id(&self) -> Result<String> {
        self.data().job_id.clone().ok_or(Error::JobNotInitialized)
    }

    fn ensure_not_started(&self) -> Result<()> {
        let existing = self.data().job_id.clone();
        match existing {
            Some(job_id) => Err(Error::JobAlreadyStarted { job_id }),
            None => Ok(()),
        }
    }

    /// Creates the remote job and, with `auto_track`, starts tracking it.
    pub async fn start(&self) -> Result<()> {
        self.ensure_not_started()?;
        let params = self.params().clone();
        let service_id = params
            .service_id
            .clone()
            .or_else(|| self.inner.config.service_id.clone())
            .ok_or_else(|| Error::ClientConfig("serviceId is required to start the job".into()))?;

        let request = CreateJobRequest {
            service_id,
            category: params.category,
            input: params.input.clone(),
        };
        let remote = self.inner.api.create_job(&request).await?;
        {
            let mut data = self.data();
            data.job_id = Some(remote.id.clone());
            data.awaiting_input_key = remote.awaiting_input_key.clone();
            data.error = remote.error.clone();
            data.replaying = remote.state.is_terminal();
            for (key, value) in params.input {
                data.inputs.insert(key.clone(), JobInput { key, data: value });
            }
        }
        self.set_state(remote.state);
        info!(job_id = %remote.id, state = %remote.state, "job created");

        if self.inner.config.auto_track {
            self.start_tracking()?;
        }
        Ok(())
    }

    /// Resumes tracking of a job created elsewhere.
    pub async fn track_existing(&self, job_id: &str) -> Result<()> {
        self.ensure_not_started()?;
        let remote = self.inner.api.get_job(job_id).await?;
        {
            let mut data = self.data();
            data.job_id = Some(job_id.to_string());
            data.awaiting_input_key = remote.awaiting_input_key.clone();
            data.error = remote.error.clone();
            data.replaying = remote.state.is_terminal();
        }
        self.params().category = remote.category;
        self.set_state(remote.state);
        info!(job_id, state = %remote.state, "resumed job tracking");

        self.start_tracking()
    }

    /// Starts the polling loop. A no-op while a loop is already running.
    pub fn start_tracking(&self) -> Result<()> {
        self.job_id()?;
        let mut spawn = false;
        self.inner.status.send_if_modified(|status| {
            self.inner.tracking.store(true, Ordering::SeqCst);
            if matches!(status, TrackStatus::Running) {
                return false;
            }
            *status = TrackStatus::Running;
            spawn = true;
            true
        });
        if spawn {
            let job = self.clone();
            tokio::spawn(async move { job.run().await });
        }
        Ok(())
    }

    /// Body of the loop task. Publishes the final status exactly once.
    async fn run(&self) {
        loop {
            let mut end = Some(match self.track().await {
                Ok(TrackEnd::Completed) => TrackStatus::Completed,
                Ok(TrackEnd::Stopped) => TrackStatus::Stopped,
                Err(err) => TrackStatus::Failed(err),
            });
            self.inner.status.send_if_modified(|status| {
                // Restarted after the loop saw the stop request: keep going.
                let restarted = matches!(end, Some(TrackStatus::Stopped))
                    && self.inner.tracking.load(Ordering::SeqCst);
                if restarted {
                    return false;
                }
                self.inner.tracking.store(false, Ordering::SeqCst);
                if let Some(end) = end.take() {
                    *status = end;
                }
                true
            });
            if end.is_none() {
                return;
            }
            debug!("job tracking restarted");
        }
    }

    /// Asks the loop to stop; an in-flight poll or sleep still completes first.
    pub fn stop_tracking(&self) {
        self.inner.tracking.store(false, Ordering::SeqCst);
    }

    pub fn is_tracking(&self) -> bool {
        matches!(*self.inner.status.borrow(), TrackStatus::Running)
    }

    /// Last known state. May lag behind the remote job by one poll interval.
    pub fn state(&self) -> JobState {
        self.data().state
    }

    /// Error information, once the job has failed.
    pub fn error_info(&self) -> Option<JobError> {
        self.data().error.clone()
    }

    /// Key of the input the job is blocked on, if any.
    pub fn awaiting_input_key(&self) -> Option<String> {
        self.data().awaiting_input_key.clone()
    }

    pub fn category(&self) -> JobCategory {
        self.params().category
    }

    /// Number of remote events applied so far.
    pub fn event_offset(&self) -> usize {
        self.data().event_offset
    }

    /// Cached input data.
    pub fn input(&self, key: &str) -> Option<Value> {
        self.data().inputs.get(key).map(|i| i.data.clone())
    }

    /// Cached output data, without touching the network.
    pub fn output(&self, key: &str) -> Option<Value> {
        self.data().outputs.get(key).map(|o| o.data.clone())
    }

    pub fn outputs(&self) -> Vec<JobOutput> {
        self.data().outputs.values().cloned().collect()
    }

    /// Job-scoped credential which can resume tracking from another client.
    pub async fn get_access_token(&self) -> Result<String> {
        let job_id = self.job_id()?;
        Ok(self.inner.api.get_job_access_token(&job_id).await?)
    }

    /// Sends an input. The cache is updated without waiting for a confirmation event.
    pub async fn submit_input(&self, key: &str, data: Value) -> Result<()> {
        let job_id = self.job_id()?;
        self.inner.api.send_job_input(&job_id, key, &data).await?;
        debug!(job_id = %job_id, key, "input submitted");
        self.data().inputs.insert(
            key.to_string(),
            JobInput {
                key: key.to_string(),
                data,
            },
        );
        Ok(())
    }

    /// Output data from the cache, or fetched once from the API. `None` if not produced yet.
    pub async fn get_output(&self, key: &str) -> Result<Option<Value>> {
        if let Some(data) = self.output(key) {
            return Ok(Some(data));
        }
        let job_id = self.job_id()?;
        let Some(remote) = self.inner.api.get_job_output(&job_id, key).await? else {
            return Ok(None);
        };
        self.data().outputs.insert(
            key.to_string(),
            JobOutput {
                key: key.to_string(),
                data: remote.data.clone(),
            },
        );
        Ok(Some(remote.data))
    }

    /// The active 3-D Secure challenge.
    pub async fn get_tds(&self) -> Result<Tds> {
        let job_id = self.job_id()?;
        let remote = self.inner.api.get_job(&job_id).await?;
        let tds_id = remote.tds_id.ok_or_else(|| {
            GatewayError::new("TdsNotFound", "job has no active 3-D Secure challenge")
        })?;
        Ok(self.inner.api.get_tds(&tds_id).await?)
    }

    /// Requests remote cancellation.
    ///
    /// Local state is untouched; the resulting `fail` arrives through the event log.
    pub async fn cancel(&self) -> Result<()> {
        let job_id = self.job_id()?;
        self.inner.api.cancel_job(&job_id).await?;
        info!(job_id = %job_id, "job cancellation requested");
        Ok(())
    }

    fn set_state(&self, state: JobState) {
        let previous = std::mem::replace(&mut self.data().state, state);
        if previous == state {
            return;
        }
        debug!(%state, %previous, "job state changed");
        self.inner.events.emit(JobEvent::StateChanged { state, previous });
    }

    async fn track(&self) -> Result<TrackEnd> {
        let job_id = self.job_id()?;
        let interval = self.inner.config.poll_interval();

        while self.inner.tracking.load(Ordering::SeqCst) {
            if let Err(cause) = self.poll(&job_id).await {
                let error = TrackError::from(cause);
                warn!(job_id = %job_id, error = %error, "job tracking failed");
                self.inner.events.emit(JobEvent::TrackError(error.clone()));
                return Err(error.into());
            }
            self.inner.events.emit(JobEvent::TrackTick);

            match self.state() {
                JobState::Success => {
                    info!(job_id = %job_id, "job succeeded");
                    return Ok(TrackEnd::Completed);
                }
                JobState::Fail => {
                    let error = self.error_info().unwrap_or_else(JobError::unknown);
                    info!(job_id = %job_id, code = %error.code, "job failed");
                    return Err(JobFailedError::from(error).into());
                }
                _ => {}
            }
            sleep(interval).await;
        }

        debug!(job_id = %job_id, "job tracking stopped");
        Ok(TrackEnd::Stopped)
    }

    /// Fetches new events and applies them in log order.
    /// The offset moves only after the whole batch is applied.
    async fn poll(&self, job_id: &str) -> std::result::Result<(), GatewayError> {
        let offset = self.data().event_offset;
        let events = self.inner.api.get_job_events(job_id, offset).await?;
        for event in &events {
            self.apply_event(job_id, event).await?;
        }
        {
            let mut data = self.data();
            data.event_offset = offset + events.len();
            data.replaying = false;
        }
        if !events.is_empty() {
            debug!(job_id, offset, count = events.len(), "applied job events");
        }
        Ok(())
    }

    async fn apply_event(
        &self,
        job_id: &str,
        event: &RemoteEvent,
    ) -> std::result::Result<(), GatewayError> {
        let transition = {
            let mut data = self.data();
            if data.replaying {
                // Replay ends at the final event.
                if matches!(event.name, RemoteEventName::Success | RemoteEventName::Fail) {
                    data.replaying = false;
                }
                StateMachine::replay(data.state, event)
            } else {
                StateMachine::transition(data.state, event)
            }
        };
        debug!(job_id, event = ?event.name, ?transition, "applying job event");

        let follow_up = match &transition {
            Transition::AwaitInput(key) => {
                self.data().awaiting_input_key = Some(key.clone());
                Some(JobEvent::AwaitingInput { key: key.clone() })
            }
            Transition::FetchOutput(key) => {
                match self.inner.api.get_job_output(job_id, key).await? {
                    Some(remote) => {
                        let output = JobOutput {
                            key: key.clone(),
                            data: remote.data,
                        };
                        self.data().outputs.insert(key.clone(), output.clone());
                        Some(JobEvent::Output(output))
                    }
                    None => {
                        debug!(job_id, key = %key, "output not available, skipping");
                        None
                    }
                }
            }
            Transition::Processing => {
                self.data().awaiting_input_key = None;
                None
            }
            Transition::Succeed => Some(JobEvent::Success),
            Transition::Fail => {
                let remote = self.inner.api.get_job(job_id).await?;
                let error = remote.error.unwrap_or_else(JobError::unknown);
                self.data().error = Some(error.clone());
                Some(JobEvent::Fail(error.into()))
            }
            Transition::TdsStart => Some(JobEvent::TdsStart),
            Transition::TdsFinish => Some(JobEvent::TdsFinish),
            Transition::Ignore(IgnoreReason::Terminal) => {
                debug!(job_id, event_id = %event.id, "job is final, event ignored");
                None
            }
            Transition::Ignore(IgnoreReason::Restart) => {
                // TODO: decide whether restart re-enters Processing or rewinds the offset.
                warn!(job_id, event_id = %event.id, "restart event has no local effect");
                None
            }
            Transition::Ignore(reason) => {
                warn!(job_id, event_id = %event.id, ?reason, "job event ignored");
                None
            }
        };

        // Subscribers see the state change before the event that caused it.
        if let Some(state) = transition.target_state() {
            self.set_state(state);
        }
        if let Some(event) = follow_up {
            self.inner.events.emit(event);
        }
        Ok(())
    }
}
