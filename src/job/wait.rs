//! Wait primitives built on the event bus and the tracking status.

use serde_json::Value;
use tokio::sync::mpsc;

use super::events::{JobEvent, JobEventKind};
use super::state::JobState;
use super::tracker::{Job, TrackStatus};
use crate::error::{Error, OutputWaitError, OutputWaitReason, Result};

impl Job {
    /// Resolves once tracking ends.
    ///
    /// Returns the job failure or track error that ended the loop. Resolves
    /// immediately if tracking was never started.
    pub async fn wait_for_completion(&self) -> Result<()> {
        let mut status = self.inner.status.subscribe();
        let done = status
            .wait_for(|s| !matches!(s, TrackStatus::Running))
            .await
            .map_err(|_| Error::JobNotInitialized)?;
        match &*done {
            TrackStatus::Failed(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }

    /// Resolves with the data of every key, in request order, once all are cached.
    ///
    /// Fails if the job reaches a terminal state, tracking stops or a track
    /// error occurs before all keys are available.
    pub async fn wait_for_outputs(&self, keys: &[&str]) -> Result<Vec<Value>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let wake = |kind: JobEventKind| {
            let tx = tx.clone();
            self.inner
                .events
                .on(kind, move |event: &JobEvent| {
                    let terminal = match event {
                        JobEvent::StateChanged { state, .. } => state.is_terminal(),
                        _ => true,
                    };
                    if terminal {
                        let _ = tx.send(());
                    }
                })
                .into_guard()
        };
        let _guards = [
            wake(JobEventKind::TrackTick),
            wake(JobEventKind::StateChanged),
            wake(JobEventKind::TrackError),
        ];
        let mut status = self.inner.status.subscribe();

        loop {
            if let Some(values) = self.check_outputs(keys)? {
                return Ok(values);
            }
            let stopped = match &*status.borrow_and_update() {
                TrackStatus::Failed(err) => return Err(err.clone()),
                TrackStatus::Stopped | TrackStatus::Idle => true,
                TrackStatus::Running | TrackStatus::Completed => false,
            };
            if stopped {
                return Err(self.wait_error(keys, OutputWaitReason::TrackingStopped));
            }

            tokio::select! {
                _ = rx.recv() => {}
                changed = status.changed() => {
                    if changed.is_err() {
                        return Err(self.wait_error(keys, OutputWaitReason::TrackingStopped));
                    }
                }
            }
        }
    }

    /// `Some` when every key is cached; an error once the job is final without them.
    ///
    /// A job that was already final when tracking began is judged only after
    /// its log has been replayed.
    fn check_outputs(&self, keys: &[&str]) -> Result<Option<Vec<Value>>> {
        let (state, replaying) = {
            let data = self.data();
            let values: Option<Vec<Value>> = keys
                .iter()
                .map(|key| data.outputs.get(*key).map(|o| o.data.clone()))
                .collect();
            if values.is_some() {
                return Ok(values);
            }
            (data.state, data.replaying)
        };

        if state.is_terminal() && !replaying {
            let reason = if state == JobState::Success {
                OutputWaitReason::Succeeded
            } else {
                OutputWaitReason::Failed
            };
            return Err(self.wait_error(keys, reason));
        }
        Ok(None)
    }

    fn wait_error(&self, keys: &[&str], reason: OutputWaitReason) -> Error {
        let data = self.data();
        OutputWaitError {
            reason,
            job_id: data.job_id.clone().unwrap_or_default(),
            state: data.state,
            missing: keys
                .iter()
                .filter(|key| !data.outputs.contains_key(**key))
                .map(|key| key.to_string())
                .collect(),
        }
        .into()
    }
}
