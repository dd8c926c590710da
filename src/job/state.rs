use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::{RemoteEvent, RemoteEventName};

/// The lifecycle state of a job.
///
/// ```text
/// CREATED -> PROCESSING <-> { AWAITING_INPUT, AWAITING_TDS } -> { SUCCESS, FAIL }
/// ```
///
/// `Scheduled` and `Pending` are only ever observed in a job snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    #[default]
    Created,
    Scheduled,
    Processing,
    AwaitingInput,
    AwaitingTds,
    Pending,
    Success,
    Fail,
}

impl JobState {
    /// `Success` and `Fail` are final: no transition leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Success | JobState::Fail)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Created => "created",
            JobState::Scheduled => "scheduled",
            JobState::Processing => "processing",
            JobState::AwaitingInput => "awaitingInput",
            JobState::AwaitingTds => "awaitingTds",
            JobState::Pending => "pending",
            JobState::Success => "success",
            JobState::Fail => "fail",
        };
        f.write_str(name)
    }
}

/// What applying one remote event does to the local job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Script is blocked on the input `key`.
    AwaitInput(String),
    /// Output `key` was created and must be fetched.
    FetchOutput(String),
    Processing,
    Succeed,
    /// Job failed; the error has to be read from the job snapshot.
    Fail,
    TdsStart,
    TdsFinish,
    /// Event has no local effect.
    Ignore(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Job already reached `Success` or `Fail`.
    Terminal,
    /// `restart` carries no defined local semantics yet.
    Restart,
    /// Event name not known to this client.
    Unknown,
    /// `awaitingInput` or `createOutput` without a key.
    MissingKey,
}

impl Transition {
    /// The state the job enters, for transitions that change it directly.
    pub fn target_state(&self) -> Option<JobState> {
        match self {
            Transition::AwaitInput(_) => Some(JobState::AwaitingInput),
            Transition::Processing | Transition::TdsFinish => Some(JobState::Processing),
            Transition::Succeed => Some(JobState::Success),
            Transition::Fail => Some(JobState::Fail),
            Transition::TdsStart => Some(JobState::AwaitingTds),
            Transition::FetchOutput(_) | Transition::Ignore(_) => None,
        }
    }
}

/// Maps remote events onto local transitions.
pub struct StateMachine;

impl StateMachine {
    /// Computes the transition for `event` given the current local state.
    ///
    /// Terminal states absorb every event, which keeps re-delivered or late
    /// events from mutating a finished job.
    pub fn transition(state: JobState, event: &RemoteEvent) -> Transition {
        if state.is_terminal() {
            return Transition::Ignore(IgnoreReason::Terminal);
        }
        let key = event.key.clone();
        match event.name {
            RemoteEventName::AwaitingInput => key
                .map(Transition::AwaitInput)
                .unwrap_or(Transition::Ignore(IgnoreReason::MissingKey)),
            RemoteEventName::CreateOutput => key
                .map(Transition::FetchOutput)
                .unwrap_or(Transition::Ignore(IgnoreReason::MissingKey)),
            RemoteEventName::Processing => Transition::Processing,
            RemoteEventName::Success => Transition::Succeed,
            RemoteEventName::Fail => Transition::Fail,
            RemoteEventName::TdsStart => Transition::TdsStart,
            RemoteEventName::TdsFinish => Transition::TdsFinish,
            RemoteEventName::Restart => Transition::Ignore(IgnoreReason::Restart),
            RemoteEventName::Unknown => Transition::Ignore(IgnoreReason::Unknown),
        }
    }

    /// Computes the transition for an event replayed below the final `snapshot` state.
    ///
    /// A job picked up after it finished still fetches the outputs its log
    /// announces and reports its own final event once. Intermediate
    /// state changes are absorbed.
    pub fn replay(snapshot: JobState, event: &RemoteEvent) -> Transition {
        match (event.name, event.key.clone(), snapshot) {
            (RemoteEventName::CreateOutput, Some(key), _) => Transition::FetchOutput(key),
            (RemoteEventName::CreateOutput, None, _) => Transition::Ignore(IgnoreReason::MissingKey),
            (RemoteEventName::Success, _, JobState::Success) => Transition::Succeed,
            (RemoteEventName::Fail, _, JobState::Fail) => Transition::Fail,
            _ => Transition::Ignore(IgnoreReason::Terminal),
        }
    }
}
