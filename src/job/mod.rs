pub mod events;
pub mod handlers;
pub mod state;
pub mod tracker;
pub mod types;
pub mod wait;

#[cfg(test)]
pub(crate) mod fake;

pub use events::{EventBus, JobEvent, JobEventKind, Subscription};
pub use state::{IgnoreReason, JobState, StateMachine, Transition};
pub use tracker::Job;
pub use types::{ErrorCategory, JobCategory, JobError, JobInitParams, JobInput, JobOutput, Tds};
