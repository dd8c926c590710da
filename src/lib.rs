//! Client SDK for running and tracking Automation Cloud jobs.
//!
//! A [`Client`] creates jobs on the remote platform and returns a [`Job`]
//! tracker for each. The tracker polls the job's event log, mirrors its state
//! and outputs locally and dispatches events to subscribed handlers.
//!
//! ```no_run
//! use automation_cloud::{Auth, Client, ClientConfig, JobInitParams};
//! use serde_json::json;
//!
//! # async fn run() -> automation_cloud::Result<()> {
//! let client = Client::new(
//!     ClientConfig::new("my-service-id").with_auth(Auth::shared_secret("my-secret-key")),
//! )?;
//! let job = client
//!     .create_job(JobInitParams::new().with_input("url", json!("https://example.com")))
//!     .await?;
//!
//! let _consent = job.on_awaiting_input("finalPriceConsent", |_key| async {
//!     Some(json!(true))
//! });
//! let outputs = job.wait_for_outputs(&["finalPrice"]).await?;
//! println!("price: {}", outputs[0]);
//! job.wait_for_completion().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod job;

pub use client::Client;
pub use config::{Auth, ClientConfig};
pub use error::{Error, JobFailedError, OutputWaitError, OutputWaitReason, Result, TrackError};
pub use job::{
    ErrorCategory, Job, JobCategory, JobError, JobEvent, JobEventKind, JobInitParams, JobInput,
    JobOutput, JobState, Subscription, Tds,
};
