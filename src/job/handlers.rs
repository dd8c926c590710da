//! Consumer-facing subscriptions.
//!
//! Every `on_*` method registers an asynchronous handler on the job's event
//! bus and returns a [`Subscription`]. Handlers run as independent tasks, so a
//! slow handler never delays the polling loop or other handlers.
//!
//! Output keys support a `prefix:*` pattern matching every key under `prefix:`.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use super::events::{JobEvent, JobEventKind, Subscription};
use super::state::JobState;
use super::tracker::Job;
use crate::error::JobFailedError;

/// Dynamic outputs carrying output events are published under this prefix.
const OUTPUT_EVENTS_PREFIX: &str = "events";

fn match_key(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix(":*") {
        Some(prefix) => key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(':')),
        None => pattern == key,
    }
}

impl Job {
    /// Calls `handler` when the script requests input `key` (`*` for any key).
    ///
    /// If the handler returns `Some(data)`, the data is submitted as the
    /// requested input. Submission failures are logged.
    pub fn on_awaiting_input<F, Fut>(&self, key: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Value>> + Send + 'static,
    {
        let pattern = key.into();
        let handler = Arc::new(handler);
        let job = Arc::downgrade(&self.inner);
        self.inner
            .events
            .on_async(JobEventKind::AwaitingInput, move |event| {
                let handler = handler.clone();
                let job = job.clone();
                let pattern = pattern.clone();
                async move {
                    let JobEvent::AwaitingInput { key } = event else {
                        return;
                    };
                    if pattern != "*" && pattern != key {
                        return;
                    }
                    let Some(data) = (*handler)(key.clone()).await else {
                        return;
                    };
                    let Some(inner) = job.upgrade() else {
                        return;
                    };
                    if let Err(err) = (Job { inner }).submit_input(&key, data).await {
                        warn!(key = %key, error = %err, "failed to submit requested input");
                    }
                }
            })
    }

    /// Calls `handler` with the data of output `key` whenever it is emitted.
    pub fn on_output<F, Fut>(&self, key: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let pattern = key.into();
        let handler = Arc::new(handler);
        self.inner.events.on_async(JobEventKind::Output, move |event| {
            let handler = handler.clone();
            let pattern = pattern.clone();
            async move {
                if let JobEvent::Output(output) = event {
                    if match_key(&pattern, &output.key) {
                        (*handler)(output.data).await;
                    }
                }
            }
        })
    }

    /// Calls `handler` for dynamic outputs `prefix:<anything>` (and `prefix` itself).
    pub fn on_dynamic_output<F, Fut>(&self, prefix: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let prefix = prefix.into();
        let handler = Arc::new(handler);
        self.inner.events.on_async(JobEventKind::Output, move |event| {
            let handler = handler.clone();
            let prefix = prefix.clone();
            async move {
                if let JobEvent::Output(output) = event {
                    let dynamic = output.key.starts_with(&format!("{prefix}:"));
                    if dynamic || match_key(&prefix, &output.key) {
                        (*handler)(output.key, output.data).await;
                    }
                }
            }
        })
    }

    /// Calls `handler` for every emitted output.
    pub fn on_any_output<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.inner.events.on_async(JobEventKind::Output, move |event| {
            let handler = handler.clone();
            async move {
                if let JobEvent::Output(output) = event {
                    (*handler)(output.key, output.data).await;
                }
            }
        })
    }

    /// Calls `handler` for output events (`events:*` outputs) whose `type` matches.
    pub fn on_output_event<F, Fut>(&self, event_type: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let event_type = event_type.into();
        let handler = Arc::new(handler);
        self.on_dynamic_output(OUTPUT_EVENTS_PREFIX, move |_key, data| {
            let handler = handler.clone();
            let matches = data
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| match_key(&event_type, t));
            async move {
                if matches {
                    (*handler)(data).await;
                }
            }
        })
    }

    pub fn on_state_changed<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(JobState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.inner
            .events
            .on_async(JobEventKind::StateChanged, move |event| {
                let handler = handler.clone();
                async move {
                    if let JobEvent::StateChanged { state, .. } = event {
                        (*handler)(state).await;
                    }
                }
            })
    }

    pub fn on_success<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .events
            .on_async(JobEventKind::Success, move |_| handler())
    }

    /// Calls `handler` with the job failure once the job fails.
    pub fn on_fail<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(JobFailedError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.inner.events.on_async(JobEventKind::Fail, move |event| {
            let handler = handler.clone();
            async move {
                if let JobEvent::Fail(error) = event {
                    (*handler)(error).await;
                }
            }
        })
    }
}
