//! In-process event bus scoped to one job.
//!
//! Handlers are kept per [`JobEventKind`] in registration order. [`EventBus::emit`]
//! snapshots the list before dispatching, so handlers may subscribe or
//! unsubscribe while an event is being delivered. Asynchronous handlers are
//! invoked in order and their futures spawned as independent tasks; the
//! emitter never waits for them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;

use super::state::JobState;
use super::types::JobOutput;
use crate::error::{JobFailedError, TrackError};

/// Local events emitted while a job is tracked.
#[derive(Debug, Clone)]
pub enum JobEvent {
    StateChanged { state: JobState, previous: JobState },
    AwaitingInput { key: String },
    Output(JobOutput),
    Success,
    Fail(JobFailedError),
    TdsStart,
    TdsFinish,
    /// A batch of remote events was fully applied.
    TrackTick,
    TrackError(TrackError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEventKind {
    StateChanged,
    AwaitingInput,
    Output,
    Success,
    Fail,
    TdsStart,
    TdsFinish,
    TrackTick,
    TrackError,
}

impl JobEvent {
    pub fn kind(&self) -> JobEventKind {
        match self {
            JobEvent::StateChanged { .. } => JobEventKind::StateChanged,
            JobEvent::AwaitingInput { .. } => JobEventKind::AwaitingInput,
            JobEvent::Output(_) => JobEventKind::Output,
            JobEvent::Success => JobEventKind::Success,
            JobEvent::Fail(_) => JobEventKind::Fail,
            JobEvent::TdsStart => JobEventKind::TdsStart,
            JobEvent::TdsFinish => JobEventKind::TdsFinish,
            JobEvent::TrackTick => JobEventKind::TrackTick,
            JobEvent::TrackError(_) => JobEventKind::TrackError,
        }
    }
}

type SyncHandler = Arc<dyn Fn(&JobEvent) + Send + Sync>;
type AsyncHandler = Arc<dyn Fn(JobEvent) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

#[derive(Clone)]
struct Registration {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    handlers: Mutex<HashMap<JobEventKind, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn handlers(&self) -> MutexGuard<'_, HashMap<JobEventKind, Vec<Registration>>> {
        // A panicking handler never runs under this lock, so poisoning carries no broken state.
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler that runs inline during [`emit`](Self::emit).
    pub fn on(
        &self,
        kind: JobEventKind,
        handler: impl Fn(&JobEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.register(kind, Handler::Sync(Arc::new(handler)))
    }

    /// Registers a handler whose future runs as a separate task per event.
    pub fn on_async<F, Fut>(&self, kind: JobEventKind, handler: F) -> Subscription
    where
        F: Fn(JobEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: AsyncHandler = Arc::new(move |event| handler(event).boxed());
        self.register(kind, Handler::Async(handler))
    }

    fn register(&self, kind: JobEventKind, handler: Handler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers()
            .entry(kind)
            .or_default()
            .push(Registration { id, handler });
        Subscription {
            bus: self.clone(),
            kind,
            id,
        }
    }

    /// Removes exactly one registration. Unknown ids are ignored.
    pub fn off(&self, kind: JobEventKind, id: u64) {
        if let Some(list) = self.inner.handlers().get_mut(&kind) {
            list.retain(|r| r.id != id);
        }
    }

    /// Delivers `event` to the handlers registered at the time of the call.
    ///
    /// Async handlers are spawned on the current tokio runtime.
    pub fn emit(&self, event: JobEvent) {
        let snapshot: Vec<Registration> = self
            .inner
            .handlers()
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();

        for registration in snapshot {
            match registration.handler {
                Handler::Sync(handler) => handler(&event),
                Handler::Async(handler) => {
                    tokio::spawn(handler(event.clone()));
                }
            }
        }
    }

    pub fn handler_count(&self, kind: JobEventKind) -> usize {
        self.inner.handlers().get(&kind).map_or(0, Vec::len)
    }
}

/// Handle to one registration, returned by every `on*` method.
///
/// Dropping it keeps the handler registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
#[must_use = "dropping the subscription keeps the handler registered forever"]
pub struct Subscription {
    bus: EventBus,
    kind: JobEventKind,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.bus.off(self.kind, self.id);
    }

    pub fn kind(&self) -> JobEventKind {
        self.kind
    }

    /// Turns the handle into a guard that unsubscribes when dropped.
    pub(crate) fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard(Some(self))
    }
}

pub(crate) struct SubscriptionGuard(Option<Subscription>);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(subscription) = self.0.take() {
            subscription.unsubscribe();
        }
    }
}
