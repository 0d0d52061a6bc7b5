//! Schedulers
//!
//! A scheduler is an opaque "run this work somewhere" capability. The bridges
//! never pick one themselves; the adapter layer may move a whole subscription
//! onto one with [`Flux::subscribe_on`].

use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;

use super::{Flux, FluxSink, Subscription};
use crate::error::CallError;

/// Unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Task);

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "scheduler"
    }
}

/// Runs every task inline on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, task: Task) {
        task();
    }

    fn name(&self) -> &'static str {
        "immediate"
    }
}

/// Runs tasks on a tokio runtime's blocking pool, so blocking calls started
/// from a subscription never occupy an async worker.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler bound to the runtime of the current context.
    pub fn try_current() -> Result<Self, CallError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| CallError::ConfigurationError(format!("no tokio runtime: {e}")))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        drop(self.handle.spawn_blocking(task));
    }

    fn name(&self) -> &'static str {
        "tokio-blocking"
    }
}

#[derive(Default)]
struct SubscribeOnState {
    upstream: Option<Subscription>,
    pending: u64,
    cancelled: bool,
}

pub(super) fn subscribe_on<T: Send + 'static>(
    source: Flux<T>,
    scheduler: Arc<dyn Scheduler>,
) -> Flux<T> {
    Flux::create(move |sink: FluxSink<T>| {
        let state = Arc::new(Mutex::new(SubscribeOnState::default()));

        {
            let source = source.clone();
            let state = state.clone();
            let downstream = sink.clone();
            let scheduler_name = scheduler.name();
            scheduler.schedule(Box::new(move || {
                tracing::trace!(target: "callflux::scheduler", scheduler = scheduler_name, "subscribing upstream");
                let upstream = source.subscribe_with(Arc::new(downstream));
                let pending = {
                    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    if state.cancelled {
                        drop(state);
                        upstream.cancel();
                        return;
                    }
                    state.upstream = Some(upstream.clone());
                    std::mem::take(&mut state.pending)
                };
                if pending > 0 {
                    upstream.request(pending);
                }
            }));
        }

        {
            let state = state.clone();
            let scheduler = scheduler.clone();
            sink.on_request(move |n| {
                let upstream = {
                    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    match state.upstream.clone() {
                        Some(upstream) => upstream,
                        None => {
                            state.pending = state.pending.saturating_add(n);
                            return;
                        }
                    }
                };
                scheduler.schedule(Box::new(move || upstream.request(n)));
            });
        }

        sink.on_cancel(move || {
            let upstream = {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.cancelled = true;
                state.upstream.take()
            };
            if let Some(upstream) = upstream {
                upstream.cancel();
            }
        });
    })
}
