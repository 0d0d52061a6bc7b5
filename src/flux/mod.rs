//! Reactive Stream Module
//!
//! A small push-based stream with explicit demand and cancellation, plus
//! adapters onto `futures::Stream` and `Future`:
//! - `Flux` - re-subscribable, lazily started stream built from a producer
//! - `FluxSink` - the producer's handle for emitting signals and observing
//!   demand and cancellation
//! - `Subscription` - the consumer's handle for requesting demand and cancelling
//! - `FluxStream` / `Mono` - pull-based views for async consumers
//! - `Scheduler` - where subscription work runs

mod mono;
pub mod scheduler;
mod stream;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::CallError;

pub use mono::{Mono, MonoFuture};
pub use scheduler::{ImmediateScheduler, Scheduler, TokioScheduler};
pub use stream::FluxStream;

/// Receives the signals of one subscription.
///
/// Returning `Err` reports that the consumer failed while handling the
/// signal. Panics are not intercepted and unwind through the emitter.
pub trait Subscriber<T>: Send + Sync {
    fn on_next(&self, item: T) -> Result<(), CallError>;

    fn on_error(&self, error: CallError) -> Result<(), CallError>;

    fn on_complete(&self) -> Result<(), CallError>;
}

type RequestHandler = Arc<dyn Fn(u64) + Send + Sync>;
type CancelHandler = Box<dyn FnOnce() + Send>;

/// State shared between a sink and its subscription.
#[derive(Default)]
struct Hooks {
    request: Mutex<RequestSlot>,
    cancel: Mutex<Option<CancelHandler>>,
    cancelled: AtomicBool,
    terminated: AtomicBool,
}

#[derive(Default)]
struct RequestSlot {
    handler: Option<RequestHandler>,
    pending: u64,
}

impl Hooks {
    fn request(&self, n: u64) {
        if n == 0
            || self.cancelled.load(Ordering::Acquire)
            || self.terminated.load(Ordering::Acquire)
        {
            return;
        }
        let handler = {
            let mut slot = self.request.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.handler.clone() {
                Some(handler) => handler,
                None => {
                    slot.pending = slot.pending.saturating_add(n);
                    return;
                }
            }
        };
        handler(n);
    }

    fn set_request_handler(&self, handler: RequestHandler) {
        if self.terminated.load(Ordering::Acquire) {
            return;
        }
        let pending = {
            let mut slot = self.request.lock().unwrap_or_else(PoisonError::into_inner);
            slot.handler = Some(handler.clone());
            std::mem::take(&mut slot.pending)
        };
        if pending > 0 && !self.cancelled.load(Ordering::Acquire) {
            handler(pending);
        }
    }

    fn cancel(&self) {
        if self.terminated.load(Ordering::Acquire) || self.cancelled.swap(true, Ordering::AcqRel)
        {
            return;
        }
        self.request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handler = None;
        let handler = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Drop both handlers. They usually hold a clone of the sink, so keeping
    /// them past termination would leak the subscription.
    fn release(&self) {
        self.request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handler = None;
        drop(
            self.cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }

    fn set_cancel_handler(&self, handler: CancelHandler) {
        if self.terminated.load(Ordering::Acquire) {
            return;
        }
        if self.cancelled.load(Ordering::Acquire) {
            handler();
            return;
        }
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
        // cancel() may have run between the check and the store
        if self.cancelled.load(Ordering::Acquire) {
            let handler = self
                .cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(handler) = handler {
                handler();
            }
        }
    }
}

/// Producer-side handle of one subscription.
///
/// Once the subscription is cancelled the sink stops being receptive: `next`,
/// `error` and `complete` return `Ok(())` without reaching the subscriber.
/// Before that, signals are passed straight through, including signals after
/// a terminal one; the producer must emit at most one terminal signal.
pub struct FluxSink<T> {
    subscriber: Arc<dyn Subscriber<T>>,
    hooks: Arc<Hooks>,
}

impl<T> Clone for FluxSink<T> {
    fn clone(&self) -> Self {
        Self {
            subscriber: self.subscriber.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<T> FluxSink<T> {
    pub fn next(&self, item: T) -> Result<(), CallError> {
        if self.is_cancelled() {
            tracing::trace!(target: "callflux::flux", "dropping item after cancel");
            return Ok(());
        }
        self.subscriber.on_next(item)
    }

    pub fn error(&self, error: CallError) -> Result<(), CallError> {
        if self.is_cancelled() {
            tracing::debug!(target: "callflux::flux", err = %error, "dropping error after cancel");
            return Ok(());
        }
        self.hooks.terminated.store(true, Ordering::Release);
        self.hooks.release();
        self.subscriber.on_error(error)
    }

    pub fn complete(&self) -> Result<(), CallError> {
        if self.is_cancelled() {
            return Ok(());
        }
        self.hooks.terminated.store(true, Ordering::Release);
        self.hooks.release();
        self.subscriber.on_complete()
    }

    /// Register the demand handler. Demand requested before registration is
    /// delivered immediately.
    pub fn on_request<F>(&self, handler: F) -> &Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.hooks.set_request_handler(Arc::new(handler));
        self
    }

    /// Register the cancellation handler. It runs at most once, and right away
    /// if the subscription was already cancelled.
    pub fn on_cancel<F>(&self, handler: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.set_cancel_handler(Box::new(handler));
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.hooks.cancelled.load(Ordering::Acquire)
    }
}

impl<T> Subscriber<T> for FluxSink<T> {
    fn on_next(&self, item: T) -> Result<(), CallError> {
        self.next(item)
    }

    fn on_error(&self, error: CallError) -> Result<(), CallError> {
        self.error(error)
    }

    fn on_complete(&self) -> Result<(), CallError> {
        self.complete()
    }
}

/// Consumer-side handle of one subscription.
#[derive(Clone)]
pub struct Subscription {
    hooks: Arc<Hooks>,
}

impl Subscription {
    /// Signal demand for `n` more items. Ignored once cancelled.
    pub fn request(&self, n: u64) {
        self.hooks.request(n);
    }

    /// Cancel the subscription. Idempotent, and a no-op after the producer
    /// emitted a terminal signal.
    pub fn cancel(&self) {
        self.hooks.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.hooks.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.hooks.cancelled.load(Ordering::Acquire))
            .field("terminated", &self.hooks.terminated.load(Ordering::Acquire))
            .finish()
    }
}

/// A lazily started stream of zero or more items followed by at most one
/// terminal signal.
///
/// Each subscription invokes the producer again with a fresh sink, so a
/// `Flux` can be subscribed to any number of times.
pub struct Flux<T> {
    producer: Arc<dyn Fn(FluxSink<T>) + Send + Sync>,
}

impl<T> Clone for Flux<T> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Build a stream from a producer callback invoked once per subscription.
    pub fn create<F>(producer: F) -> Self
    where
        F: Fn(FluxSink<T>) + Send + Sync + 'static,
    {
        Self {
            producer: Arc::new(producer),
        }
    }

    /// Subscribe with a push-based subscriber. Nothing is produced until
    /// [`Subscription::request`] is called.
    pub fn subscribe_with(&self, subscriber: Arc<dyn Subscriber<T>>) -> Subscription {
        let hooks = Arc::new(Hooks::default());
        let sink = FluxSink {
            subscriber,
            hooks: hooks.clone(),
        };
        (self.producer)(sink);
        Subscription { hooks }
    }

    /// Subscribe as a `futures::Stream`. The first poll requests demand;
    /// dropping the stream cancels the subscription.
    pub fn subscribe(&self) -> FluxStream<T> {
        FluxStream::new(self)
    }

    /// Single-valued view emitting the last item, or
    /// [`CallError::NoSuchElement`] if the stream completes empty.
    pub fn last(self) -> Mono<T> {
        Mono::from_flux(self)
    }

    /// Run subscription, demand and cancellation on `scheduler`.
    pub fn subscribe_on(self, scheduler: Arc<dyn Scheduler>) -> Flux<T> {
        scheduler::subscribe_on(self, scheduler)
    }
}

impl<T> std::fmt::Debug for Flux<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flux").finish_non_exhaustive()
    }
}
