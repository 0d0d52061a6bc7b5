//! At-most-once completion gate for one call attempt.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::Disposable;
use crate::call::{Response, SharedCall};
use crate::error::CallError;
use crate::flux::FluxSink;
use crate::observability::{Fault, FaultReporter};

/// Serializes the terminal transition of one call attempt.
///
/// Two independent triggers race here: the subscriber cancelling and the call
/// completing. `disposed` is the single arbiter; once set it is never cleared,
/// and no item or completion is emitted through the gate afterwards.
///
/// Failures that can no longer be expressed as a stream signal go to the
/// [`FaultReporter`].
pub struct SyncCompletion<T> {
    call: SharedCall<T>,
    sink: FluxSink<Response<T>>,
    reporter: Arc<dyn FaultReporter>,
    disposed: AtomicBool,
}

impl<T: Send + 'static> SyncCompletion<T> {
    pub fn new(
        call: SharedCall<T>,
        sink: FluxSink<Response<T>>,
        reporter: Arc<dyn FaultReporter>,
    ) -> Self {
        Self {
            call,
            sink,
            reporter,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn call(&self) -> &SharedCall<T> {
        &self.call
    }

    /// Emit the response. Returns `true` only if the subscriber accepted it;
    /// the caller must not complete otherwise.
    ///
    /// A subscriber failure becomes the stream's error unless the gate was
    /// disposed meanwhile.
    pub fn next(&self, response: Response<T>) -> bool {
        if self.is_disposed() {
            tracing::debug!(target: "callflux::bridge", status = response.code(), "dropping response of disposed call");
            return false;
        }
        match self.sink.next(response) {
            Ok(()) => true,
            Err(consumer) => {
                if !self.is_disposed() {
                    self.error(consumer);
                }
                false
            }
        }
    }

    /// Emit completion. A subscriber failure here cannot become a stream
    /// error, so it is reported as uncaught.
    pub fn complete(&self) {
        if self.is_disposed() {
            return;
        }
        if let Err(consumer) = self.sink.complete() {
            self.reporter.report(Fault::Uncaught(consumer));
        }
    }

    /// Emit `error`, whether or not the gate is disposed. If the subscriber
    /// fails on it, both failures are reported together.
    pub fn error(&self, error: CallError) {
        tracing::trace!(target: "callflux::bridge", err = %error, "emitting error");
        if let Err(consumer) = self.sink.error(error.clone()) {
            self.reporter
                .report(Fault::Uncaught(CallError::composite(error, consumer)));
        }
    }
}

impl<T> Disposable for SyncCompletion<T> {
    /// Marks the gate disposed and cancels the call. Only the first call has
    /// any effect.
    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            tracing::debug!(target: "callflux::bridge", "disposing call");
            self.call.cancel();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}
