//! Projection of a response stream onto its payloads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::call::Response;
use crate::error::CallError;
use crate::flux::{Flux, FluxSink, Subscriber, Subscription};
use crate::observability::{Fault, FaultReporter};

/// Turns `Flux<Response<T>>` into `Flux<T>`.
///
/// A 2xx response contributes its payload, if it has one. Any other status
/// terminates the stream with [`CallError::UnsuccessfulResponse`], and the
/// upstream completion that follows is swallowed.
pub struct BodyFlux;

impl BodyFlux {
    pub fn create<T: Send + 'static>(
        upstream: Flux<Response<T>>,
        reporter: Arc<dyn FaultReporter>,
    ) -> Flux<T> {
        Flux::create(move |sink: FluxSink<T>| {
            let link = Arc::new(UpstreamLink::default());
            let started = AtomicBool::new(false);

            let emitter = sink.clone();
            let upstream = upstream.clone();
            let reporter = reporter.clone();
            let connect = link.clone();
            sink.on_request(move |_| {
                if started.swap(true, Ordering::AcqRel) {
                    return;
                }
                let subscriber = Arc::new(BodySubscriber {
                    sink: emitter.clone(),
                    reporter: reporter.clone(),
                    terminated: AtomicBool::new(false),
                });
                let subscription = upstream.subscribe_with(subscriber);
                if connect.attach(subscription.clone()) {
                    subscription.request(1);
                }
            });
            sink.on_cancel(move || link.cancel());
        })
    }
}

/// Upstream subscription, filled in once demand arrives.
#[derive(Default)]
struct UpstreamLink {
    state: Mutex<LinkState>,
}

#[derive(Default)]
struct LinkState {
    subscription: Option<Subscription>,
    cancelled: bool,
}

impl UpstreamLink {
    /// Returns `false` if the downstream was cancelled in the meantime, in
    /// which case the upstream is cancelled too.
    fn attach(&self, subscription: Subscription) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.cancelled {
            drop(state);
            subscription.cancel();
            return false;
        }
        state.subscription = Some(subscription);
        true
    }

    fn cancel(&self) {
        let upstream = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.cancelled = true;
            state.subscription.take()
        };
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}

struct BodySubscriber<T> {
    sink: FluxSink<T>,
    reporter: Arc<dyn FaultReporter>,
    terminated: AtomicBool,
}

impl<T: Send + 'static> Subscriber<Response<T>> for BodySubscriber<T> {
    fn on_next(&self, response: Response<T>) -> Result<(), CallError> {
        if response.is_successful() {
            return match response.into_body() {
                Some(body) => self.sink.next(body),
                None => {
                    tracing::debug!(target: "callflux::body", "successful response without payload");
                    Ok(())
                }
            };
        }

        self.terminated.store(true, Ordering::Release);
        let error = CallError::UnsuccessfulResponse(response.to_http_error());
        tracing::debug!(target: "callflux::body", status = error.status_code(), "unsuccessful response");
        if let Err(consumer) = self.sink.error(error.clone()) {
            self.reporter
                .report(Fault::Uncaught(CallError::composite(error, consumer)));
        }
        Ok(())
    }

    fn on_error(&self, error: CallError) -> Result<(), CallError> {
        if self.terminated.swap(true, Ordering::AcqRel) {
            self.reporter.report(Fault::ProtocolViolation {
                message: "error received after the body stream terminated".into(),
                cause: error,
            });
            return Ok(());
        }
        self.sink.error(error)
    }

    fn on_complete(&self) -> Result<(), CallError> {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.sink.complete()
    }
}
