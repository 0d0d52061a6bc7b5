//! Callback bridge: the call is started with `enqueue` and completes on its
//! own context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Disposable, SyncCompletion};
use crate::call::{Call, Callback, Response, SharedCall};
use crate::error::CallError;
use crate::flux::{Flux, FluxSink};
use crate::observability::FaultReporter;

/// Streams the outcome of [`Call::enqueue`].
///
/// The requesting thread only starts the call; signals are emitted from the
/// thread that runs the completion callback.
pub struct CallEnqueueFlux;

impl CallEnqueueFlux {
    pub fn create<T: Send + 'static>(
        call: SharedCall<T>,
        reporter: Arc<dyn FaultReporter>,
    ) -> Flux<Response<T>> {
        Flux::create(move |sink: FluxSink<Response<T>>| {
            let attempt = call.clone_call();
            let callback = Arc::new(EnqueueCallback {
                completion: SyncCompletion::new(attempt.clone(), sink.clone(), reporter.clone()),
            });
            let started = AtomicBool::new(false);

            let gate = callback.clone();
            sink.on_request(move |_| {
                if gate.is_disposed() || started.swap(true, Ordering::AcqRel) {
                    return;
                }
                tracing::debug!(target: "callflux::bridge", mode = "enqueue", "starting call");
                attempt.enqueue(gate.clone());
            });
            sink.on_cancel(move || callback.dispose());
        })
    }
}

/// Completion callback handed to the call, and the disposal handle of the
/// subscription.
struct EnqueueCallback<T> {
    completion: SyncCompletion<T>,
}

impl<T: Send + 'static> Callback<T> for EnqueueCallback<T> {
    fn on_response(&self, _call: &dyn Call<T>, response: Response<T>) {
        if self.completion.next(response) {
            self.completion.complete();
        }
    }

    fn on_failure(&self, call: &dyn Call<T>, error: CallError) {
        // cancellation surfaces as a failure on most transports
        if call.is_canceled() || self.completion.is_disposed() {
            tracing::debug!(target: "callflux::bridge", err = %error, "suppressing failure of canceled call");
            return;
        }
        self.completion.error(error);
    }
}

impl<T> Disposable for EnqueueCallback<T> {
    fn dispose(&self) {
        self.completion.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.completion.is_disposed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCall, RecordingFaultReporter, RecordingSubscriber, Signal};
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;
    use std::thread;

    fn reporter() -> Arc<dyn FaultReporter> {
        RecordingFaultReporter::new()
    }

    #[test]
    fn immediate_response_then_completion() {
        let mock = MockCall::responding(Response::success(42u32));
        let subscriber = RecordingSubscriber::new();
        CallEnqueueFlux::create(mock.shared(), reporter())
            .subscribe_with(subscriber.clone())
            .request(1);

        let signals = subscriber.signals();
        assert_eq!(signals.len(), 2);
        assert!(matches!(&signals[0], Signal::Next(r) if r.body() == Some(&42)));
        assert!(matches!(signals[1], Signal::Complete));
    }

    #[test]
    fn unsuccessful_response_is_still_an_item() {
        let mock = MockCall::<u32>::responding(Response::error(
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            None,
        ));
        let subscriber = RecordingSubscriber::new();
        CallEnqueueFlux::create(mock.shared(), reporter())
            .subscribe_with(subscriber.clone())
            .request(1);

        let signals = subscriber.signals();
        assert!(matches!(&signals[0], Signal::Next(r) if r.code() == 404));
        assert!(matches!(signals[1], Signal::Complete));
    }

    #[test]
    fn response_arrives_on_the_completing_thread() {
        let mock = MockCall::deferred();
        let subscriber = RecordingSubscriber::new();
        let subscription =
            CallEnqueueFlux::create(mock.shared(), reporter()).subscribe_with(subscriber.clone());
        subscription.request(1);
        assert!(subscriber.is_empty());

        let attempt = mock.last_attempt().unwrap();
        assert!(attempt.is_executed());
        thread::spawn(move || attempt.respond(Response::success(9u32)))
            .join()
            .unwrap();

        assert_eq!(subscriber.len(), 2);
        assert_eq!(subscriber.terminal_count(), 1);
    }

    #[test]
    fn late_response_after_cancel_is_dropped() {
        let mock = MockCall::deferred();
        let subscriber = RecordingSubscriber::new();
        let subscription =
            CallEnqueueFlux::create(mock.shared(), reporter()).subscribe_with(subscriber.clone());
        subscription.request(1);
        subscription.cancel();

        let attempt = mock.last_attempt().unwrap();
        attempt.respond(Response::success(1u32));

        assert!(subscriber.is_empty());
        assert_eq!(attempt.cancel_requests(), 1);
    }

    #[test]
    fn failure_of_canceled_call_is_suppressed() {
        let mock = MockCall::<u32>::deferred();
        let subscriber = RecordingSubscriber::new();
        let subscription =
            CallEnqueueFlux::create(mock.shared(), reporter()).subscribe_with(subscriber.clone());
        subscription.request(1);
        subscription.cancel();

        mock.last_attempt().unwrap().fail(CallError::Canceled);
        assert!(subscriber.is_empty());
    }

    #[test]
    fn failure_without_cancel_is_emitted() {
        let mock = MockCall::<u32>::deferred();
        let subscriber = RecordingSubscriber::new();
        CallEnqueueFlux::create(mock.shared(), reporter())
            .subscribe_with(subscriber.clone())
            .request(1);

        mock.last_attempt()
            .unwrap()
            .fail(CallError::TransportError("timed out".into()));
        assert_eq!(subscriber.len(), 1);
        assert!(matches!(&subscriber.errors()[0], CallError::TransportError(_)));
    }

    #[test]
    fn demand_is_idempotent() {
        let mock = MockCall::responding(Response::success(1u32));
        let subscriber = RecordingSubscriber::new();
        let subscription =
            CallEnqueueFlux::create(mock.shared(), reporter()).subscribe_with(subscriber.clone());
        subscription.request(1);
        subscription.request(3);

        assert_eq!(mock.attempts().len(), 1);
        assert_eq!(subscriber.len(), 2);
    }

    #[test]
    fn rejected_completion_is_reported() {
        let faults = RecordingFaultReporter::new();
        let mock = MockCall::responding(Response::success(1u32));
        let subscriber = RecordingSubscriber::rejecting_complete("boom");
        CallEnqueueFlux::create(mock.shared(), faults.clone())
            .subscribe_with(subscriber.clone())
            .request(1);

        assert_eq!(faults.faults().len(), 1);
        assert!(subscriber.errors().is_empty());
    }
}
