//! Blocking bridge: the call runs on whichever thread signals demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Disposable, SyncCompletion};
use crate::call::{Response, SharedCall};
use crate::flux::{Flux, FluxSink};
use crate::observability::FaultReporter;

/// Streams the outcome of [`Call::execute`](crate::call::Call::execute).
///
/// Every subscription clones the call, waits for the first request, then
/// blocks the requesting thread on `execute`. Cancelling the subscription
/// cancels the in-flight attempt.
pub struct CallExecuteFlux;

impl CallExecuteFlux {
    pub fn create<T: Send + 'static>(
        call: SharedCall<T>,
        reporter: Arc<dyn FaultReporter>,
    ) -> Flux<Response<T>> {
        Flux::create(move |sink: FluxSink<Response<T>>| {
            let attempt = call.clone_call();
            let completion = Arc::new(SyncCompletion::new(
                attempt.clone(),
                sink.clone(),
                reporter.clone(),
            ));
            let started = AtomicBool::new(false);

            let gate = completion.clone();
            sink.on_request(move |_| {
                if gate.is_disposed() || started.swap(true, Ordering::AcqRel) {
                    return;
                }
                tracing::debug!(target: "callflux::bridge", mode = "execute", "starting call");
                match attempt.execute() {
                    Ok(response) => {
                        if gate.next(response) {
                            gate.complete();
                        }
                    }
                    Err(error) => gate.error(error),
                }
            });
            sink.on_cancel(move || completion.dispose());
        })
    }
}
