//! End-to-end bridge behavior against scripted calls.

mod support;

use std::sync::Arc;
use std::thread;

use callflux::bridge::{BodyFlux, CallEnqueueFlux, CallExecuteFlux};
use callflux::testing::{MockCall, RecordingFaultReporter, RecordingSubscriber, Signal};
use callflux::{CallError, FaultReporter};
use support::{User, is_well_formed, not_found, ok_user};

fn reporter() -> Arc<dyn FaultReporter> {
    RecordingFaultReporter::new()
}

#[test]
fn synchronous_success_emits_payload_then_completes() {
    let mock = MockCall::responding(ok_user(42));
    let subscriber = RecordingSubscriber::new();
    CallExecuteFlux::create(mock.shared(), reporter())
        .subscribe_with(subscriber.clone())
        .request(1);

    let signals = subscriber.signals();
    assert_eq!(signals.len(), 2);
    match &signals[0] {
        Signal::Next(response) => assert_eq!(response.body(), Some(&User { id: 42 })),
        other => panic!("expected next, got {other:?}"),
    }
    assert!(matches!(signals[1], Signal::Complete));
}

#[test]
fn cancel_before_callback_silences_the_late_success() {
    let mock = MockCall::<User>::deferred();
    let subscriber = RecordingSubscriber::new();
    let subscription =
        CallEnqueueFlux::create(mock.shared(), reporter()).subscribe_with(subscriber.clone());
    subscription.request(1);
    subscription.cancel();
    subscription.cancel();

    let attempt = mock.last_attempt().unwrap();
    thread::spawn({
        let attempt = attempt.clone();
        move || attempt.respond(ok_user(1))
    })
    .join()
    .unwrap();

    assert!(subscriber.is_empty());
    assert_eq!(attempt.cancel_requests(), 1);
}

#[test]
fn not_found_becomes_one_structured_error() {
    let mock = MockCall::responding(not_found());
    let responses = CallExecuteFlux::create(mock.shared(), reporter());
    let subscriber = RecordingSubscriber::<User>::new();
    BodyFlux::create(responses, reporter())
        .subscribe_with(subscriber.clone())
        .request(1);

    let signals = subscriber.signals();
    assert_eq!(signals.len(), 1);
    match &signals[0] {
        Signal::Error(CallError::UnsuccessfulResponse(http)) => {
            assert_eq!(http.code(), 404);
            assert_eq!(http.message(), "Not Found");
            assert_eq!(http.body(), Some(r#"{"error":"no such user"}"#));
        }
        other => panic!("expected unsuccessful response, got {other:?}"),
    }
}

#[test]
fn body_projection_forwards_the_payload() {
    let mock = MockCall::responding(ok_user(7));
    let subscriber = RecordingSubscriber::new();
    BodyFlux::create(CallEnqueueFlux::create(mock.shared(), reporter()), reporter())
        .subscribe_with(subscriber.clone())
        .request(1);

    assert_eq!(
        subscriber.signals(),
        vec![Signal::Next(User { id: 7 }), Signal::Complete]
    );
}

#[test]
fn each_subscription_is_an_independent_attempt() {
    let mock = MockCall::<User>::deferred();
    let flux = CallEnqueueFlux::create(mock.shared(), reporter());

    let first = RecordingSubscriber::new();
    let second = RecordingSubscriber::new();
    let first_subscription = flux.subscribe_with(first.clone());
    let second_subscription = flux.subscribe_with(second.clone());
    first_subscription.request(1);
    second_subscription.request(1);

    let attempts = mock.attempts();
    assert_eq!(attempts.len(), 2);

    second_subscription.cancel();
    attempts[0].respond(ok_user(1));
    attempts[1].respond(ok_user(2));

    assert_eq!(first.len(), 2);
    assert!(is_well_formed(&first.signals()));
    assert!(second.is_empty());
    assert_eq!(attempts[0].cancel_requests(), 0);
    assert_eq!(attempts[1].cancel_requests(), 1);
}

#[test]
fn transport_failure_reaches_the_body_stream() {
    let mock = MockCall::<User>::failing(CallError::TransportError("connection reset".into()));
    let subscriber = RecordingSubscriber::<User>::new();
    BodyFlux::create(CallExecuteFlux::create(mock.shared(), reporter()), reporter())
        .subscribe_with(subscriber.clone())
        .request(1);

    assert_eq!(
        subscriber.signals(),
        vec![Signal::Error(CallError::TransportError("connection reset".into()))]
    );
}

#[test]
fn racing_cancel_and_completion_never_double_terminate() {
    for _ in 0..200 {
        let mock = MockCall::<User>::deferred();
        let subscriber = RecordingSubscriber::new();
        let subscription =
            CallEnqueueFlux::create(mock.shared(), reporter()).subscribe_with(subscriber.clone());
        subscription.request(1);
        let attempt = mock.last_attempt().unwrap();

        let completer = thread::spawn({
            let attempt = attempt.clone();
            move || attempt.respond(ok_user(1))
        });
        let canceller = thread::spawn(move || subscription.cancel());
        completer.join().unwrap();
        canceller.join().unwrap();

        let signals = subscriber.signals();
        assert!(is_well_formed(&signals), "{signals:?}");
        assert!(subscriber.terminal_count() <= 1);
        assert!(attempt.cancel_requests() <= 1);
    }
}
