//! Test doubles
//!
//! Scriptable calls and recording subscribers for exercising bridges and
//! adapters without a network:
//! - `MockCall` - a call template whose clones are recorded as `MockAttempt`s
//! - `RecordingSubscriber` - records every signal, optionally rejecting one
//! - `RecordingFaultReporter` - collects reported faults

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};

use crate::call::{Call, Callback, Response, SharedCall};
use crate::error::CallError;
use crate::flux::Subscriber;
use crate::observability::{Fault, FaultReporter};

/// A signal observed by a [`RecordingSubscriber`].
#[derive(Debug, Clone)]
pub enum Signal<T> {
    Next(T),
    Error(CallError),
    Complete,
}

impl<T> Signal<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }
}

impl<T: PartialEq> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Next(a), Self::Next(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a.to_string() == b.to_string(),
            (Self::Complete, Self::Complete) => true,
            _ => false,
        }
    }
}

/// Records signals in arrival order.
pub struct RecordingSubscriber<T> {
    signals: Mutex<Vec<Signal<T>>>,
    reject_next: Option<String>,
    reject_error: Option<String>,
    reject_complete: Option<String>,
}

impl<T> RecordingSubscriber<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::plain())
    }

    /// Fails with [`CallError::ConsumerError`] when handed an item.
    pub fn rejecting_next(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reject_next: Some(message.into()),
            ..Self::plain()
        })
    }

    /// Fails with [`CallError::ConsumerError`] when handed an error.
    pub fn rejecting_error(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reject_error: Some(message.into()),
            ..Self::plain()
        })
    }

    /// Fails with [`CallError::ConsumerError`] on completion.
    pub fn rejecting_complete(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reject_complete: Some(message.into()),
            ..Self::plain()
        })
    }

    fn plain() -> Self {
        Self {
            signals: Mutex::new(Vec::new()),
            reject_next: None,
            reject_error: None,
            reject_complete: None,
        }
    }

    fn record(&self, signal: Signal<T>, reject: &Option<String>) -> Result<(), CallError> {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(signal);
        match reject {
            Some(message) => Err(CallError::ConsumerError(message.clone())),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of error and complete signals received.
    pub fn terminal_count(&self) -> usize {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|signal| signal.is_terminal())
            .count()
    }

    /// The recorded errors, in order.
    pub fn errors(&self) -> Vec<CallError> {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|signal| match signal {
                Signal::Error(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }
}

impl<T: Clone> RecordingSubscriber<T> {
    pub fn signals(&self) -> Vec<Signal<T>> {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T: Send> Subscriber<T> for RecordingSubscriber<T> {
    fn on_next(&self, item: T) -> Result<(), CallError> {
        self.record(Signal::Next(item), &self.reject_next)
    }

    fn on_error(&self, error: CallError) -> Result<(), CallError> {
        self.record(Signal::Error(error), &self.reject_error)
    }

    fn on_complete(&self) -> Result<(), CallError> {
        self.record(Signal::Complete, &self.reject_complete)
    }
}

/// Collects faults instead of logging them.
#[derive(Default)]
pub struct RecordingFaultReporter {
    faults: Mutex<Vec<Fault>>,
}

impl RecordingFaultReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn faults(&self) -> Vec<Fault> {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FaultReporter for RecordingFaultReporter {
    fn report(&self, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fault);
    }
}

/// How a mock attempt completes.
#[derive(Debug, Clone)]
enum Script<T> {
    Respond(Response<T>),
    Fail(CallError),
    /// Completes when the test calls [`MockAttempt::respond`] or
    /// [`MockAttempt::fail`].
    Deferred,
}

enum Outcome<T> {
    Response(Response<T>),
    Failure(CallError),
}

struct Template<T> {
    script: Script<T>,
    attempts: Mutex<Vec<Arc<MockAttempt<T>>>>,
}

/// A call template. Streams clone it per subscription; every clone is
/// recorded and reachable through [`MockCall::attempts`].
///
/// The template itself refuses to start, so a bridge that forgets to clone
/// fails loudly.
pub struct MockCall<T> {
    template: Arc<Template<T>>,
}

impl<T> Clone for MockCall<T> {
    fn clone(&self) -> Self {
        Self {
            template: self.template.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> MockCall<T> {
    /// Every attempt completes immediately with `response`.
    pub fn responding(response: Response<T>) -> Self {
        Self::with_script(Script::Respond(response))
    }

    /// Every attempt fails immediately with `error`.
    pub fn failing(error: CallError) -> Self {
        Self::with_script(Script::Fail(error))
    }

    /// Attempts complete only when the test drives them.
    pub fn deferred() -> Self {
        Self::with_script(Script::Deferred)
    }

    fn with_script(script: Script<T>) -> Self {
        Self {
            template: Arc::new(Template {
                script,
                attempts: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Shareable handle for APIs that take a [`SharedCall`].
    pub fn shared(&self) -> SharedCall<T> {
        Arc::new(self.clone())
    }

    pub fn attempts(&self) -> Vec<Arc<MockAttempt<T>>> {
        self.template
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_attempt(&self) -> Option<Arc<MockAttempt<T>>> {
        self.attempts().last().cloned()
    }

    fn new_attempt(template: &Arc<Template<T>>) -> Arc<MockAttempt<T>> {
        let attempt = Arc::new(MockAttempt {
            template: Arc::downgrade(template),
            script: template.script.clone(),
            executed: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
            cancel_requests: AtomicUsize::new(0),
            callback: Mutex::new(None),
            pending: Mutex::new(None),
            ready: Condvar::new(),
        });
        template
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(attempt.clone());
        attempt
    }
}

impl<T: Clone + Send + Sync + 'static> Call<T> for MockCall<T> {
    fn execute(&self) -> Result<Response<T>, CallError> {
        Err(CallError::ConfigurationError(
            "mock template must be cloned before execution".into(),
        ))
    }

    fn enqueue(&self, callback: Arc<dyn Callback<T>>) {
        callback.on_failure(
            self,
            CallError::ConfigurationError("mock template must be cloned before execution".into()),
        );
    }

    fn cancel(&self) {}

    fn is_canceled(&self) -> bool {
        false
    }

    fn is_executed(&self) -> bool {
        false
    }

    fn clone_call(&self) -> SharedCall<T> {
        Self::new_attempt(&self.template)
    }
}

/// One started (or startable) attempt of a [`MockCall`].
pub struct MockAttempt<T> {
    template: Weak<Template<T>>,
    script: Script<T>,
    executed: AtomicBool,
    canceled: AtomicBool,
    cancel_requests: AtomicUsize,
    callback: Mutex<Option<Arc<dyn Callback<T>>>>,
    pending: Mutex<Option<Outcome<T>>>,
    ready: Condvar,
}

impl<T: Clone + Send + Sync + 'static> MockAttempt<T> {
    /// How many times `cancel` was called on this attempt.
    pub fn cancel_requests(&self) -> usize {
        self.cancel_requests.load(Ordering::SeqCst)
    }

    /// Complete a deferred attempt with a response.
    pub fn respond(&self, response: Response<T>) {
        self.deliver(Outcome::Response(response));
    }

    /// Complete a deferred attempt with a failure.
    pub fn fail(&self, error: CallError) {
        self.deliver(Outcome::Failure(error));
    }

    /// Callbacks run on the caller's thread; a blocked `execute` is woken.
    fn deliver(&self, outcome: Outcome<T>) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(callback) => match outcome {
                Outcome::Response(response) => callback.on_response(self, response),
                Outcome::Failure(error) => callback.on_failure(self, error),
            },
            None => {
                *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
                self.ready.notify_all();
            }
        }
    }

    fn start(&self) -> Result<(), CallError> {
        if self.executed.swap(true, Ordering::SeqCst) {
            return Err(CallError::ConfigurationError("call already executed".into()));
        }
        Ok(())
    }
}

impl<T: Clone + Send + Sync + 'static> Call<T> for MockAttempt<T> {
    fn execute(&self) -> Result<Response<T>, CallError> {
        self.start()?;
        match &self.script {
            Script::Respond(response) => Ok(response.clone()),
            Script::Fail(error) => Err(error.clone()),
            Script::Deferred => {
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                loop {
                    match pending.take() {
                        Some(Outcome::Response(response)) => return Ok(response),
                        Some(Outcome::Failure(error)) => return Err(error),
                        None => {
                            pending = self
                                .ready
                                .wait(pending)
                                .unwrap_or_else(PoisonError::into_inner);
                        }
                    }
                }
            }
        }
    }

    fn enqueue(&self, callback: Arc<dyn Callback<T>>) {
        if let Err(error) = self.start() {
            callback.on_failure(self, error);
            return;
        }
        match &self.script {
            Script::Respond(response) => callback.on_response(self, response.clone()),
            Script::Fail(error) => callback.on_failure(self, error.clone()),
            Script::Deferred => {
                *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
                let early = self
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(outcome) = early {
                    self.deliver(outcome);
                }
            }
        }
    }

    fn cancel(&self) {
        self.cancel_requests.fetch_add(1, Ordering::SeqCst);
        self.canceled.store(true, Ordering::SeqCst);
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    fn is_executed(&self) -> bool {
        self.executed.load(Ordering::SeqCst)
    }

    fn clone_call(&self) -> SharedCall<T> {
        match self.template.upgrade() {
            Some(template) => MockCall::new_attempt(&template),
            None => Arc::new(MockAttempt {
                template: Weak::new(),
                script: self.script.clone(),
                executed: AtomicBool::new(false),
                canceled: AtomicBool::new(false),
                cancel_requests: AtomicUsize::new(0),
                callback: Mutex::new(None),
                pending: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }
}
