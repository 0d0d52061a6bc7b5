//! Fault reporting
//!
//! Some failures have nowhere to go: the stream already delivered its
//! terminal signal, or a stage observed a signal that should be impossible.
//! Those are handed to a [`FaultReporter`] instead of being dropped.
//!
//! A process-wide reporter is installed by default and logs through
//! `tracing`. Adapters and bridges accept their own reporter, falling back to
//! the global one.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::error::CallError;

/// A failure that could not be delivered through a stream.
#[derive(Debug, Clone)]
pub enum Fault {
    /// The subscriber failed after the terminal signal was already under way.
    /// Composite causes arrive as [`CallError::Composite`].
    Uncaught(CallError),

    /// A stage observed a signal its upstream must never send.
    ProtocolViolation { message: String, cause: CallError },
}

impl Fault {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Uncaught(CallError::Composite { .. }) => "composite",
            Self::Uncaught(_) => "uncaught",
            Self::ProtocolViolation { .. } => "protocol_violation",
        }
    }

    pub fn error(&self) -> &CallError {
        match self {
            Self::Uncaught(error) => error,
            Self::ProtocolViolation { cause, .. } => cause,
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uncaught(error) => write!(f, "uncaught stream failure: {error}"),
            Self::ProtocolViolation { message, cause } => {
                write!(f, "protocol violation: {message} (cause: {cause})")
            }
        }
    }
}

/// Sink for faults that cannot reach a subscriber.
pub trait FaultReporter: Send + Sync {
    fn report(&self, fault: Fault);
}

/// Default reporter: logs every fault at `error` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFaultReporter;

impl FaultReporter for TracingFaultReporter {
    fn report(&self, fault: Fault) {
        match &fault {
            Fault::Uncaught(error) => {
                tracing::error!(target: "callflux::fault", kind = fault.kind(), err = %error, "uncaught stream failure");
            }
            Fault::ProtocolViolation { message, cause } => {
                tracing::error!(target: "callflux::fault", kind = fault.kind(), cause = %cause, "{}", message);
            }
        }
    }
}

static GLOBAL_REPORTER: OnceLock<RwLock<Arc<dyn FaultReporter>>> = OnceLock::new();

fn global_slot() -> &'static RwLock<Arc<dyn FaultReporter>> {
    GLOBAL_REPORTER.get_or_init(|| RwLock::new(Arc::new(TracingFaultReporter)))
}

/// The process-wide reporter.
pub fn global_reporter() -> Arc<dyn FaultReporter> {
    global_slot()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the process-wide reporter, returning the previous one.
///
/// Bridges capture the reporter when they are created; existing streams keep
/// the reporter they were built with.
pub fn set_global_reporter(reporter: Arc<dyn FaultReporter>) -> Arc<dyn FaultReporter> {
    let mut slot = global_slot().write().unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *slot, reporter)
}

/// Report through the process-wide reporter.
pub fn report(fault: Fault) {
    global_reporter().report(fault);
}
