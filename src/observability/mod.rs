//! Observability
//!
//! Structured logging setup and the fault-reporting channel for failures that
//! cannot be delivered to a subscriber.

pub mod faults;
pub mod tracing;

pub use faults::{
    Fault, FaultReporter, TracingFaultReporter, global_reporter, report, set_global_reporter,
};
pub use self::tracing::{OutputFormat, TracingConfig, TracingConfigBuilder, init_tracing};
