//! callflux
//!
//! Lazy, cancellable reactive streams over one-shot calls.
//!
//! A [`Call`] yields at most one [`Response`]. The bridges in [`bridge`] turn
//! it into a [`Flux`] that starts the call on first demand, cancels it when
//! the subscription is cancelled, and emits exactly one of `next, complete`,
//! `error`, or nothing. [`CallAdapterFactory`] picks the bridge and the final
//! shape (full responses or payloads, stream or single value).
#![deny(unsafe_code)]

pub mod adapter;
pub mod bridge;
pub mod call;
pub mod error;
pub mod flux;
pub mod observability;
pub mod testing;

pub use adapter::{Adapted, AdapterOptions, CallAdapter, CallAdapterFactory, DeclaredType, ReturnShape};
pub use call::{Call, Callback, HttpCall, HttpRequestSpec, Response, SharedCall};
pub use error::{CallError, HttpError, Result};
pub use flux::{Flux, FluxSink, FluxStream, Mono, Scheduler, Subscriber, Subscription, TokioScheduler};
pub use observability::{Fault, FaultReporter, TracingConfig, init_tracing};
