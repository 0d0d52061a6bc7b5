//! Call-to-stream bridges
//!
//! Turns a one-shot [`Call`](crate::call::Call) into a lazily started
//! [`Flux`](crate::flux::Flux) of at most one response:
//! - `CallExecuteFlux` - runs the blocking `execute` on the demanding thread
//! - `CallEnqueueFlux` - starts the call with `enqueue` and resumes on the
//!   call's own completion context
//! - `BodyFlux` - projects a response stream onto its payloads
//! - `SyncCompletion` - the at-most-once gate shared by both call bridges

mod body;
mod completion;
mod enqueue;
mod execute;

pub use body::BodyFlux;
pub use completion::SyncCompletion;
pub use enqueue::CallEnqueueFlux;
pub use execute::CallExecuteFlux;

/// Something that can be torn down once.
pub trait Disposable {
    /// Tear down. Calling this again has no further effect.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}
