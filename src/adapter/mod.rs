//! Adapter selection
//!
//! Chooses, from a declared or explicit return shape, which bridge starts the
//! call, whether subscribers see full responses or payloads, whether the
//! stream collapses to a single value, and where the subscription runs.

pub mod config;
mod factory;

pub use config::{AdapterOptions, DeclaredType, Execution, Multiplicity, ReturnShape, Wrapping};
pub use factory::{Adapted, CallAdapter, CallAdapterFactory};
