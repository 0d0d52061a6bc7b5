//! Single-valued view of a [`Flux`].

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::StreamExt;

use super::{Flux, FluxStream};
use crate::error::CallError;

/// A deferred value that resolves to the last item of a [`Flux`], or fails.
///
/// Like the flux it wraps, a `Mono` is lazy and re-subscribable: every
/// `.await` (or [`Mono::subscribe`]) starts an independent subscription.
pub struct Mono<T> {
    flux: Flux<T>,
}

impl<T> Clone for Mono<T> {
    fn clone(&self) -> Self {
        Self {
            flux: self.flux.clone(),
        }
    }
}

impl<T: Send + 'static> Mono<T> {
    pub(super) fn from_flux(flux: Flux<T>) -> Self {
        Self { flux }
    }

    pub fn subscribe(&self) -> MonoFuture<T> {
        MonoFuture {
            stream: self.flux.subscribe(),
            last: None,
        }
    }

    /// The multi-valued stream this view collapses.
    pub fn into_flux(self) -> Flux<T> {
        self.flux
    }
}

impl<T: Send + 'static> IntoFuture for Mono<T> {
    type Output = Result<T, CallError>;
    type IntoFuture = MonoFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.subscribe()
    }
}

impl<T> std::fmt::Debug for Mono<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mono").finish_non_exhaustive()
    }
}

/// Future returned by awaiting a [`Mono`]. Dropping it cancels.
pub struct MonoFuture<T> {
    stream: FluxStream<T>,
    last: Option<T>,
}

impl<T> Unpin for MonoFuture<T> {}

impl<T> Future for MonoFuture<T> {
    type Output = Result<T, CallError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match this.stream.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(item))) => this.last = Some(item),
                Poll::Ready(Some(Err(error))) => return Poll::Ready(Err(error)),
                Poll::Ready(None) => {
                    return Poll::Ready(this.last.take().ok_or(CallError::NoSuchElement));
                }
            }
        }
    }
}
