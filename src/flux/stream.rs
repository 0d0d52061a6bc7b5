//! Pull-based view of a [`Flux`].

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use futures::channel::mpsc;
use futures_util::StreamExt;

use super::{Flux, Subscriber, Subscription};
use crate::error::CallError;

enum Signal<T> {
    Next(T),
    Error(CallError),
    Complete,
}

/// Forwards signals into the stream's channel. Once the stream is dropped the
/// receiver is gone and late signals are discarded.
struct ChannelSubscriber<T> {
    tx: mpsc::UnboundedSender<Signal<T>>,
}

impl<T: Send> Subscriber<T> for ChannelSubscriber<T> {
    fn on_next(&self, item: T) -> Result<(), CallError> {
        let _ = self.tx.unbounded_send(Signal::Next(item));
        Ok(())
    }

    fn on_error(&self, error: CallError) -> Result<(), CallError> {
        let _ = self.tx.unbounded_send(Signal::Error(error));
        Ok(())
    }

    fn on_complete(&self) -> Result<(), CallError> {
        let _ = self.tx.unbounded_send(Signal::Complete);
        Ok(())
    }
}

/// A subscription to a [`Flux`] consumed as a `futures::Stream`.
///
/// Demand is requested one item at a time as the stream is polled. Dropping
/// the stream before it finished cancels the subscription.
pub struct FluxStream<T> {
    subscription: Subscription,
    receiver: mpsc::UnboundedReceiver<Signal<T>>,
    awaiting: bool,
    done: bool,
}

impl<T: Send + 'static> FluxStream<T> {
    pub(super) fn new(flux: &Flux<T>) -> Self {
        let (tx, receiver) = mpsc::unbounded();
        let subscription = flux.subscribe_with(std::sync::Arc::new(ChannelSubscriber { tx }));
        Self {
            subscription,
            receiver,
            awaiting: false,
            done: false,
        }
    }
}

impl<T> FluxStream<T> {
    /// Cancel the underlying subscription without dropping the stream.
    pub fn cancel(&mut self) {
        if !self.done {
            self.done = true;
            self.subscription.cancel();
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl<T> Unpin for FluxStream<T> {}

impl<T> Stream for FluxStream<T> {
    type Item = Result<T, CallError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if !this.awaiting {
            this.awaiting = true;
            this.subscription.request(1);
        }
        match this.receiver.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Signal::Next(item))) => {
                this.awaiting = false;
                Poll::Ready(Some(Ok(item)))
            }
            Poll::Ready(Some(Signal::Error(error))) => {
                this.done = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(Signal::Complete)) | Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<T> Drop for FluxStream<T> {
    fn drop(&mut self) {
        if !self.done {
            self.subscription.cancel();
        }
    }
}
