//! IntoStream
//!
//! Consume a publisher with `async`/`.await`. The stream asks the publisher
//! for one value each time it is polled with nothing buffered, so a
//! demand-honouring publisher never runs ahead of the consumer.
//!
//! # Example
//!
//! ```rust
//! use futures::{executor::block_on, StreamExt};
//! use rxfuse::prelude::*;
//!
//! let subject = Subject::<i32, String>::default();
//! let mut stream = subject.into_stream();
//! assert!(futures::FutureExt::now_or_never(stream.next()).is_none());
//!
//! subject.next(7);
//! assert_eq!(block_on(stream.next()), Some(Ok(7)));
//! ```

use std::{
  cell::RefCell,
  collections::VecDeque,
  pin::Pin,
  rc::Rc,
  task::{Context, Poll, Waker},
};

use futures::Stream;
use tracing::trace;

use crate::{
  demand::Demand,
  publisher::Publisher,
  subscriber::{Completion, Subscriber},
  subscription::{AnySubscription, Cancellable, Subscription},
};

struct StreamState<Item, Err> {
  queue: VecDeque<Result<Item, Err>>,
  waker: Option<Waker>,
  is_closed: bool,
  // One value has been asked for and not yet received.
  requested: bool,
  subscription: Option<AnySubscription>,
}

impl<Item, Err> Default for StreamState<Item, Err> {
  fn default() -> Self {
    Self { queue: VecDeque::new(), waker: None, is_closed: false, requested: false, subscription: None }
  }
}

impl<Item, Err> StreamState<Item, Err> {
  fn wake(&mut self) {
    if let Some(waker) = self.waker.take() {
      waker.wake();
    }
  }
}

/// A `Stream` of a publisher's values.
///
/// Yields `Ok` for each value and `Err` for a failure; ends after the
/// publisher completes. Dropping the stream cancels the subscription.
pub struct IntoStream<Item, Err> {
  state: Rc<RefCell<StreamState<Item, Err>>>,
}

impl<Item: 'static, Err: 'static> IntoStream<Item, Err> {
  pub fn new<P>(publisher: &P) -> Self
  where
    P: Publisher<Output = Item, Failure = Err> + ?Sized,
  {
    let state = Rc::new(RefCell::new(StreamState::default()));
    publisher.receive(StreamSubscriber { state: state.clone() });
    IntoStream { state }
  }
}

impl<Item, Err> IntoStream<Item, Err> {
  fn pop(&self) -> Option<Poll<Option<Result<Item, Err>>>> {
    let mut state = self.state.borrow_mut();
    if let Some(item) = state.queue.pop_front() {
      return Some(Poll::Ready(Some(item)));
    }
    state.is_closed.then_some(Poll::Ready(None))
  }
}

impl<Item, Err> Stream for IntoStream<Item, Err> {
  type Item = Result<Item, Err>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    if let Some(ready) = self.pop() {
      return ready;
    }

    let subscription = {
      let mut state = self.state.borrow_mut();
      state.waker = Some(cx.waker().clone());
      if state.requested {
        None
      } else {
        state.subscription.clone()
      }
    };
    // A synchronous publisher delivers right here, so no borrow may be held.
    if let Some(subscription) = subscription {
      self.state.borrow_mut().requested = true;
      subscription.request(Demand::max(1));
    }

    self.pop().unwrap_or(Poll::Pending)
  }
}

impl<Item, Err> Drop for IntoStream<Item, Err> {
  fn drop(&mut self) {
    let subscription = self.state.borrow_mut().subscription.take();
    if let Some(subscription) = subscription {
      trace!("stream dropped, cancelling");
      subscription.cancel();
    }
  }
}

struct StreamSubscriber<Item, Err> {
  state: Rc<RefCell<StreamState<Item, Err>>>,
}

impl<Item, Err> Subscriber<Item, Err> for StreamSubscriber<Item, Err> {
  fn receive_subscription(&mut self, subscription: AnySubscription) {
    let refused = {
      let mut state = self.state.borrow_mut();
      if state.is_closed || state.subscription.is_some() {
        true
      } else {
        state.subscription = Some(subscription.clone());
        false
      }
    };
    if refused {
      subscription.cancel();
    } else {
      // A poll may already be waiting for a value.
      self.state.borrow_mut().wake();
    }
  }

  fn receive(&mut self, value: Item) -> Demand {
    let mut state = self.state.borrow_mut();
    state.queue.push_back(Ok(value));
    state.requested = false;
    state.wake();
    Demand::none()
  }

  fn receive_completion(&mut self, completion: Completion<Err>) {
    let subscription = {
      let mut state = self.state.borrow_mut();
      if let Completion::Failure(err) = completion {
        state.queue.push_back(Err(err));
      }
      state.is_closed = true;
      state.wake();
      state.subscription.take()
    };
    drop(subscription);
  }
}

#[cfg(test)]
mod tests {
  use futures::{FutureExt, StreamExt};

  use crate::prelude::*;

  #[rxfuse_macro::test]
  async fn one_value_per_poll() {
    let subject = Subject::<i32, String>::new();
    let mut stream = subject.into_stream();
    assert!(stream.next().now_or_never().is_none());

    subject.next(1);
    subject.next(2);
    assert_eq!(stream.next().await, Some(Ok(1)));

    subject.complete();
    assert_eq!(stream.next().await, None);
  }

  #[rxfuse_macro::test]
  async fn failure_is_yielded_then_ends() {
    let subject = Subject::<i32, String>::new();
    let mut stream = subject.into_stream();
    subject.error("lost".to_owned());
    assert_eq!(stream.next().await, Some(Err("lost".to_owned())));
    assert_eq!(stream.next().await, None);
  }

  #[rxfuse_macro::test]
  async fn collects_alongside_a_producer() {
    let subject = Subject::<i32, String>::new();
    let stream = subject.into_stream();
    let producer = async {
      for v in 1..=3 {
        subject.next(v);
        tokio::task::yield_now().await;
      }
      subject.complete();
    };

    let (collected, ()) = futures::join!(stream.collect::<Vec<_>>(), producer);
    assert_eq!(collected, vec![Ok(1), Ok(2), Ok(3)]);
  }

  #[rxfuse_macro::test]
  fn dropping_the_stream_cancels() {
    let subject = Subject::<i32, String>::new();
    let stream = subject.into_stream();
    assert_eq!(subject.subscriber_count(), 1);
    drop(stream);
    assert_eq!(subject.subscriber_count(), 0);
  }

  #[rxfuse_macro::test]
  async fn fused_stream_goes_quiet_when_handle_drops() {
    let subject = Subject::<i32, String>::new();
    let slot = std::rc::Rc::new(std::cell::RefCell::new(None));
    let c_slot = slot.clone();
    let fuse = subject.clone().fuse(move |h| *c_slot.borrow_mut() = Some(h), |_| {});
    let mut stream = fuse.into_stream();
    assert!(stream.next().now_or_never().is_none());

    subject.next(1);
    assert_eq!(stream.next().await, Some(Ok(1)));

    slot.borrow_mut().take();
    subject.next(2);
    assert!(stream.next().now_or_never().is_none());
    assert_eq!(subject.subscriber_count(), 0);
  }
}
