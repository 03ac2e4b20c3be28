//! Subscriber trait and implementations
//!
//! A subscriber is the consumer side of the publisher protocol: it is handed a
//! subscription first, then receives values (answering each with additional
//! demand) and at most one terminal [`Completion`].

use crate::{demand::Demand, subscription::AnySubscription};

/// The terminal signal of a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion<Err> {
  /// The publisher finished normally.
  Finished,
  /// The publisher failed. The error is passed on untouched.
  Failure(Err),
}

impl<Err> Completion<Err> {
  #[inline]
  pub fn is_failure(&self) -> bool { matches!(self, Completion::Failure(_)) }

  /// Convert into a `Result`, `Ok(())` for [`Completion::Finished`].
  pub fn into_result(self) -> Result<(), Err> {
    match self {
      Completion::Finished => Ok(()),
      Completion::Failure(err) => Err(err),
    }
  }
}

/// Subscriber trait: the consumer of a publisher.
pub trait Subscriber<Item, Err> {
  /// Called once, before any value, with the handle used to request values
  /// and to cancel.
  fn receive_subscription(&mut self, subscription: AnySubscription);

  /// Receive one value. The returned demand is added to what the subscriber
  /// already asked for.
  fn receive(&mut self, value: Item) -> Demand;

  /// Receive the terminal signal. Nothing follows it.
  fn receive_completion(&mut self, completion: Completion<Err>);
}

/// Boxed subscriber (single-threaded, no Send bound)
pub type BoxedSubscriber<'a, Item, Err> = Box<dyn Subscriber<Item, Err> + 'a>;

impl<S, Item, Err> Subscriber<Item, Err> for Box<S>
where
  S: Subscriber<Item, Err> + ?Sized,
{
  #[inline]
  fn receive_subscription(&mut self, subscription: AnySubscription) {
    (**self).receive_subscription(subscription)
  }

  #[inline]
  fn receive(&mut self, value: Item) -> Demand { (**self).receive(value) }

  #[inline]
  fn receive_completion(&mut self, completion: Completion<Err>) {
    (**self).receive_completion(completion)
  }
}
