//! Closure-driven subscriber with unlimited demand.

use std::{
  cell::{Cell, RefCell},
  rc::Rc,
};

use crate::{
  demand::Demand,
  subscriber::{Completion, Subscriber},
  subscription::{AnySubscription, Cancellable, Subscription},
};

type OnValue<Item> = Box<dyn FnMut(Item)>;
type OnCompletion<Err> = Box<dyn FnOnce(Completion<Err>)>;

/// A subscriber that requests everything and hands each value to a closure.
///
/// A `Sink` is shared: the publisher holds one clone as its subscriber and
/// the caller cancels through another (usually wrapped in an
/// [`AnyCancellable`](crate::subscription::AnyCancellable)). Cancelling drops
/// both closures.
pub struct Sink<Item, Err> {
  state: Rc<SinkState<Item, Err>>,
}

struct SinkState<Item, Err> {
  subscription: RefCell<Option<AnySubscription>>,
  on_value: RefCell<Option<OnValue<Item>>>,
  on_completion: RefCell<Option<OnCompletion<Err>>>,
  closed: Cell<bool>,
}

impl<Item, Err> Sink<Item, Err> {
  pub fn new<C, F>(on_completion: C, on_value: F) -> Self
  where
    C: FnOnce(Completion<Err>) + 'static,
    F: FnMut(Item) + 'static,
  {
    Sink {
      state: Rc::new(SinkState {
        subscription: RefCell::new(None),
        on_value: RefCell::new(Some(Box::new(on_value))),
        on_completion: RefCell::new(Some(Box::new(on_completion))),
        closed: Cell::new(false),
      }),
    }
  }

  #[inline]
  pub fn is_closed(&self) -> bool { self.state.closed.get() }
}

impl<Item, Err> Clone for Sink<Item, Err> {
  fn clone(&self) -> Self { Sink { state: self.state.clone() } }
}

impl<Item, Err> Subscriber<Item, Err> for Sink<Item, Err> {
  fn receive_subscription(&mut self, subscription: AnySubscription) {
    if self.state.closed.get() || self.state.subscription.borrow().is_some() {
      subscription.cancel();
      return;
    }
    *self.state.subscription.borrow_mut() = Some(subscription.clone());
    subscription.request(Demand::unlimited());
  }

  fn receive(&mut self, value: Item) -> Demand {
    let on_value = self.state.on_value.borrow_mut().take();
    if let Some(mut on_value) = on_value {
      on_value(value);
      if !self.state.closed.get() {
        *self.state.on_value.borrow_mut() = Some(on_value);
      }
    }
    Demand::none()
  }

  fn receive_completion(&mut self, completion: Completion<Err>) {
    if self.state.closed.replace(true) {
      return;
    }
    // The publisher is done with us; let go without cancelling it.
    let subscription = self.state.subscription.borrow_mut().take();
    drop(subscription);
    let on_value = self.state.on_value.borrow_mut().take();
    drop(on_value);
    let on_completion = self.state.on_completion.borrow_mut().take();
    if let Some(on_completion) = on_completion {
      on_completion(completion);
    }
  }
}

impl<Item, Err> Cancellable for Sink<Item, Err> {
  fn cancel(&self) {
    if self.state.closed.replace(true) {
      return;
    }
    let subscription = self.state.subscription.borrow_mut().take();
    let on_value = self.state.on_value.borrow_mut().take();
    let on_completion = self.state.on_completion.borrow_mut().take();
    drop((on_value, on_completion));
    if let Some(subscription) = subscription {
      subscription.cancel();
    }
  }
}
