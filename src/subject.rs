//! A passthrough publisher driven by hand.
//!
//! [`Subject`] forwards each value to every subscriber that has demand for
//! it at that moment; subscribers without demand miss the value. After
//! `complete` or `error` the completion is remembered and handed to anyone
//! who subscribes later.

use std::{
  cell::{Cell, RefCell},
  fmt::{Debug, Formatter},
  ptr,
  rc::{Rc, Weak},
};

use smallvec::SmallVec;
use tracing::trace;

use crate::{
  demand::Demand,
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Completion, Subscriber},
  subscription::{AnySubscription, Cancellable, Subscription},
};

type Conduits<Item, Err> = SmallVec<[Rc<Conduit<Item, Err>>; 2]>;

/// A hand-driven, multicasting publisher.
///
/// Cloning shares the same subject.
pub struct Subject<Item, Err> {
  core: Rc<SubjectCore<Item, Err>>,
}

struct SubjectCore<Item, Err> {
  conduits: RefCell<Conduits<Item, Err>>,
  completion: RefCell<Option<Completion<Err>>>,
}

impl<Item, Err> Subject<Item, Err> {
  pub fn new() -> Self {
    Subject {
      core: Rc::new(SubjectCore {
        conduits: RefCell::new(SmallVec::new()),
        completion: RefCell::new(None),
      }),
    }
  }

  /// Number of subscribers currently attached.
  pub fn subscriber_count(&self) -> usize { self.core.conduits.borrow().len() }

  /// Whether `complete` or `error` has been called.
  pub fn is_finished(&self) -> bool { self.core.completion.borrow().is_some() }

  /// Subscribers are called without any borrow of the subject held, so
  /// they can subscribe or cancel from inside a callback.
  fn snapshot(&self) -> Conduits<Item, Err> { self.core.conduits.borrow().clone() }
}

impl<Item: Clone, Err: Clone> Subject<Item, Err> {
  /// Send `value` to every subscriber with outstanding demand.
  pub fn next(&self, value: Item) {
    if self.is_finished() {
      return;
    }
    let ready: Conduits<Item, Err> = self
      .snapshot()
      .into_iter()
      .filter(|c| c.has_demand())
      .collect();

    let mut iter = ready.iter().peekable();
    while let Some(conduit) = iter.next() {
      if iter.peek().is_some() {
        conduit.deliver(value.clone());
      } else {
        conduit.deliver(value);
        break;
      }
    }
  }

  /// Fail every subscriber with `err`.
  pub fn error(&self, err: Err) { self.finish(Completion::Failure(err)) }

  /// Finish every subscriber normally.
  pub fn complete(&self) { self.finish(Completion::Finished) }

  fn finish(&self, completion: Completion<Err>) {
    {
      let mut stored = self.core.completion.borrow_mut();
      if stored.is_some() {
        return;
      }
      *stored = Some(completion.clone());
    }
    let conduits = std::mem::take(&mut *self.core.conduits.borrow_mut());
    trace!(subscribers = conduits.len(), failure = completion.is_failure(), "subject finished");

    let mut iter = conduits.iter().peekable();
    while let Some(conduit) = iter.next() {
      if iter.peek().is_some() {
        conduit.finish(completion.clone());
      } else {
        conduit.finish(completion);
        break;
      }
    }
  }
}

impl<Item, Err> Publisher for Subject<Item, Err>
where
  Item: Clone + 'static,
  Err: Clone + 'static,
{
  type Output = Item;
  type Failure = Err;

  fn receive<S>(&self, subscriber: S)
  where
    S: Subscriber<Item, Err> + 'static,
  {
    let conduit = Rc::new(Conduit {
      subject: Rc::downgrade(&self.core),
      subscriber: RefCell::new(Some(Box::new(subscriber))),
      demand: Cell::new(Demand::none()),
      cancelled: Cell::new(false),
      stashed: RefCell::new(None),
    });

    let completion = self.core.completion.borrow().clone();
    if completion.is_none() {
      self.core.conduits.borrow_mut().push(conduit.clone());
    }
    conduit.deliver_subscription(AnySubscription::from_rc(conduit.clone()));
    if let Some(completion) = completion {
      conduit.finish(completion);
    }
  }
}

impl<Item, Err> Clone for Subject<Item, Err> {
  fn clone(&self) -> Self { Subject { core: self.core.clone() } }
}

impl<Item, Err> Default for Subject<Item, Err> {
  fn default() -> Self { Self::new() }
}

impl<Item, Err> Debug for Subject<Item, Err> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subject")
      .field("subscriber_count", &self.subscriber_count())
      .field("is_finished", &self.is_finished())
      .finish()
  }
}

// ============================================================================
// Conduit
// ============================================================================

/// One subscriber's connection to a subject; also its subscription.
struct Conduit<Item, Err> {
  subject: Weak<SubjectCore<Item, Err>>,
  subscriber: RefCell<Option<BoxedSubscriber<'static, Item, Err>>>,
  demand: Cell<Demand>,
  cancelled: Cell<bool>,
  // Completion that arrived while the subscriber was out receiving a value.
  stashed: RefCell<Option<Completion<Err>>>,
}

impl<Item, Err> Conduit<Item, Err> {
  fn has_demand(&self) -> bool { !self.cancelled.get() && !self.demand.get().is_none() }

  fn deliver_subscription(&self, subscription: AnySubscription) {
    let Some(mut subscriber) = self.subscriber.borrow_mut().take() else {
      return;
    };
    subscriber.receive_subscription(subscription);
    self.restore(subscriber);
  }

  fn deliver(&self, value: Item) {
    let mut demand = self.demand.get();
    if self.cancelled.get() || !demand.decrement() {
      return;
    }
    let Some(mut subscriber) = self.subscriber.borrow_mut().take() else {
      return;
    };
    self.demand.set(demand);
    let more = subscriber.receive(value);
    if !self.cancelled.get() {
      self.demand.set(self.demand.get() + more);
    }
    self.restore(subscriber);
  }

  /// Put the subscriber back, or finish it off if the conduit was closed
  /// while it was out.
  fn restore(&self, mut subscriber: BoxedSubscriber<'static, Item, Err>) {
    let stashed = self.stashed.borrow_mut().take();
    if let Some(completion) = stashed {
      subscriber.receive_completion(completion);
    } else if !self.cancelled.get() {
      *self.subscriber.borrow_mut() = Some(subscriber);
    }
  }

  fn finish(&self, completion: Completion<Err>) {
    if self.cancelled.replace(true) {
      return;
    }
    let subscriber = self.subscriber.borrow_mut().take();
    match subscriber {
      Some(mut subscriber) => subscriber.receive_completion(completion),
      None => *self.stashed.borrow_mut() = Some(completion),
    }
  }
}

impl<Item, Err> Cancellable for Conduit<Item, Err> {
  fn cancel(&self) {
    if self.cancelled.replace(true) {
      return;
    }
    self.stashed.borrow_mut().take();
    if let Some(subject) = self.subject.upgrade() {
      if let Ok(mut conduits) = subject.conduits.try_borrow_mut() {
        conduits.retain(|c| !ptr::eq(Rc::as_ptr(c), self));
      }
    }
    let subscriber = self.subscriber.borrow_mut().take();
    drop(subscriber);
    trace!("subject subscriber cancelled");
  }
}

impl<Item, Err> Subscription for Conduit<Item, Err> {
  fn request(&self, demand: Demand) {
    if !self.cancelled.get() {
      self.demand.set(self.demand.get() + demand);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::prelude::*;

  #[derive(Default)]
  struct Log {
    subscription: Option<AnySubscription>,
    values: Vec<i32>,
    completion: Option<Completion<String>>,
  }

  struct Recorder {
    log: Rc<RefCell<Log>>,
    initial: Demand,
    per_value: Demand,
  }

  impl Subscriber<i32, String> for Recorder {
    fn receive_subscription(&mut self, subscription: AnySubscription) {
      subscription.request(self.initial);
      self.log.borrow_mut().subscription = Some(subscription);
    }

    fn receive(&mut self, value: i32) -> Demand {
      self.log.borrow_mut().values.push(value);
      self.per_value
    }

    fn receive_completion(&mut self, completion: Completion<String>) {
      self.log.borrow_mut().completion = Some(completion);
    }
  }

  fn attach(subject: &Subject<i32, String>, initial: Demand, per_value: Demand) -> Rc<RefCell<Log>> {
    let log = Rc::new(RefCell::new(Log::default()));
    subject.receive(Recorder { log: log.clone(), initial, per_value });
    log
  }

  #[rxfuse_macro::test]
  fn values_honour_demand() {
    let subject = Subject::new();
    let bounded = attach(&subject, Demand::max(2), Demand::none());
    let topped_up = attach(&subject, Demand::max(1), Demand::max(1));
    let idle = attach(&subject, Demand::none(), Demand::none());

    for v in 1..=4 {
      subject.next(v);
    }
    assert_eq!(bounded.borrow().values, vec![1, 2]);
    assert_eq!(topped_up.borrow().values, vec![1, 2, 3, 4]);
    assert!(idle.borrow().values.is_empty());
    assert_eq!(subject.subscriber_count(), 3);
  }

  #[rxfuse_macro::test]
  fn completion_reaches_everyone_once() {
    let subject = Subject::new();
    let a = attach(&subject, Demand::unlimited(), Demand::none());
    let b = attach(&subject, Demand::none(), Demand::none());

    subject.error("boom".to_owned());
    subject.complete();
    subject.next(1);
    assert_eq!(a.borrow().completion, Some(Completion::Failure("boom".to_owned())));
    assert_eq!(b.borrow().completion, Some(Completion::Failure("boom".to_owned())));
    assert!(a.borrow().values.is_empty());
    assert_eq!(subject.subscriber_count(), 0);
  }

  #[rxfuse_macro::test]
  fn late_subscriber_gets_stored_completion() {
    let subject = Subject::<i32, String>::new();
    subject.complete();
    let late = attach(&subject, Demand::unlimited(), Demand::none());
    assert!(late.borrow().subscription.is_some());
    assert_eq!(late.borrow().completion, Some(Completion::Finished));
    assert_eq!(subject.subscriber_count(), 0);
  }

  #[rxfuse_macro::test]
  fn cancel_detaches() {
    let subject = Subject::new();
    let log = attach(&subject, Demand::unlimited(), Demand::none());
    subject.next(1);

    let subscription = log.borrow_mut().subscription.take();
    if let Some(subscription) = subscription {
      subscription.cancel();
      subscription.request(Demand::max(1));
    }
    subject.next(2);
    assert_eq!(log.borrow().values, vec![1]);
    assert_eq!(subject.subscriber_count(), 0);
  }

  #[rxfuse_macro::test]
  fn completion_from_inside_value_callback() {
    let subject = Subject::<i32, String>::new();
    let c_subject = subject.clone();
    let done = Rc::new(Cell::new(false));
    let c_done = done.clone();
    let _sub = subject.sink_completion(
      move |_| c_done.set(true),
      move |v| {
        if v == 1 {
          c_subject.complete();
        }
      },
    );

    subject.next(1);
    assert!(done.get());
    assert_eq!(subject.subscriber_count(), 0);
  }
}
