//! Publisher trait and the extension methods every publisher gets.

use std::{cell::RefCell, collections::HashSet, hash::BuildHasher, rc::Rc};

use crate::{
  fuse::Fuse,
  sink::Sink,
  store::held_by,
  subscriber::{Completion, Subscriber},
  subscription::AnyCancellable,
  weak_ref::Identity,
};

/// A source of values that any number of subscribers can attach to.
///
/// Every call to `receive` must hand the subscriber a subscription (now or
/// later) through [`Subscriber::receive_subscription`], then deliver at most
/// as many values as were requested, then at most one completion. Delivery
/// to one subscriber is serialized: `receive` is never re-entered for the
/// same subscriber.
pub trait Publisher {
  type Output;
  type Failure;

  fn receive<S>(&self, subscriber: S)
  where
    S: Subscriber<Self::Output, Self::Failure> + 'static;
}

impl<P: Publisher + ?Sized> Publisher for Rc<P> {
  type Output = P::Output;
  type Failure = P::Failure;

  #[inline]
  fn receive<S>(&self, subscriber: S)
  where
    S: Subscriber<Self::Output, Self::Failure> + 'static,
  {
    (**self).receive(subscriber)
  }
}

pub trait PublisherExt: Publisher + Sized {
  /// Fuse this publisher to a cancellation handle.
  ///
  /// `store` receives the handle immediately and should keep it wherever its
  /// lifetime should govern the stream. When that handle is cancelled or
  /// dropped, every subscription made through the returned [`Fuse`] is
  /// cancelled and no new ones are accepted. When the `Fuse` itself goes away
  /// while the handle is still alive, `remove` is called with the handle's
  /// identity so the storage can let go of it.
  ///
  /// # Example
  ///
  /// ```rust
  /// use std::{cell::RefCell, rc::Rc};
  ///
  /// use rxfuse::prelude::*;
  ///
  /// let subject = Subject::<i32, ()>::default();
  /// let slot: Rc<RefCell<Option<AnyCancellable>>> = Rc::default();
  /// let store = slot.clone();
  /// let fuse = subject.clone().fuse(move |h| *store.borrow_mut() = Some(h), |_| {});
  ///
  /// let seen = Rc::new(RefCell::new(vec![]));
  /// let c_seen = seen.clone();
  /// let _sub = fuse.sink(move |v| c_seen.borrow_mut().push(v));
  ///
  /// subject.next(1);
  /// slot.borrow_mut().take();
  /// subject.next(2);
  /// assert_eq!(*seen.borrow(), vec![1]);
  /// ```
  fn fuse<S, R>(self, store: S, remove: R) -> Fuse<Self>
  where
    Self: 'static,
    S: FnOnce(AnyCancellable),
    R: FnOnce(Identity) + 'static,
  {
    Fuse::new(self, store, remove)
  }

  /// Fuse this publisher to a handle kept in a collection field of `holder`.
  ///
  /// `field` picks the collection out of the holder. The holder is only held
  /// weakly afterwards; the handle is taken out of the collection again when
  /// the fuse goes away.
  ///
  /// # Panics
  ///
  /// If `holder` is already borrowed when this is called.
  fn fuse_on_collection<H, F, B>(self, holder: &Rc<RefCell<H>>, field: F) -> Fuse<Self>
  where
    Self: 'static,
    H: 'static,
    F: Fn(&mut H) -> &mut HashSet<AnyCancellable, B> + Clone + 'static,
    B: BuildHasher + 'static,
  {
    let (store, remove) = held_by(holder, field);
    Fuse::new(self, store, remove)
  }

  /// Fuse this publisher to a handle kept in an optional slot of `holder`.
  ///
  /// Storing replaces (and so cancels) whatever the slot held before. When
  /// the fuse goes away the slot is cleared only if it still holds this
  /// fuse's handle.
  ///
  /// # Panics
  ///
  /// If `holder` is already borrowed when this is called.
  fn fuse_on_slot<H, F>(self, holder: &Rc<RefCell<H>>, field: F) -> Fuse<Self>
  where
    Self: 'static,
    H: 'static,
    F: Fn(&mut H) -> &mut Option<AnyCancellable> + Clone + 'static,
  {
    let (store, remove) = held_by(holder, field);
    Fuse::new(self, store, remove)
  }

  /// Subscribe with a value closure, ignoring completion.
  ///
  /// The subscription lives as long as the returned handle.
  fn sink<F>(&self, on_value: F) -> AnyCancellable
  where
    Self::Output: 'static,
    Self::Failure: 'static,
    F: FnMut(Self::Output) + 'static,
  {
    self.sink_completion(|_| {}, on_value)
  }

  /// Subscribe with a completion closure and a value closure.
  ///
  /// The subscription lives as long as the returned handle.
  fn sink_completion<C, F>(&self, on_completion: C, on_value: F) -> AnyCancellable
  where
    Self::Output: 'static,
    Self::Failure: 'static,
    C: FnOnce(Completion<Self::Failure>) + 'static,
    F: FnMut(Self::Output) + 'static,
  {
    let sink = Sink::new(on_completion, on_value);
    self.receive(sink.clone());
    AnyCancellable::from_cancellable(sink)
  }

  /// Consume this publisher as a `futures::Stream`.
  #[cfg(feature = "stream")]
  fn into_stream(&self) -> crate::into_stream::IntoStream<Self::Output, Self::Failure>
  where
    Self::Output: 'static,
    Self::Failure: 'static,
  {
    crate::into_stream::IntoStream::new(self)
  }
}

impl<P: Publisher> PublisherExt for P {}
