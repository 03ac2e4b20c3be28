//! Fuse operator
//!
//! A [`Fuse`] wraps an upstream publisher and ties every subscription made
//! through it to one external cancellation handle. The handle is created by
//! the fuse and given away at construction; cancelling or dropping it cancels
//! all live subscriptions and makes the fuse refuse new ones.
//!
//! # Ownership
//!
//! ```text
//!  holder ──owns──▶ AnyCancellable ─ ─weak─ ─▶ FuseCore ◀──owns── Fuse (caller)
//!                                                 ▲  │
//!                                          owns   │  │ weak (Registry)
//!                                                 │  ▼
//!  downstream ──owns──▶ AnySubscription ──▶ FusedSubscription ──owns──▶ upstream handle
//! ```
//!
//! The fuse is kept alive by the caller's own `Fuse` clones and by each live
//! [`FusedSubscription`]; the external handle and the registry only observe.
//! When the last owner lets go, the fuse cancels whatever is left and asks
//! its storage to forget the external handle.

mod fused_subscription;

use std::{
  cell::{Cell, RefCell},
  fmt::{Debug, Formatter},
  rc::Rc,
};

pub use fused_subscription::FusedSubscription;
use once_cell::unsync::OnceCell;
use tracing::{debug, trace};

use crate::{
  publisher::Publisher,
  registry::Registry,
  subscriber::Subscriber,
  subscription::{AnyCancellable, Cancellable, WeakCancellable},
  weak_ref::{Identity, WeakRef},
};

type RemoveHandle = Box<dyn FnOnce(Identity)>;

/// A publisher whose subscriptions die with an external cancellation handle.
///
/// Cloning a `Fuse` shares it; every clone keeps it alive.
pub struct Fuse<P: Publisher>(Rc<FuseCore<P>>);

pub(crate) struct FuseCore<P: Publisher> {
  identity: Identity,
  upstream: P,
  live: RefCell<Registry<FusedSubscription<P>>>,
  cancelled: Cell<bool>,
  handle: OnceCell<WeakCancellable>,
  remove: Cell<Option<RemoveHandle>>,
}

impl<P: Publisher + 'static> Fuse<P> {
  /// Wrap `upstream`, hand a fresh cancellation handle to `store`, and keep
  /// `remove` to call with that handle's identity when this fuse goes away.
  pub fn new<S, R>(upstream: P, store: S, remove: R) -> Self
  where
    S: FnOnce(AnyCancellable),
    R: FnOnce(Identity) + 'static,
  {
    let core = Rc::new(FuseCore {
      identity: Identity::next(),
      upstream,
      live: RefCell::new(Registry::new()),
      cancelled: Cell::new(false),
      handle: OnceCell::new(),
      remove: Cell::new(Some(Box::new(remove))),
    });

    // The core exists before its handle does; bind the handle afterwards.
    let handle = AnyCancellable::from_cancellable(WeakRef::new(&core));
    let _ = core.handle.set(handle.downgrade());
    debug!(fuse = ?core.identity, handle = ?handle.identity(), "fuse created");

    store(handle);
    Fuse(core)
  }
}

impl<P: Publisher> Fuse<P> {
  /// Whether this fuse has been cancelled and now rejects subscribers.
  #[inline]
  pub fn is_cancelled(&self) -> bool { self.0.cancelled.get() }

  /// Number of subscriptions currently bridged to the upstream.
  pub fn live_count(&self) -> usize { self.0.live.borrow().live().count() }

  /// The identity of the cancellation handle this fuse gave away.
  pub fn handle_identity(&self) -> Option<Identity> {
    self.0.handle.get().map(WeakCancellable::identity)
  }

  /// The wrapped publisher.
  #[inline]
  pub fn upstream(&self) -> &P { &self.0.upstream }
}

impl<P: Publisher> Clone for Fuse<P> {
  fn clone(&self) -> Self { Fuse(self.0.clone()) }
}

impl<P: Publisher> Cancellable for Fuse<P> {
  #[inline]
  fn cancel(&self) { self.0.cancel() }
}

impl<P> Publisher for Fuse<P>
where
  P: Publisher + 'static,
  P::Output: 'static,
  P::Failure: 'static,
{
  type Output = P::Output;
  type Failure = P::Failure;

  fn receive<S>(&self, subscriber: S)
  where
    S: Subscriber<Self::Output, Self::Failure> + 'static,
  {
    if self.0.cancelled.get() {
      trace!(fuse = ?self.0.identity, "subscriber rejected, fuse cancelled");
      return;
    }

    let subscription = FusedSubscription::new(self.clone(), Box::new(subscriber));
    let id = self.0.live.borrow_mut().insert(WeakRef::new(&subscription));
    let core = Rc::downgrade(&self.0);
    subscription.bind_teardown(move || {
      if let Some(core) = core.upgrade() {
        core.live.borrow_mut().remove(id);
        trace!(fuse = ?core.identity, subscription = ?id, "subscription torn down");
      }
    });
    trace!(fuse = ?self.0.identity, subscription = ?id, "subscription registered");

    // Downstream first: demand it asks for right away waits in `pending`
    // until the upstream hands over its own subscription.
    subscription.deliver_subscription();
    subscription.subscribe_upstream(&self.0.upstream);
  }
}

impl<P: Publisher> Cancellable for FuseCore<P> {
  fn cancel(&self) {
    if self.cancelled.replace(true) {
      return;
    }
    // Cancelling tears subscriptions down, and teardown reaches back into
    // `live`; work on a detached copy.
    let mut live = self.live.borrow_mut().take();
    let cancelled = live.cancel_all();
    debug!(fuse = ?self.identity, cancelled, "fuse cancelled");
  }
}

impl<P: Publisher> Drop for FuseCore<P> {
  fn drop(&mut self) {
    self.cancel();
    let Some(handle) = self.handle.get().filter(|h| h.is_alive()) else {
      return;
    };
    if let Some(remove) = self.remove.take() {
      remove(handle.identity());
      debug!(fuse = ?self.identity, handle = ?handle.identity(), "handle detached");
    }
  }
}

impl<P: Publisher> Debug for Fuse<P> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Fuse")
      .field("identity", &self.0.identity)
      .field("is_cancelled", &self.is_cancelled())
      .field("live_count", &self.live_count())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::RefCell, convert::Infallible, rc::Rc};

  use super::*;
  use crate::prelude::*;

  type Slot = Rc<RefCell<Option<AnyCancellable>>>;

  fn fused(subject: &Subject<i32, Infallible>) -> (Fuse<Subject<i32, Infallible>>, Slot) {
    let slot: Slot = Rc::default();
    let c_slot = slot.clone();
    let fuse = subject.clone().fuse(move |h| *c_slot.borrow_mut() = Some(h), |_| {});
    (fuse, slot)
  }

  fn recorder() -> (Rc<RefCell<Vec<i32>>>, impl FnMut(i32)) {
    let seen = Rc::new(RefCell::new(vec![]));
    let c_seen = seen.clone();
    (seen, move |v| c_seen.borrow_mut().push(v))
  }

  #[rxfuse_macro::test]
  fn forwards_values() {
    let subject = Subject::default();
    let (fuse, _slot) = fused(&subject);
    let (seen, on_value) = recorder();
    let _sub = fuse.sink(on_value);

    subject.next(1);
    subject.next(2);
    assert_eq!(*seen.borrow(), vec![1, 2]);
    assert_eq!(fuse.live_count(), 1);
  }

  #[rxfuse_macro::test]
  fn cancel_stops_delivery_and_rejects() {
    let subject = Subject::default();
    let (fuse, _slot) = fused(&subject);
    let (seen, on_value) = recorder();
    let _sub = fuse.sink(on_value);

    subject.next(1);
    fuse.cancel();
    subject.next(2);
    assert_eq!(*seen.borrow(), vec![1]);
    assert!(fuse.is_cancelled());
    assert_eq!(fuse.live_count(), 0);
    assert_eq!(subject.subscriber_count(), 0);

    let (late, on_value) = recorder();
    let _late = fuse.sink(on_value);
    subject.next(3);
    assert!(late.borrow().is_empty());
    assert_eq!(subject.subscriber_count(), 0);
  }

  #[rxfuse_macro::test]
  fn dropping_handle_cancels() {
    let subject = Subject::default();
    let (fuse, slot) = fused(&subject);
    let (seen, on_value) = recorder();
    let _sub = fuse.sink(on_value);

    slot.borrow_mut().take();
    subject.next(1);
    assert!(seen.borrow().is_empty());
    assert!(fuse.is_cancelled());
  }

  #[rxfuse_macro::test]
  fn handle_dropped_by_store_cancels_at_birth() {
    let subject = Subject::<i32, Infallible>::default();
    let fuse = subject.clone().fuse(drop, |_| {});
    assert!(fuse.is_cancelled());
  }

  #[rxfuse_macro::test]
  fn cancel_is_idempotent() {
    let subject = Subject::default();
    let (fuse, slot) = fused(&subject);
    let _sub = fuse.sink(|_| {});
    fuse.cancel();
    fuse.cancel();
    if let Some(handle) = slot.borrow().as_ref() {
      handle.cancel();
    }
    assert!(fuse.is_cancelled());
    assert_eq!(fuse.live_count(), 0);
  }

  #[rxfuse_macro::test]
  fn drop_detaches_live_handle() {
    let subject = Subject::<i32, Infallible>::default();
    let removed = Rc::new(RefCell::new(vec![]));
    let c_removed = removed.clone();
    let slot: Slot = Rc::default();
    let c_slot = slot.clone();
    let fuse = subject.fuse(
      move |h| *c_slot.borrow_mut() = Some(h),
      move |id| c_removed.borrow_mut().push(id),
    );
    let id = fuse.handle_identity();
    assert_eq!(slot.borrow().as_ref().map(AnyCancellable::identity), id);

    drop(fuse);
    assert_eq!(removed.borrow().first().copied(), id);
  }

  #[rxfuse_macro::test]
  fn drop_skips_remove_when_handle_gone() {
    let subject = Subject::<i32, Infallible>::default();
    let removed = Rc::new(RefCell::new(0));
    let c_removed = removed.clone();
    let fuse = subject.fuse(drop, move |_| *c_removed.borrow_mut() += 1);
    drop(fuse);
    assert_eq!(*removed.borrow(), 0);
  }
}
