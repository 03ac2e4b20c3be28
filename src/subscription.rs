use std::{
  borrow::Borrow,
  cell::Cell,
  collections::HashSet,
  fmt::{Debug, Formatter},
  hash::{BuildHasher, Hash, Hasher},
  rc::{Rc, Weak},
};

use crate::{demand::Demand, weak_ref::Identity};

/// Something that can be told to stop. Calling `cancel` more than once must be
/// harmless.
pub trait Cancellable {
  fn cancel(&self);
}

/// The handle a publisher gives its subscriber: ask for more values, or stop.
///
/// `request` after `cancel` must be a no-op.
pub trait Subscription: Cancellable {
  fn request(&self, demand: Demand);
}

impl<T: Cancellable + ?Sized> Cancellable for Rc<T> {
  #[inline]
  fn cancel(&self) { (**self).cancel() }
}

impl<T: Subscription + ?Sized> Subscription for Rc<T> {
  #[inline]
  fn request(&self, demand: Demand) { (**self).request(demand) }
}

/// A type-erased, cloneable subscription.
///
/// Cloning shares the same subscription; every clone is a strong reference.
#[derive(Clone)]
pub struct AnySubscription(Rc<dyn Subscription>);

impl AnySubscription {
  #[inline]
  pub fn new(subscription: impl Subscription + 'static) -> Self { AnySubscription(Rc::new(subscription)) }

  /// Wrap an already shared subscription without another allocation.
  #[inline]
  pub fn from_rc(subscription: Rc<dyn Subscription>) -> Self { AnySubscription(subscription) }

  /// Whether two handles point at the same subscription.
  #[inline]
  pub fn ptr_eq(&self, other: &Self) -> bool { Rc::ptr_eq(&self.0, &other.0) }
}

impl Cancellable for AnySubscription {
  #[inline]
  fn cancel(&self) { self.0.cancel() }
}

impl Subscription for AnySubscription {
  #[inline]
  fn request(&self, demand: Demand) { self.0.request(demand) }
}

impl Debug for AnySubscription {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("AnySubscription")
      .field(&Rc::as_ptr(&self.0).cast::<()>())
      .finish()
  }
}

// ============================================================================
// AnyCancellable
// ============================================================================

struct CancelAction {
  identity: Identity,
  action: Cell<Option<Box<dyn FnOnce()>>>,
}

impl CancelAction {
  fn run(&self) {
    if let Some(action) = self.action.take() {
      action();
    }
  }
}

impl Drop for CancelAction {
  fn drop(&mut self) { self.run() }
}

/// A type-erased cancellation handle that cancels when dropped.
///
/// The wrapped action runs at most once: on the first [`cancel`] or, failing
/// that, when the handle is dropped. Equality and hash are by identity, so
/// handles can be kept in a `HashSet` and removed again by their
/// [`Identity`].
///
/// [`cancel`]: Cancellable::cancel
///
/// # Examples
///
/// ```rust
/// use std::{cell::Cell, rc::Rc};
///
/// use rxfuse::prelude::*;
///
/// let hits = Rc::new(Cell::new(0));
/// let c_hits = hits.clone();
/// let handle = AnyCancellable::new(move || c_hits.set(c_hits.get() + 1));
/// handle.cancel();
/// handle.cancel();
/// drop(handle);
/// assert_eq!(hits.get(), 1);
/// ```
#[must_use = "an AnyCancellable cancels as soon as it is dropped"]
pub struct AnyCancellable(Rc<CancelAction>);

impl AnyCancellable {
  pub fn new(action: impl FnOnce() + 'static) -> Self {
    AnyCancellable(Rc::new(CancelAction {
      identity: Identity::next(),
      action: Cell::new(Some(Box::new(action))),
    }))
  }

  /// Erase a cancellable; the handle cancels it once.
  pub fn from_cancellable(cancellable: impl Cancellable + 'static) -> Self {
    Self::new(move || cancellable.cancel())
  }

  #[inline]
  pub fn identity(&self) -> Identity { self.0.identity }

  /// Whether the action has already run.
  pub fn is_cancelled(&self) -> bool {
    let action = self.0.action.take();
    let cancelled = action.is_none();
    self.0.action.set(action);
    cancelled
  }

  /// Keep this handle in `set` until it is removed from it.
  pub fn store_in<S: BuildHasher>(self, set: &mut HashSet<AnyCancellable, S>) {
    set.replace(self);
  }

  /// A non-owning view of this handle.
  pub fn downgrade(&self) -> WeakCancellable {
    WeakCancellable { target: Rc::downgrade(&self.0), identity: self.0.identity }
  }
}

impl Cancellable for AnyCancellable {
  #[inline]
  fn cancel(&self) { self.0.run() }
}

impl PartialEq for AnyCancellable {
  #[inline]
  fn eq(&self, other: &Self) -> bool { self.identity() == other.identity() }
}

impl Eq for AnyCancellable {}

impl Hash for AnyCancellable {
  fn hash<H: Hasher>(&self, state: &mut H) { self.identity().hash(state) }
}

// Lets a `HashSet<AnyCancellable>` be searched by identity alone.
impl Borrow<Identity> for AnyCancellable {
  fn borrow(&self) -> &Identity { &self.0.identity }
}

impl Debug for AnyCancellable {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AnyCancellable")
      .field("identity", &self.identity())
      .field("is_cancelled", &self.is_cancelled())
      .finish()
  }
}

/// A non-owning view of an [`AnyCancellable`].
///
/// It never keeps the handle alive and cannot cancel it; it only remembers
/// which handle it was and whether that handle still has an owner.
#[derive(Clone, Debug)]
pub struct WeakCancellable {
  target: Weak<CancelAction>,
  identity: Identity,
}

impl WeakCancellable {
  #[inline]
  pub fn identity(&self) -> Identity { self.identity }

  /// Whether the handle is still owned by someone.
  #[inline]
  pub fn is_alive(&self) -> bool { self.target.strong_count() > 0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct MockSubscription {
    requested: Rc<Cell<Demand>>,
    cancelled: Rc<Cell<usize>>,
  }

  impl Cancellable for MockSubscription {
    fn cancel(&self) { self.cancelled.set(self.cancelled.get() + 1) }
  }

  impl Subscription for MockSubscription {
    fn request(&self, demand: Demand) { self.requested.set(self.requested.get() + demand) }
  }

  #[rxfuse_macro::test]
  fn any_subscription_shares_target() {
    let requested = Rc::new(Cell::new(Demand::none()));
    let cancelled = Rc::new(Cell::new(0));
    let sub = AnySubscription::new(MockSubscription {
      requested: requested.clone(),
      cancelled: cancelled.clone(),
    });
    let other = sub.clone();
    assert!(sub.ptr_eq(&other));

    sub.request(Demand::max(2));
    other.request(Demand::max(3));
    other.cancel();
    assert_eq!(requested.get(), Demand::max(5));
    assert_eq!(cancelled.get(), 1);
  }

  #[rxfuse_macro::test]
  fn cancels_on_drop() {
    let hits = Rc::new(Cell::new(0));
    let c_hits = hits.clone();
    let handle = AnyCancellable::new(move || c_hits.set(c_hits.get() + 1));
    assert!(!handle.is_cancelled());
    drop(handle);
    assert_eq!(hits.get(), 1);
  }

  #[rxfuse_macro::test]
  fn cancel_runs_once() {
    let hits = Rc::new(Cell::new(0));
    let c_hits = hits.clone();
    let handle = AnyCancellable::new(move || c_hits.set(c_hits.get() + 1));
    handle.cancel();
    assert!(handle.is_cancelled());
    handle.cancel();
    drop(handle);
    assert_eq!(hits.get(), 1);
  }

  #[rxfuse_macro::test]
  fn set_membership_by_identity() {
    let mut set = HashSet::new();
    let handle = AnyCancellable::new(|| {});
    let id = handle.identity();
    handle.store_in(&mut set);
    AnyCancellable::new(|| {}).store_in(&mut set);
    assert_eq!(set.len(), 2);

    let removed = set.take(&id);
    assert_eq!(removed.map(|h| h.identity()), Some(id));
    assert_eq!(set.len(), 1);
  }

  #[rxfuse_macro::test]
  fn weak_view_tracks_owner() {
    let handle = AnyCancellable::new(|| {});
    let weak = handle.downgrade();
    assert_eq!(weak.identity(), handle.identity());
    assert!(weak.is_alive());
    drop(handle);
    assert!(!weak.is_alive());
  }
}
