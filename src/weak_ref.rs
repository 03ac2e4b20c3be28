//! Identity-keyed weak references.
//!
//! A [`WeakRef`] observes an `Rc`-owned value without keeping it alive. Its
//! equality and hash come from an [`Identity`] token minted at construction,
//! never from the target, so a handle stays a well-behaved set element even
//! after its target is gone.

use std::{
  fmt::{Debug, Formatter},
  hash::{Hash, Hasher},
  rc::{Rc, Weak},
  sync::atomic::{AtomicU64, Ordering},
};

use crate::subscription::Cancellable;

/// A process-unique token. Two tokens are equal only if one was copied from
/// the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(u64);

impl Identity {
  /// Mint a token that has never been handed out before.
  pub fn next() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    Identity(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

/// A non-owning reference with its own identity.
pub struct WeakRef<T: ?Sized> {
  target: Weak<T>,
  identity: Identity,
}

impl<T: ?Sized> WeakRef<T> {
  pub fn new(target: &Rc<T>) -> Self {
    WeakRef { target: Rc::downgrade(target), identity: Identity::next() }
  }

  #[inline]
  pub fn identity(&self) -> Identity { self.identity }

  /// Try to get a strong reference to the target.
  #[inline]
  pub fn upgrade(&self) -> Option<Rc<T>> { self.target.upgrade() }

  /// Whether the target is still owned by someone.
  #[inline]
  pub fn is_alive(&self) -> bool { self.target.strong_count() > 0 }
}

impl<T: ?Sized> Clone for WeakRef<T> {
  fn clone(&self) -> Self { WeakRef { target: self.target.clone(), identity: self.identity } }
}

impl<T: ?Sized> PartialEq for WeakRef<T> {
  #[inline]
  fn eq(&self, other: &Self) -> bool { self.identity == other.identity }
}

impl<T: ?Sized> Eq for WeakRef<T> {}

impl<T: ?Sized> Hash for WeakRef<T> {
  fn hash<H: Hasher>(&self, state: &mut H) { self.identity.hash(state) }
}

impl<T: ?Sized> Debug for WeakRef<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WeakRef")
      .field("identity", &self.identity)
      .field("alive", &self.is_alive())
      .finish()
  }
}

impl<T: Cancellable + ?Sized> Cancellable for WeakRef<T> {
  fn cancel(&self) {
    if let Some(target) = self.upgrade() {
      target.cancel();
    }
  }
}
