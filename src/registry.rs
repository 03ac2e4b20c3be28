use smallvec::SmallVec;

use crate::{
  subscription::Cancellable,
  weak_ref::{Identity, WeakRef},
};

/// An arena of weak references keyed by their identity.
///
/// The registry owns nothing: entries are [`WeakRef`]s, so registering a
/// value never extends its life. Entries are removed explicitly by identity,
/// usually by the value itself as it is dropped.
///
/// - **SmallVec Optimization**: Uses `SmallVec<[_; 2]>` to avoid heap
///   allocation for the common case of 0-2 entries.
///
/// # Examples
///
/// ```rust
/// use std::rc::Rc;
///
/// use rxfuse::{registry::Registry, weak_ref::WeakRef};
///
/// let value = Rc::new(42);
/// let mut registry = Registry::default();
/// let id = registry.insert(WeakRef::new(&value));
/// assert_eq!(registry.live().count(), 1);
///
/// drop(value);
/// assert_eq!(registry.live().count(), 0);
/// assert!(registry.remove(id).is_some());
/// assert!(registry.is_empty());
/// ```
pub struct Registry<T: ?Sized> {
  items: SmallVec<[WeakRef<T>; 2]>,
}

impl<T: ?Sized> Default for Registry<T> {
  fn default() -> Self { Self { items: SmallVec::new() } }
}

impl<T: ?Sized> Registry<T> {
  #[inline]
  pub fn new() -> Self { Self::default() }

  /// Register a weak reference and return the identity to remove it with.
  ///
  /// Re-inserting a handle whose identity is already present is a no-op.
  pub fn insert(&mut self, item: WeakRef<T>) -> Identity {
    let id = item.identity();
    if !self.contains(id) {
      self.items.push(item);
    }
    id
  }

  /// Remove an entry by identity.
  pub fn remove(&mut self, id: Identity) -> Option<WeakRef<T>> {
    self
      .items
      .iter()
      .position(|item| item.identity() == id)
      .map(|pos| self.items.remove(pos))
  }

  #[inline]
  pub fn contains(&self, id: Identity) -> bool { self.items.iter().any(|item| item.identity() == id) }

  /// Number of entries, dead or alive.
  #[inline]
  pub fn len(&self) -> usize { self.items.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.items.is_empty() }

  /// Drop entries whose target is gone. Returns how many were removed.
  pub fn prune(&mut self) -> usize {
    let before = self.items.len();
    self.items.retain(|item| item.is_alive());
    before - self.items.len()
  }

  /// Upgrade every entry that still has a target.
  pub fn live(&self) -> impl Iterator<Item = std::rc::Rc<T>> + '_ {
    self.items.iter().filter_map(WeakRef::upgrade)
  }

  /// Move every entry out, leaving the registry empty.
  #[inline]
  pub fn take(&mut self) -> Self { std::mem::take(self) }

  /// Drain all entries.
  #[inline]
  pub fn drain(&mut self) -> impl Iterator<Item = WeakRef<T>> + '_ { self.items.drain(..) }
}

impl<T: Cancellable + ?Sized> Registry<T> {
  /// Cancel every live target and clear the registry.
  ///
  /// Returns the number of targets that were still alive. A target's
  /// cancellation may drop the target. It must not reach back into this
  /// registry, so owners behind a `RefCell` should [`take`](Self::take) it
  /// first and cancel the taken copy.
  pub fn cancel_all(&mut self) -> usize {
    let mut cancelled = 0;
    for item in self.drain() {
      if let Some(target) = item.upgrade() {
        target.cancel();
        cancelled += 1;
      }
    }
    cancelled
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::Cell, rc::Rc};

  use proptest::prelude::*;

  use super::*;

  struct Flag(Cell<bool>);

  impl Cancellable for Flag {
    fn cancel(&self) { self.0.set(true) }
  }

  #[rxfuse_macro::test]
  fn insert_remove() {
    let a = Rc::new(1);
    let b = Rc::new(2);
    let mut registry = Registry::new();
    let id_a = registry.insert(WeakRef::new(&a));
    let id_b = registry.insert(WeakRef::new(&b));
    assert_eq!(registry.len(), 2);

    assert!(registry.remove(id_a).is_some());
    assert!(registry.remove(id_a).is_none());
    assert!(registry.contains(id_b));
    assert_eq!(registry.live().map(|v| *v).collect::<Vec<_>>(), vec![2]);
  }

  #[rxfuse_macro::test]
  fn duplicate_identity_is_ignored() {
    let a = Rc::new(());
    let handle = WeakRef::new(&a);
    let mut registry = Registry::new();
    registry.insert(handle.clone());
    registry.insert(handle);
    assert_eq!(registry.len(), 1);
  }

  #[rxfuse_macro::test]
  fn prune_dead_entries() {
    let a = Rc::new(1);
    let mut registry = Registry::new();
    registry.insert(WeakRef::new(&a));
    {
      let b = Rc::new(2);
      registry.insert(WeakRef::new(&b));
    }
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.prune(), 1);
    assert_eq!(registry.len(), 1);
  }

  #[rxfuse_macro::test]
  fn cancel_all_skips_dead_and_clears() {
    let alive = Rc::new(Flag(Cell::new(false)));
    let mut registry = Registry::new();
    registry.insert(WeakRef::new(&alive));
    registry.insert(WeakRef::new(&Rc::new(Flag(Cell::new(false)))));

    assert_eq!(registry.cancel_all(), 1);
    assert!(alive.0.get());
    assert!(registry.is_empty());
  }

  proptest! {
    #[test]
    fn live_matches_kept_values(keep in proptest::collection::vec(any::<bool>(), 0..32)) {
      let mut registry = Registry::new();
      let mut kept = Vec::new();
      for (i, keep) in keep.iter().enumerate() {
        let value = Rc::new(i);
        registry.insert(WeakRef::new(&value));
        if *keep {
          kept.push(value);
        }
      }
      let live: Vec<usize> = registry.live().map(|v| *v).collect();
      let expected: Vec<usize> = kept.iter().map(|v| **v).collect();
      prop_assert_eq!(live, expected);
      registry.prune();
      prop_assert_eq!(registry.len(), kept.len());
    }
  }
}
