//! Where a fuse's cancellation handle lives.
//!
//! A fuse hands its [`AnyCancellable`] to some storage and, when the fuse
//! goes away first, asks that storage to give the handle back by identity.
//! [`CancellableStore`] is that storage contract; [`held_by`] binds it to a
//! field of a shared holder object.

use std::{
  any::{Any, TypeId},
  cell::RefCell,
  collections::HashSet,
  hash::BuildHasher,
  mem, ptr,
  rc::{Rc, Weak},
};

use tracing::debug;

use crate::{subscription::AnyCancellable, weak_ref::Identity};

/// Storage for cancellation handles.
pub trait CancellableStore {
  /// Take ownership of `cancellable`. Returns the handle it displaced, if
  /// any, so the caller can drop it outside any borrow.
  fn store(&mut self, cancellable: AnyCancellable) -> Option<AnyCancellable>;

  /// Give back the handle with `identity` if this store still holds it.
  fn remove(&mut self, identity: Identity) -> Option<AnyCancellable>;
}

/// A single slot. Storing replaces the previous handle; removing only clears
/// the slot if it still holds the handle asked for.
impl CancellableStore for Option<AnyCancellable> {
  fn store(&mut self, cancellable: AnyCancellable) -> Option<AnyCancellable> {
    self.replace(cancellable)
  }

  fn remove(&mut self, identity: Identity) -> Option<AnyCancellable> {
    if self.as_ref().is_some_and(|c| c.identity() == identity) {
      self.take()
    } else {
      None
    }
  }
}

impl<S: BuildHasher> CancellableStore for HashSet<AnyCancellable, S> {
  fn store(&mut self, cancellable: AnyCancellable) -> Option<AnyCancellable> {
    self.replace(cancellable)
  }

  fn remove(&mut self, identity: Identity) -> Option<AnyCancellable> { self.take(&identity) }
}

impl CancellableStore for Vec<AnyCancellable> {
  fn store(&mut self, cancellable: AnyCancellable) -> Option<AnyCancellable> {
    self.push(cancellable);
    None
  }

  fn remove(&mut self, identity: Identity) -> Option<AnyCancellable> {
    let pos = self.iter().position(|c| c.identity() == identity)?;
    Some(self.remove(pos))
  }
}

/// Build the `store` / `remove` pair for a store reached through `field` on
/// `holder`.
///
/// `store` borrows the holder once, right away. `remove` only holds the
/// holder weakly: if the holder is gone there is nothing to clean up. If the
/// holder is busy when a fuse goes away (say, it is dropping its own fuses),
/// the identity is remembered and the handle is taken out the next time
/// either closure of the pair gets hold of the holder.
///
/// # Panics
///
/// `store` panics if the holder is already mutably borrowed when it runs.
pub fn held_by<H, S, F>(
  holder: &Rc<RefCell<H>>,
  field: F,
) -> (impl FnOnce(AnyCancellable) + '_, impl FnOnce(Identity) + 'static)
where
  H: 'static,
  S: CancellableStore + 'static,
  F: Fn(&mut H) -> &mut S + Clone + 'static,
{
  let deferred = deferred_removals::<H, F>(holder);

  let store_field = field.clone();
  let store_deferred = deferred.clone();
  let store = move |cancellable: AnyCancellable| {
    let released = {
      let mut holder = holder.borrow_mut();
      let target = store_field(&mut *holder);
      let mut released = take_deferred(target, &store_deferred);
      released.extend(target.store(cancellable));
      released
    };
    drop(released);
  };

  let weak = Rc::downgrade(holder);
  let remove = move |identity: Identity| {
    let Some(holder) = weak.upgrade() else {
      return;
    };
    let released = match holder.try_borrow_mut() {
      Ok(mut holder) => {
        let target = field(&mut *holder);
        let mut released = take_deferred(target, &deferred);
        released.extend(target.remove(identity));
        released
      }
      Err(_) => {
        debug!(handle = ?identity, "holder busy, removal deferred");
        deferred.borrow_mut().push(identity);
        Vec::new()
      }
    };
    drop(released);
  };

  (store, remove)
}

type Deferred = Rc<RefCell<Vec<Identity>>>;

thread_local! {
  // One list per holder and field accessor, shared by every fuse stored
  // through that pair.
  static DEFERRED: RefCell<Vec<(Weak<dyn Any>, TypeId, Deferred)>> = RefCell::new(Vec::new());
}

fn deferred_removals<H: 'static, F: 'static>(holder: &Rc<RefCell<H>>) -> Deferred {
  let key: Rc<dyn Any> = holder.clone();
  let field = TypeId::of::<F>();
  DEFERRED.with(|lists| {
    let mut lists = lists.borrow_mut();
    lists.retain(|(owner, ..)| owner.strong_count() > 0);
    let found = lists
      .iter()
      .find(|(owner, id, _)| *id == field && ptr::addr_eq(owner.as_ptr(), Rc::as_ptr(&key)));
    if let Some((.., list)) = found {
      return list.clone();
    }
    let list = Deferred::default();
    lists.push((Rc::downgrade(&key), field, list.clone()));
    list
  })
}

/// Take out every handle whose removal was deferred. Returned rather than
/// dropped so the caller can release them outside its borrow.
fn take_deferred<S: CancellableStore>(target: &mut S, deferred: &Deferred) -> Vec<AnyCancellable> {
  let ids = mem::take(&mut *deferred.borrow_mut());
  ids.into_iter().filter_map(|id| target.remove(id)).collect()
}
