use std::{
  cell::{Cell, RefCell},
  collections::VecDeque,
  rc::{Rc, Weak},
};

use once_cell::unsync::OnceCell;
use tracing::trace;

use super::Fuse;
use crate::{
  demand::Demand,
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Completion, Subscriber},
  subscription::{AnySubscription, Cancellable, Subscription},
};

type Downstream<P> =
  BoxedSubscriber<'static, <P as Publisher>::Output, <P as Publisher>::Failure>;

/// An upstream signal that arrived while the downstream was busy.
enum Signal<Item, Err> {
  Value(Item),
  Completion(Completion<Err>),
}

/// One downstream subscriber bridged to a fuse's upstream.
///
/// The downstream receives this (as an [`AnySubscription`]) and is its only
/// owner; the fuse tracks it weakly and the upstream reaches it through a
/// weak link. While it lives it keeps its [`Fuse`] alive. Dropping it cancels
/// the upstream handle and removes it from the fuse's registry.
///
/// # State
///
/// - `downstream` / `upstream`: present until cancelled, then `None` for good.
/// - `pending`: demand requested before the upstream handle arrived.
/// - `stashed`: upstream signals that arrived while the downstream was out
///   of its cell, delivered in order once the current callback returns.
/// - `cancelled`: monotonic.
///
/// Signals to the downstream are delivered with the subscriber taken out of
/// its cell, so a downstream callback may cancel this subscription (or drop
/// the fuse's handle) without tripping a `RefCell` borrow.
pub struct FusedSubscription<P: Publisher> {
  downstream: RefCell<Option<Downstream<P>>>,
  upstream: RefCell<Option<AnySubscription>>,
  pending: Cell<Demand>,
  stashed: RefCell<VecDeque<Signal<P::Output, P::Failure>>>,
  cancelled: Cell<bool>,
  on_teardown: OnceCell<Box<dyn FnOnce()>>,
  fuse: Fuse<P>,
}

impl<P: Publisher> FusedSubscription<P> {
  /// Build an inert subscription: no upstream yet, no teardown bound.
  pub(crate) fn new(fuse: Fuse<P>, downstream: Downstream<P>) -> Rc<Self> {
    Rc::new(FusedSubscription {
      downstream: RefCell::new(Some(downstream)),
      upstream: RefCell::new(None),
      pending: Cell::new(Demand::none()),
      stashed: RefCell::new(VecDeque::new()),
      cancelled: Cell::new(false),
      on_teardown: OnceCell::new(),
      fuse,
    })
  }

  /// Bind the callback run once when this subscription is dropped. Only the
  /// first binding takes effect.
  pub(crate) fn bind_teardown(&self, on_teardown: impl FnOnce() + 'static) {
    let _ = self.on_teardown.set(Box::new(on_teardown));
  }

  /// The fuse this subscription belongs to.
  #[inline]
  pub fn fuse(&self) -> &Fuse<P> { &self.fuse }

  #[inline]
  pub fn is_cancelled(&self) -> bool { self.cancelled.get() }

  /// Take the downstream out, hand it to `f`, deliver whatever was stashed
  /// meanwhile, and put it back unless this subscription was cancelled.
  ///
  /// Returns `None` if there is no downstream to call: cancelled already, or
  /// a signal is already being delivered.
  fn with_downstream<R>(&self, f: impl FnOnce(&mut Downstream<P>) -> R) -> Option<R> {
    let downstream = self.downstream.borrow_mut().take();
    let mut downstream = downstream?;
    let result = f(&mut downstream);
    self.drain_stashed(&mut downstream);
    if !self.cancelled.get() {
      *self.downstream.borrow_mut() = Some(downstream);
    }
    Some(result)
  }

  fn drain_stashed(&self, downstream: &mut Downstream<P>) {
    while !self.cancelled.get() {
      let signal = self.stashed.borrow_mut().pop_front();
      match signal {
        Some(Signal::Value(value)) => {
          // The upstream was answered with no demand for this one.
          let more = downstream.receive(value);
          if !more.is_none() {
            self.request(more);
          }
        }
        Some(Signal::Completion(completion)) => downstream.receive_completion(completion),
        None => break,
      }
    }
  }

  fn downstream_busy(&self) -> bool { self.downstream.borrow().is_none() }

  pub(crate) fn on_upstream_subscribed(&self, handle: AnySubscription) {
    if self.cancelled.get() || self.upstream.borrow().is_some() {
      handle.cancel();
      return;
    }
    *self.upstream.borrow_mut() = Some(handle.clone());
    let pending = self.pending.replace(Demand::none());
    if !pending.is_none() {
      handle.request(pending);
    }
  }

  pub(crate) fn on_upstream_value(&self, value: P::Output) -> Demand {
    if self.cancelled.get() {
      trace!("value dropped, subscription cancelled");
      return Demand::none();
    }
    if self.downstream_busy() {
      self.stashed.borrow_mut().push_back(Signal::Value(value));
      return Demand::none();
    }
    self
      .with_downstream(|downstream| downstream.receive(value))
      .unwrap_or_default()
  }

  pub(crate) fn on_upstream_completion(&self, completion: Completion<P::Failure>) {
    if self.cancelled.get() {
      return;
    }
    if self.downstream_busy() {
      self.stashed.borrow_mut().push_back(Signal::Completion(completion));
      return;
    }
    self.with_downstream(|downstream| downstream.receive_completion(completion));
  }
}

impl<P> FusedSubscription<P>
where
  P: Publisher + 'static,
  P::Output: 'static,
  P::Failure: 'static,
{
  /// Attach to `upstream` as its subscriber, unless the downstream already
  /// cancelled while receiving its subscription.
  pub(crate) fn subscribe_upstream(self: &Rc<Self>, upstream: &P) {
    if self.cancelled.get() {
      return;
    }
    upstream.receive(UpstreamLink { target: Rc::downgrade(self) });
  }

  /// Give the downstream its subscription handle: this subscription.
  pub(crate) fn deliver_subscription(self: &Rc<Self>) {
    let handle = AnySubscription::from_rc(self.clone());
    self.with_downstream(|downstream| downstream.receive_subscription(handle));
  }
}

impl<P: Publisher> Cancellable for FusedSubscription<P> {
  fn cancel(&self) {
    if self.cancelled.replace(true) {
      return;
    }
    let upstream = self.upstream.borrow_mut().take();
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
    // Released outside the borrow: dropping the downstream may drop handles
    // that point back here.
    let downstream = self.downstream.borrow_mut().take();
    let stashed = std::mem::take(&mut *self.stashed.borrow_mut());
    drop((downstream, stashed));
    self.pending.set(Demand::none());
    trace!("fused subscription cancelled");
  }
}

impl<P: Publisher> Subscription for FusedSubscription<P> {
  fn request(&self, demand: Demand) {
    if self.cancelled.get() {
      return;
    }
    let upstream = self.upstream.borrow().clone();
    match upstream {
      Some(upstream) => upstream.request(demand),
      None => self.pending.set(self.pending.get() + demand),
    }
  }
}

impl<P: Publisher> Drop for FusedSubscription<P> {
  fn drop(&mut self) {
    self.cancel();
    if let Some(on_teardown) = self.on_teardown.take() {
      on_teardown();
    }
  }
}

/// The subscriber a fused subscription registers with the upstream.
///
/// It only holds the subscription weakly, so the upstream never keeps a
/// downstream alive; once the subscription is gone every signal is a no-op.
struct UpstreamLink<P: Publisher> {
  target: Weak<FusedSubscription<P>>,
}

impl<P: Publisher> Subscriber<P::Output, P::Failure> for UpstreamLink<P> {
  fn receive_subscription(&mut self, subscription: AnySubscription) {
    match self.target.upgrade() {
      Some(target) => target.on_upstream_subscribed(subscription),
      None => subscription.cancel(),
    }
  }

  fn receive(&mut self, value: P::Output) -> Demand {
    self
      .target
      .upgrade()
      .map_or(Demand::none(), |target| target.on_upstream_value(value))
  }

  fn receive_completion(&mut self, completion: Completion<P::Failure>) {
    if let Some(target) = self.target.upgrade() {
      target.on_upstream_completion(completion);
    }
  }
}
