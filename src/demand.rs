//! Demand: how many more values a subscriber is willing to receive.

use std::{
  cmp::Ordering,
  fmt::{Display, Formatter},
  ops::{Add, AddAssign},
};

/// A request for values, counted from the subscriber's side.
///
/// Demand only grows through [`Add`] (saturating at
/// [`unlimited`](Demand::unlimited)) and shrinks one value at a time through
/// [`decrement`](Demand::decrement) as values are delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Demand {
  Bounded(usize),
  Unlimited,
}

impl Demand {
  /// No values wanted.
  #[inline]
  pub const fn none() -> Self { Demand::Bounded(0) }

  /// Every value the publisher can produce.
  #[inline]
  pub const fn unlimited() -> Self { Demand::Unlimited }

  /// At most `count` values.
  #[inline]
  pub const fn max(count: usize) -> Self { Demand::Bounded(count) }

  #[inline]
  pub fn is_none(&self) -> bool { *self == Demand::none() }

  /// The bounded count, or `None` for unlimited demand.
  #[inline]
  pub fn bound(&self) -> Option<usize> {
    match self {
      Demand::Bounded(n) => Some(*n),
      Demand::Unlimited => None,
    }
  }

  /// Account for one delivered value. Returns `false` (and leaves the demand
  /// untouched) if there was nothing to deliver against.
  pub fn decrement(&mut self) -> bool {
    match self {
      Demand::Unlimited => true,
      Demand::Bounded(0) => false,
      Demand::Bounded(n) => {
        *n -= 1;
        true
      }
    }
  }
}

impl Default for Demand {
  fn default() -> Self { Demand::none() }
}

impl Add for Demand {
  type Output = Demand;

  fn add(self, rhs: Demand) -> Demand {
    match (self, rhs) {
      (Demand::Bounded(a), Demand::Bounded(b)) => {
        a.checked_add(b).map_or(Demand::Unlimited, Demand::Bounded)
      }
      _ => Demand::Unlimited,
    }
  }
}

impl AddAssign for Demand {
  fn add_assign(&mut self, rhs: Demand) { *self = *self + rhs; }
}

impl PartialOrd for Demand {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Demand {
  fn cmp(&self, other: &Self) -> Ordering {
    match (self, other) {
      (Demand::Bounded(a), Demand::Bounded(b)) => a.cmp(b),
      (Demand::Bounded(_), Demand::Unlimited) => Ordering::Less,
      (Demand::Unlimited, Demand::Bounded(_)) => Ordering::Greater,
      (Demand::Unlimited, Demand::Unlimited) => Ordering::Equal,
    }
  }
}

impl Display for Demand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Demand::Bounded(n) => write!(f, "max({n})"),
      Demand::Unlimited => f.write_str("unlimited"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[rxfuse_macro::test]
  fn addition_saturates() {
    assert_eq!(Demand::max(1) + Demand::max(2), Demand::max(3));
    assert_eq!(Demand::max(usize::MAX) + Demand::max(1), Demand::unlimited());
    assert_eq!(Demand::none() + Demand::unlimited(), Demand::unlimited());

    let mut demand = Demand::none();
    demand += Demand::max(4);
    assert_eq!(demand.bound(), Some(4));
  }

  #[rxfuse_macro::test]
  fn decrement_stops_at_none() {
    let mut demand = Demand::max(1);
    assert!(demand.decrement());
    assert!(demand.is_none());
    assert!(!demand.decrement());

    let mut unlimited = Demand::unlimited();
    assert!(unlimited.decrement());
    assert_eq!(unlimited, Demand::unlimited());
  }

  #[rxfuse_macro::test]
  fn ordering() {
    assert!(Demand::none() < Demand::max(1));
    assert!(Demand::max(usize::MAX) < Demand::unlimited());
    assert_eq!(Demand::unlimited().to_string(), "unlimited");
  }
}
