//! # rxfuse: lifecycle fusing for reactive publishers
//!
//! Tie every subscription made through a publisher to one external
//! cancellation handle. Cancel or drop the handle and all of those
//! subscriptions are cancelled; the publisher also stops accepting new
//! subscribers.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::{cell::RefCell, collections::HashSet, rc::Rc};
//!
//! use rxfuse::prelude::*;
//!
//! #[derive(Default)]
//! struct Screen {
//!   cancellables: HashSet<AnyCancellable>,
//! }
//!
//! let screen = Rc::new(RefCell::new(Screen::default()));
//! let clicks = Subject::<u32, ()>::default();
//!
//! let fused = clicks.clone().fuse_on_collection(&screen, |s: &mut Screen| &mut s.cancellables);
//! let _sub = fused.sink(|n| println!("click {n}"));
//!
//! clicks.next(1);
//! // Everything fused to the screen goes away with it.
//! drop(screen);
//! assert!(fused.is_cancelled());
//! assert_eq!(clicks.subscriber_count(), 0);
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Publisher`] / [`Subscriber`] | The demand-driven protocol everything speaks |
//! | [`AnyCancellable`] | Type-erased handle that cancels when dropped |
//! | [`Fuse`] | Publisher whose subscriptions die with its handle |
//! | [`FusedSubscription`] | One downstream bridged through a fuse |
//! | [`Subject`] | Hand-driven passthrough publisher |
//!
//! Everything here is single-threaded: shared state is `Rc` and `RefCell`.
//!
//! ## Feature Flags
//!
//! - **`stream`** (default): [`IntoStream`], consuming a publisher as a
//!   `futures::Stream`
//!
//! [`Publisher`]: publisher::Publisher
//! [`Subscriber`]: subscriber::Subscriber
//! [`AnyCancellable`]: subscription::AnyCancellable
//! [`Fuse`]: fuse::Fuse
//! [`FusedSubscription`]: fuse::FusedSubscription
//! [`Subject`]: subject::Subject
//! [`IntoStream`]: into_stream::IntoStream

pub mod demand;
pub mod fuse;
#[cfg(feature = "stream")]
pub mod into_stream;
pub mod prelude;
pub mod publisher;
pub mod registry;
pub mod sink;
pub mod store;
pub mod subject;
pub mod subscriber;
pub mod subscription;
pub mod weak_ref;

// Re-export the prelude module
pub use prelude::*;

#[cfg(doctest)]
mod __markdown_doctests {
  mod readme {
    #![doc = include_str!("../README.md")]
  }
}
