//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Protocol
pub use crate::demand::Demand;
pub use crate::publisher::{Publisher, PublisherExt};
pub use crate::subscriber::{BoxedSubscriber, Completion, Subscriber};
pub use crate::subscription::{AnyCancellable, AnySubscription, Cancellable, Subscription, WeakCancellable};
// Fuse
pub use crate::fuse::{Fuse, FusedSubscription};
pub use crate::store::{held_by, CancellableStore};
// Identity and weak tracking
pub use crate::registry::Registry;
pub use crate::weak_ref::{Identity, WeakRef};
// Publishers and subscribers
#[cfg(feature = "stream")]
pub use crate::into_stream::IntoStream;
pub use crate::sink::Sink;
pub use crate::subject::Subject;
