//! Thread-affine event bus.
//!
//! The bus provides:
//! - Typed channels with weak or strong subscriber lifetimes
//! - Per-subscriber thread affinity (publisher, worker, main)
//! - Lazy pruning of subscribers whose owner has been dropped
//! - One-time and periodic channel variants
//! - Idle-tick coalescing of high-frequency native callbacks
//!
//! # Architecture
//!
//! Native code resolves a channel from the `EventAggregator` and publishes:
//! - `EventChannel`: ordered subscription list, snapshot-then-dispatch publish
//! - `EventAggregator`: one channel instance per event type
//! - `OneTimeEvent` / `PeriodicEvent`: one-shot batch and timer-driven variants
//! - `IdleCallCoalescer`: named zero-arg callbacks deferred to the next idle tick

mod aggregator;
mod channel;
mod delegate;
mod idle;
mod one_time;
mod periodic;
mod subscription;
mod token;

pub use aggregator::{Event, EventAggregator};
pub use channel::{EventChannel, SubscriptionOptions};
pub use delegate::{Callback, Delegate, DelegateReference};
pub use idle::{IdleCallCoalescer, IdleHook, IdleSource};
pub use one_time::OneTimeEvent;
pub use periodic::PeriodicEvent;
pub use subscription::{EventSubscription, ExecutionStrategy};
pub use token::SubscriptionToken;

use crate::boundary::ExceptionBoundary;
use crate::threading::ThreadContext;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("a closure has no owner to hold weakly; subscribe with keep_alive")]
    ClosureRequiresKeepAlive,
}

/// Collaborators every channel is constructed with.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub thread: ThreadContext,
    pub boundary: ExceptionBoundary,
}

impl EventContext {
    pub fn new(thread: ThreadContext, boundary: ExceptionBoundary) -> Self {
        Self { thread, boundary }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::sync::Arc;

    use crate::boundary::ExceptionBoundary;
    use crate::threading::{MainLoop, ThreadContext};

    use super::EventContext;

    /// Event context whose main thread is the calling test thread.
    ///
    /// Must be called inside a tokio runtime. Keep the returned loop alive and
    /// pump it to run main-affine work.
    pub fn make_test_context() -> (MainLoop, EventContext) {
        let (main_loop, handle) = MainLoop::capture();
        let thread = ThreadContext::with_current_runtime(Arc::new(handle))
            .expect("tests run inside a tokio runtime");
        (main_loop, EventContext::new(thread, ExceptionBoundary::new("test")))
    }
}
