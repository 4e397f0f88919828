use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::threading::ThreadAffinity;

use super::delegate::{Callback, DelegateReference};
use super::token::SubscriptionToken;
use super::EventContext;

/// One entry in a channel's subscription list.
pub struct EventSubscription<P> {
    token: SubscriptionToken,
    action: DelegateReference<P>,
    filter: Option<DelegateReference<P, bool>>,
    affinity: ThreadAffinity,
    once: Option<Arc<AtomicBool>>,
}

impl<P: Send + Sync + 'static> EventSubscription<P> {
    pub fn new(
        token: SubscriptionToken,
        action: DelegateReference<P>,
        filter: Option<DelegateReference<P, bool>>,
        affinity: ThreadAffinity,
        once: bool,
    ) -> Self {
        Self {
            token,
            action,
            filter,
            affinity,
            once: once.then(|| Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn token(&self) -> &SubscriptionToken {
        &self.token
    }

    pub fn affinity(&self) -> ThreadAffinity {
        self.affinity
    }

    pub fn is_once(&self) -> bool {
        self.once.is_some()
    }

    /// Resolve the delegates into something runnable.
    ///
    /// Returns `None` when the action or the filter has died; the channel
    /// treats that as the signal to prune this subscription.
    pub fn execution_strategy(&self) -> Option<ExecutionStrategy<P>> {
        let action = self.action.target()?;
        let filter = match &self.filter {
            Some(filter) => Some(filter.target()?),
            None => None,
        };

        Some(ExecutionStrategy {
            action,
            filter,
            affinity: self.affinity,
            once: self.once.as_ref().map(|fired| OnceGuard {
                token: self.token.clone(),
                fired: Arc::clone(fired),
            }),
        })
    }
}

impl<P> fmt::Debug for EventSubscription<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("token", &self.token)
            .field("affinity", &self.affinity)
            .field("once", &self.once.is_some())
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

struct OnceGuard {
    token: SubscriptionToken,
    fired: Arc<AtomicBool>,
}

/// A resolved subscription, ready to run against one payload.
pub struct ExecutionStrategy<P> {
    action: Callback<P, ()>,
    filter: Option<Callback<P, bool>>,
    affinity: ThreadAffinity,
    once: Option<OnceGuard>,
}

impl<P: Send + Sync + 'static> ExecutionStrategy<P> {
    /// Dispatch to the subscriber's thread. Filter and action both run inside
    /// the context's exception boundary.
    pub fn execute(self, payload: Arc<P>, context: &EventContext) {
        let boundary = context.boundary.clone();
        let affinity = self.affinity;
        context
            .thread
            .execute(affinity, move || self.invoke(&payload, &boundary));
    }

    fn invoke(self, payload: &P, boundary: &crate::boundary::ExceptionBoundary) {
        if let Some(filter) = &self.filter {
            match boundary.run(|| Ok(filter(payload))) {
                Ok(true) => {}
                Ok(false) | Err(_) => return,
            }
        }

        // A one-shot may already be queued on another thread from an earlier
        // publish; only the first invocation wins.
        if let Some(guard) = &self.once {
            if guard.fired.swap(true, Ordering::AcqRel) {
                return;
            }
        }

        let action = &self.action;
        boundary.fire_and_forget(|| {
            action(payload);
            Ok(())
        });

        if let Some(guard) = &self.once {
            guard.token.dispose();
        }
    }
}
