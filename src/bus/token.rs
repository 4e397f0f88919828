use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

type Unsubscribe = Box<dyn FnOnce() + Send + 'static>;

/// Cancellable handle for one active subscription.
///
/// Clones share state. Disposal is idempotent: explicit unsubscribe, a
/// one-shot firing, and channel pruning may all race and only the first one
/// counts.
#[derive(Clone)]
pub struct SubscriptionToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    id: Uuid,
    active: AtomicBool,
    unsubscribe: Mutex<Option<Unsubscribe>>,
}

impl SubscriptionToken {
    pub(crate) fn new(id: Uuid, unsubscribe: Unsubscribe) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                id,
                active: AtomicBool::new(true),
                unsubscribe: Mutex::new(Some(unsubscribe)),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Remove the subscription from its channel. No-op once disposed.
    ///
    /// Must not be called while holding the owning channel's lock.
    pub fn dispose(&self) {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let unsubscribe = self
            .inner
            .unsubscribe
            .lock()
            .expect("token mutex poisoned")
            .take();
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
    }

    /// Mark disposed without calling back into the channel. Used by the
    /// channel itself when it has already removed the subscription.
    pub(crate) fn retire(&self) {
        self.inner.active.store(false, Ordering::Release);
        let _ = self
            .inner
            .unsubscribe
            .lock()
            .expect("token mutex poisoned")
            .take();
    }
}

impl PartialEq for SubscriptionToken {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for SubscriptionToken {}

impl Hash for SubscriptionToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionToken")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_token() -> (SubscriptionToken, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let token = SubscriptionToken::new(
            Uuid::new_v4(),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (token, calls)
    }

    #[test]
    fn dispose_is_idempotent() {
        let (token, calls) = counting_token();
        assert!(token.is_active());

        token.dispose();
        token.clone().dispose();

        assert!(!token.is_active());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retire_skips_callback() {
        let (token, calls) = counting_token();
        token.retire();
        token.dispose();

        assert!(!token.is_active());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clones_compare_equal() {
        let (token, _) = counting_token();
        let (other, _) = counting_token();
        assert_eq!(token, token.clone());
        assert_ne!(token, other);
        assert_eq!(token.to_string(), token.id().to_string());
    }
}
