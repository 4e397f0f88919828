//! Typed event channel.
//!
//! Publishing takes a snapshot of runnable strategies under the channel lock,
//! pruning dead subscribers as it goes, then dispatches outside the lock in
//! subscription order. An unsubscribe racing a publish only affects later
//! publishes.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::threading::ThreadAffinity;

use super::delegate::{Delegate, DelegateReference};
use super::subscription::{EventSubscription, ExecutionStrategy};
use super::token::SubscriptionToken;
use super::{BusError, EventContext};

/// How a subscriber wants to be called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub affinity: ThreadAffinity,
    /// Hold the callback strongly. Required for bare closures.
    pub keep_alive: bool,
    /// Unsubscribe automatically after the first invocation.
    pub once: bool,
}

impl SubscriptionOptions {
    pub fn on(affinity: ThreadAffinity) -> Self {
        Self {
            affinity,
            ..Self::default()
        }
    }

    pub fn keep_alive(mut self) -> Self {
        self.keep_alive = true;
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

/// Ordered subscriber list for one payload type. Clones share the same list.
pub struct EventChannel<P> {
    inner: Arc<ChannelInner<P>>,
}

struct ChannelInner<P> {
    subscriptions: Mutex<Vec<EventSubscription<P>>>,
    context: EventContext,
}

impl<P> ChannelInner<P> {
    fn lock(&self) -> MutexGuard<'_, Vec<EventSubscription<P>>> {
        self.subscriptions.lock().expect("channel mutex poisoned")
    }
}

impl<P: Send + Sync + 'static> ChannelInner<P> {
    // Removed subscriptions are dropped after the guard: their callbacks may
    // own values whose `Drop` disposes other tokens on this channel.
    fn remove(&self, id: Uuid) {
        let removed = {
            let mut subscriptions = self.lock();
            subscriptions
                .iter()
                .position(|subscription| subscription.token().id() == id)
                .map(|index| subscriptions.remove(index))
        };
        drop(removed);
    }

    fn snapshot(&self) -> Vec<ExecutionStrategy<P>> {
        let mut pruned = Vec::new();
        let strategies = {
            let mut subscriptions = self.lock();
            let mut strategies = Vec::with_capacity(subscriptions.len());
            let mut live = Vec::with_capacity(subscriptions.len());
            for subscription in mem::take(&mut *subscriptions) {
                match subscription.execution_strategy() {
                    Some(strategy) => {
                        strategies.push(strategy);
                        live.push(subscription);
                    }
                    None => {
                        tracing::debug!(token = %subscription.token(), "pruning dead subscriber");
                        subscription.token().retire();
                        pruned.push(subscription);
                    }
                }
            }
            *subscriptions = live;
            strategies
        };
        drop(pruned);
        strategies
    }
}

impl<P> Clone for EventChannel<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for EventChannel<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("payload", &std::any::type_name::<P>())
            .field("subscribers", &self.inner.lock().len())
            .finish()
    }
}

impl<P: Send + Sync + 'static> EventChannel<P> {
    pub fn new(context: EventContext) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                subscriptions: Mutex::new(Vec::new()),
                context,
            }),
        }
    }

    pub fn context(&self) -> &EventContext {
        &self.inner.context
    }

    /// Add a subscriber.
    ///
    /// Fails if a closure (action or filter) is passed without
    /// `options.keep_alive`.
    pub fn subscribe(
        &self,
        action: Delegate<P>,
        options: SubscriptionOptions,
        filter: Option<Delegate<P, bool>>,
    ) -> Result<SubscriptionToken, BusError> {
        let action = DelegateReference::new(action, options.keep_alive)?;
        let filter = filter
            .map(|filter| DelegateReference::new(filter, options.keep_alive))
            .transpose()?;
        Ok(self.insert(action, filter, options))
    }

    /// Strongly held closure on the publisher thread.
    pub fn subscribe_fn<F>(&self, action: F) -> SubscriptionToken
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let action = DelegateReference::strong(Delegate::closure(action));
        self.insert(action, None, SubscriptionOptions::default().keep_alive())
    }

    pub(crate) fn insert(
        &self,
        action: DelegateReference<P>,
        filter: Option<DelegateReference<P, bool>>,
        options: SubscriptionOptions,
    ) -> SubscriptionToken {
        let id = Uuid::new_v4();
        let channel = Arc::downgrade(&self.inner);
        let token = SubscriptionToken::new(
            id,
            Box::new(move || {
                if let Some(channel) = channel.upgrade() {
                    channel.remove(id);
                }
            }),
        );

        let subscription =
            EventSubscription::new(token.clone(), action, filter, options.affinity, options.once);
        self.inner.lock().push(subscription);

        tracing::debug!(
            token = %token,
            affinity = ?options.affinity,
            once = options.once,
            "subscribed"
        );
        token
    }

    /// Fan `payload` out to every live subscriber.
    ///
    /// Dead subscribers are pruned even when nobody is left to invoke. A
    /// subscriber that fails is logged by the boundary and the rest still run.
    pub fn publish(&self, payload: P) {
        let strategies = self.inner.snapshot();
        if strategies.is_empty() {
            return;
        }

        let payload = Arc::new(payload);
        for strategy in strategies {
            strategy.execute(Arc::clone(&payload), &self.inner.context);
        }
    }

    /// Remove the subscriber behind `token`. Unknown or already-disposed
    /// tokens are ignored.
    pub fn unsubscribe(&self, token: &SubscriptionToken) {
        if self.contains(token) {
            token.dispose();
        }
    }

    pub fn contains(&self, token: &SubscriptionToken) -> bool {
        self.inner
            .lock()
            .iter()
            .any(|subscription| subscription.token() == token)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when both handles point at the same channel.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::bus::test_helpers::make_test_context;

    /// Log sink for asserting on what the boundary recorded.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<StdMutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Disposes a token when dropped.
    struct DisposeOnDrop(SubscriptionToken);

    impl Drop for DisposeOnDrop {
        fn drop(&mut self) {
            self.0.dispose();
        }
    }

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    fn count_hit(counter: &Counter, _: &u32) {
        counter.hits.fetch_add(1, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn publish_reaches_subscribers_in_order() {
        let (_main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context);
        let order = Arc::new(StdMutex::new(Vec::new()));

        for label in ["a", "b", "c"] {
            let order = order.clone();
            channel.subscribe_fn(move |n| order.lock().unwrap().push(format!("{label}{n}")));
        }

        channel.publish(1);
        assert_eq!(*order.lock().unwrap(), vec!["a1", "b1", "c1"]);
    }

    #[tokio::test]
    async fn weak_subscriber_is_pruned_after_owner_drops() {
        let (_main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context);
        let owner = Arc::new(Counter::default());
        let token = channel
            .subscribe(
                Delegate::method(&owner, count_hit),
                SubscriptionOptions::default(),
                None,
            )
            .unwrap();

        channel.publish(1);
        assert_eq!(owner.hits.load(Ordering::SeqCst), 1);
        assert!(channel.contains(&token));

        drop(owner);
        channel.publish(2);

        assert!(!channel.contains(&token));
        assert!(!token.is_active());
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn closure_without_keep_alive_fails() {
        let (_main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context);
        let err = channel
            .subscribe(Delegate::closure(|_| {}), SubscriptionOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, BusError::ClosureRequiresKeepAlive));
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn once_subscription_fires_once() {
        let (_main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let token = channel
            .subscribe(
                Delegate::closure(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                SubscriptionOptions::default().keep_alive().once(),
                None,
            )
            .unwrap();

        channel.publish(1);
        assert!(!token.is_active());
        channel.publish(2);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!channel.contains(&token));
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_stop_fan_out() {
        let (_main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context);
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let first = seen.clone();
        channel.subscribe_fn(move |_| first.lock().unwrap().push(1));
        channel.subscribe_fn(|_| panic!("second subscriber failed"));
        let third = seen.clone();
        channel.subscribe_fn(move |_| third.lock().unwrap().push(3));

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || channel.publish(0));

        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
        let logs = logs.text();
        assert!(logs.contains("recoverable failure captured"), "{logs}");
        assert!(logs.contains("second subscriber failed"), "{logs}");
    }

    #[tokio::test]
    async fn unsubscribe_only_affects_later_publishes() {
        let (mut main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let token = channel
            .subscribe(
                Delegate::closure(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                SubscriptionOptions::on(ThreadAffinity::MainThread).keep_alive(),
                None,
            )
            .unwrap();

        channel.publish(1);
        channel.unsubscribe(&token);
        assert!(!channel.contains(&token));

        assert_eq!(main_loop.run_pending(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        channel.publish(2);
        assert_eq!(main_loop.run_pending(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pruned_callback_may_dispose_a_sibling_on_drop() {
        let (_main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context);
        let sibling = channel.subscribe_fn(|_| {});

        let owner = Arc::new(Counter::default());
        let cleanup = DisposeOnDrop(sibling.clone());
        channel
            .subscribe(
                Delegate::method(&owner, move |counter: &Counter, n: &u32| {
                    let _cleanup = &cleanup;
                    count_hit(counter, n);
                }),
                SubscriptionOptions::default(),
                None,
            )
            .unwrap();

        drop(owner);
        channel.publish(1);

        assert!(!sibling.is_active());
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn double_unsubscribe_is_noop() {
        let (_main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context);
        let keep = channel.subscribe_fn(|_| {});
        let token = channel.subscribe_fn(|_| {});

        channel.unsubscribe(&token);
        channel.unsubscribe(&token);

        assert!(!channel.contains(&token));
        assert!(channel.contains(&keep));
        assert_eq!(channel.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_ignores_foreign_tokens() {
        let (_main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context.clone());
        let other = EventChannel::<u32>::new(context);
        let foreign = other.subscribe_fn(|_| {});

        channel.unsubscribe(&foreign);
        assert!(foreign.is_active());
        assert!(other.contains(&foreign));
    }

    #[tokio::test]
    async fn dispose_through_token_removes_subscription() {
        let (_main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context);
        let token = channel.subscribe_fn(|_| {});
        token.dispose();
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn main_affinity_waits_for_main_loop() {
        let (mut main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        channel
            .subscribe(
                Delegate::closure(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                SubscriptionOptions::on(ThreadAffinity::MainThread).keep_alive(),
                None,
            )
            .unwrap();

        channel.publish(7);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(main_loop.run_pending(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_subscribes_are_not_lost() {
        let (_main_loop, context) = make_test_context();
        let channel = EventChannel::<u32>::new(context);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let channel = channel.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        channel.subscribe_fn(|_| {});
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(channel.subscriber_count(), 400);
    }
}
