//! Timer-driven channel for hosts that offer no native tick.

use std::fmt;
use std::time::Duration;

use crate::threading::ThreadAffinity;

use super::aggregator::Event;
use super::channel::{EventChannel, SubscriptionOptions};
use super::delegate::{Delegate, DelegateReference};
use super::token::SubscriptionToken;
use super::EventContext;

/// Channel that republishes a fresh `P::default()` every period while the
/// subscription that started the timer stays active.
pub struct PeriodicEvent<P> {
    channel: EventChannel<P>,
}

impl<P> Clone for PeriodicEvent<P> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<P> fmt::Debug for PeriodicEvent<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicEvent")
            .field("channel", &self.channel)
            .finish()
    }
}

impl<P: Default + Send + Sync + 'static> Event for PeriodicEvent<P> {
    fn create(context: &EventContext) -> Self {
        Self::new(context.clone())
    }
}

impl<P: Default + Send + Sync + 'static> PeriodicEvent<P> {
    pub fn new(context: EventContext) -> Self {
        Self {
            channel: EventChannel::new(context),
        }
    }

    pub fn channel(&self) -> &EventChannel<P> {
        &self.channel
    }

    /// Subscribe `action` and start a loop that publishes every `period`.
    ///
    /// The loop checks the returned token after each sleep and exits once it
    /// has been disposed. The action is held strongly.
    pub fn subscribe_periodic(
        &self,
        period: Duration,
        action: Delegate<P>,
        affinity: ThreadAffinity,
    ) -> SubscriptionToken {
        let token = self.channel.insert(
            DelegateReference::strong(action),
            None,
            SubscriptionOptions::on(affinity).keep_alive(),
        );

        let channel = self.channel.clone();
        let watched = token.clone();
        drop(self.channel.context().thread.spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if !watched.is_active() {
                    break;
                }
                channel.publish(P::default());
            }
            tracing::debug!(token = %watched, "periodic loop stopped");
        }));

        token
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::bus::test_helpers::make_test_context;

    #[derive(Debug, Default)]
    struct Tick;

    #[tokio::test(start_paused = true)]
    async fn publishes_each_period_until_disposed() {
        let (_main_loop, context) = make_test_context();
        let event = PeriodicEvent::<Tick>::new(context);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let token = event.subscribe_periodic(
            Duration::from_millis(100),
            Delegate::closure(move |_: &Tick| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            ThreadAffinity::PublisherThread,
        );

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        token.dispose();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(event.channel().subscriber_count(), 0);
    }
}
