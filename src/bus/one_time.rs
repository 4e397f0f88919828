//! One-shot subscriptions keyed by id, reset as a batch on every publish.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::threading::ThreadAffinity;

use super::aggregator::Event;
use super::channel::{EventChannel, SubscriptionOptions};
use super::delegate::Delegate;
use super::token::SubscriptionToken;
use super::{BusError, EventContext};

/// Channel whose subscribers are registered by id and fire at most once.
///
/// Re-registering an id that is still pending returns the existing token.
/// After each publish *every* tracked token is disposed, not just the ones
/// that fired, so all pending registrations reset together.
pub struct OneTimeEvent<P> {
    channel: EventChannel<P>,
    tokens: Arc<Mutex<HashMap<String, SubscriptionToken>>>,
}

impl<P> Clone for OneTimeEvent<P> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

impl<P> fmt::Debug for OneTimeEvent<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneTimeEvent")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl<P: Send + Sync + 'static> Event for OneTimeEvent<P> {
    fn create(context: &EventContext) -> Self {
        Self::new(context.clone())
    }
}

impl<P: Send + Sync + 'static> OneTimeEvent<P> {
    pub fn new(context: EventContext) -> Self {
        Self {
            channel: EventChannel::new(context),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn channel(&self) -> &EventChannel<P> {
        &self.channel
    }

    pub async fn one_time_subscribe(
        &self,
        id: impl Into<String>,
        action: Delegate<P>,
        affinity: ThreadAffinity,
        keep_alive: bool,
        filter: Option<Delegate<P, bool>>,
    ) -> Result<SubscriptionToken, BusError> {
        let id = id.into();
        let mut tokens = self.tokens.lock().await;

        if let Some(existing) = tokens.get(&id) {
            if existing.is_active() {
                tracing::debug!(one_time_id = %id, "already pending, reusing token");
                return Ok(existing.clone());
            }
        }

        let options = SubscriptionOptions {
            affinity,
            keep_alive,
            once: true,
        };
        let token = self.channel.subscribe(action, options, filter)?;
        tokens.insert(id, token.clone());
        Ok(token)
    }

    /// Publish, then dispose and forget every tracked token.
    pub async fn publish(&self, payload: P) {
        let mut tokens = self.tokens.lock().await;
        self.channel.publish(payload);

        let swept = tokens.len();
        for (_, token) in tokens.drain() {
            token.dispose();
        }
        tracing::debug!(swept, "one-time subscriptions reset");
    }

    pub async fn is_pending(&self, id: &str) -> bool {
        self.tokens
            .lock()
            .await
            .get(id)
            .is_some_and(SubscriptionToken::is_active)
    }

    pub async fn pending_count(&self) -> usize {
        self.tokens.lock().await.len()
    }
}
