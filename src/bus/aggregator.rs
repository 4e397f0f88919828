//! Registry resolving exactly one event instance per event type.

use std::any::{type_name, Any, TypeId};
use std::fmt;

use dashmap::DashMap;

use super::channel::EventChannel;
use super::EventContext;

/// Anything the aggregator can hand out: a cheap-to-clone handle built once
/// from the shared [`EventContext`].
pub trait Event: Clone + Send + Sync + 'static {
    fn create(context: &EventContext) -> Self;
}

impl<P: Send + Sync + 'static> Event for EventChannel<P> {
    fn create(context: &EventContext) -> Self {
        EventChannel::new(context.clone())
    }
}

/// Get-or-create store of events keyed by type.
///
/// Every call to [`EventAggregator::get`] for the same type returns a handle
/// to the same instance for the aggregator's lifetime, which is what lets
/// unrelated publishers and subscribers meet.
pub struct EventAggregator {
    context: EventContext,
    events: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl EventAggregator {
    pub fn new(context: EventContext) -> Self {
        Self {
            context,
            events: DashMap::new(),
        }
    }

    pub fn context(&self) -> &EventContext {
        &self.context
    }

    pub fn get<E: Event>(&self) -> E {
        let entry = self.events.entry(TypeId::of::<E>()).or_insert_with(|| {
            tracing::debug!(event = type_name::<E>(), "creating event");
            Box::new(E::create(&self.context))
        });

        match entry.value().downcast_ref::<E>() {
            Some(event) => event.clone(),
            None => unreachable!("event registry entry for {} has a foreign type", type_name::<E>()),
        }
    }

    /// Shorthand for the plain channel carrying `P`.
    pub fn channel<P: Send + Sync + 'static>(&self) -> EventChannel<P> {
        self.get::<EventChannel<P>>()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

impl fmt::Debug for EventAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventAggregator")
            .field("events", &self.events.len())
            .finish()
    }
}
