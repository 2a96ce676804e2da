//! Event Bus implementation.
//!
//! The bus is owned by the application entry point and handed to the
//! components that report progress; there is no process-wide instance.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{AppEvent, EventCategory};

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Filter to receive only specific event types
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive all events.
    #[default]
    All,
    /// Receive events matching any of these categories.
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    /// Check if an event matches this filter
    pub fn matches(&self, event: &AppEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

type EventHandler = Box<dyn Fn(AppEvent) + Send + Sync>;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for broadcast.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Error types for event bus operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventBusError {
    /// No subscribers are listening
    #[error("No active subscribers")]
    NoSubscribers,
}

/// Observer channel between the run loop and whatever displays progress
///
/// Synchronous handlers run on the publishing task, so a status change is
/// visible to them before the run loop moves on. Async consumers can take a
/// broadcast [`receiver`](EventBus::receiver) instead.
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
    handlers: Arc<RwLock<HashMap<SubscriptionId, (EventFilter, EventHandler)>>>,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of async receivers that will see the event, or
    /// an error if nobody is listening at all.
    pub fn publish(&self, event: AppEvent) -> Result<usize, EventBusError> {
        tracing::trace!(category = %event.category(), "{}", event.description());

        let handlers = self.handlers.read();
        for (filter, handler) in handlers.values() {
            if filter.matches(&event) {
                handler(event.clone());
            }
        }

        match self.sender.send(event) {
            Ok(count) => Ok(count),
            Err(_) if handlers.is_empty() => Err(EventBusError::NoSubscribers),
            Err(_) => Ok(0),
        }
    }

    /// Publish without caring whether anybody listens.
    pub fn notify(&self, event: AppEvent) {
        let _ = self.publish(event);
    }

    /// Subscribe to events with a synchronous handler
    ///
    /// The handler runs on the publishing task and should return quickly.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(AppEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers.write().insert(id, (filter, Box::new(handler)));
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Get a receiver for manual event polling
    pub fn receiver(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Unsubscribe from events
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Get the number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MilledStatus;
    use crate::event_bus::events::{AlignmentEvent, MillingEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn status_event(status: MilledStatus) -> AppEvent {
        AppEvent::Milling(MillingEvent::GroupStatusChanged {
            position: 0,
            group: 1,
            status,
        })
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        let id = bus.subscribe(EventFilter::All, |_| {});
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_handlers_see_events_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();

        bus.subscribe(EventFilter::All, move |event| sink.lock().push(event));

        bus.notify(status_event(MilledStatus::Busy));
        bus.notify(status_event(MilledStatus::Done));

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![
                status_event(MilledStatus::Busy),
                status_event(MilledStatus::Done)
            ]
        );
    }

    #[test]
    fn test_event_filtering() {
        let bus = EventBus::new();
        let milling_count = Arc::new(AtomicUsize::new(0));
        let alignment_count = Arc::new(AtomicUsize::new(0));

        let mc = milling_count.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Milling]),
            move |_| {
                mc.fetch_add(1, Ordering::SeqCst);
            },
        );

        let ac = alignment_count.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Alignment]),
            move |_| {
                ac.fetch_add(1, Ordering::SeqCst);
            },
        );

        bus.notify(status_event(MilledStatus::Busy));
        bus.notify(AppEvent::Alignment(AlignmentEvent::Finished {
            converged: true,
            captures: 2,
        }));
        bus.notify(AppEvent::Milling(MillingEvent::NoPendingTasks));

        assert_eq!(milling_count.load(Ordering::SeqCst), 2);
        assert_eq!(alignment_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert!(matches!(
            bus.publish(AppEvent::Milling(MillingEvent::NoPendingTasks)),
            Err(EventBusError::NoSubscribers)
        ));
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = EventBus::new();
        let mut receiver = bus.receiver();

        let event = AppEvent::Milling(MillingEvent::RunStarted { tasks: 3 });
        assert_eq!(bus.publish(event.clone()).ok(), Some(1));

        let received = receiver.recv().await.expect("event should arrive");
        assert_eq!(received, event);
        assert_eq!(received.description(), "Starting milling with 3 tasks");
    }
}
