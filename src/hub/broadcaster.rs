//! Broadcast hub for live queue updates
//!
//! The hub keeps a lock-protected registry of stream session subscribers
//! keyed by venue and fans queue events out to each subscriber's own
//! channel. Delivery is fire-and-forget per subscriber: a session that is
//! already closing never affects delivery to the others, and is pruned on
//! the next publish. There is no persistence or replay; late subscribers
//! recover through the session's initial snapshot.

use crate::error::{QueueError, Result};
use crate::hub::events::QueueEvent;
use crate::types::{EntryId, VenueId};
use crate::utils::generate_subscriber_id;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for a hub subscriber
pub type SubscriberId = Uuid;

/// A registered subscriber's receiving end
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::UnboundedReceiver<QueueEvent>,
}

/// Sending side kept in the registry
#[derive(Debug)]
struct SubscriberHandle {
    id: SubscriberId,
    entry_id: Option<EntryId>,
    user_id: Option<String>,
    sender: mpsc::UnboundedSender<QueueEvent>,
}

#[derive(Debug, Default)]
struct Registry {
    by_venue: HashMap<VenueId, Vec<SubscriberHandle>>,
    venue_of: HashMap<SubscriberId, VenueId>,
}

/// In-memory pub/sub hub keyed by venue
#[derive(Debug, Default)]
pub struct BroadcastHub {
    registry: RwLock<Registry>,
}

impl BroadcastHub {
    /// Create a new empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for a venue, optionally bound to an entry
    /// and/or a user identity
    pub fn subscribe(
        &self,
        venue_id: &str,
        entry_id: Option<EntryId>,
        user_id: Option<String>,
    ) -> Result<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = generate_subscriber_id();

        let mut registry = self
            .registry
            .write()
            .map_err(|_| QueueError::Internal {
                message: "Failed to acquire subscriber registry lock".to_string(),
            })?;

        registry.by_venue.entry(venue_id.to_string()).or_default().push(
            SubscriberHandle {
                id,
                entry_id,
                user_id,
                sender,
            },
        );
        registry.venue_of.insert(id, venue_id.to_string());

        debug!(
            "Subscribed {} to venue {} (entry: {:?})",
            id, venue_id, entry_id
        );

        Ok(Subscription { id, receiver })
    }

    /// Remove a subscriber. Safe to call more than once; removing an
    /// unknown id is a no-op.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        if let Ok(mut registry) = self.registry.write() {
            let Some(venue_id) = registry.venue_of.remove(&subscriber_id) else {
                return;
            };

            if let Some(subscribers) = registry.by_venue.get_mut(&venue_id) {
                subscribers.retain(|s| s.id != subscriber_id);
                if subscribers.is_empty() {
                    registry.by_venue.remove(&venue_id);
                }
            }

            debug!("Unsubscribed {} from venue {}", subscriber_id, venue_id);
        }
    }

    /// Deliver an event to every live subscriber of its venue.
    ///
    /// Returns the number of subscribers reached. Subscribers whose
    /// channel is closed are dropped from the registry; failures never
    /// surface to the caller.
    pub fn publish(&self, event: QueueEvent) -> usize {
        let mut registry = match self.registry.write() {
            Ok(registry) => registry,
            Err(_) => {
                warn!(
                    "Subscriber registry lock poisoned; dropping {} event for venue {}",
                    event.name, event.venue_id
                );
                return 0;
            }
        };

        let mut delivered = 0;
        let mut pruned_ids: Vec<SubscriberId> = Vec::new();

        match registry.by_venue.get_mut(&event.venue_id) {
            Some(subscribers) => {
                subscribers.retain(|subscriber| match subscriber.sender.send(event.clone()) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(_) => {
                        pruned_ids.push(subscriber.id);
                        false
                    }
                });
            }
            None => return 0,
        }

        if !pruned_ids.is_empty() {
            debug!(
                "Pruned {} closed subscribers from venue {} during publish",
                pruned_ids.len(),
                event.venue_id
            );
            for id in &pruned_ids {
                registry.venue_of.remove(id);
            }
        }

        debug!(
            "Published {} to {} subscribers of venue {}",
            event.name, delivered, event.venue_id
        );
        delivered
    }

    /// Number of live subscribers for a venue
    pub fn subscriber_count(&self, venue_id: &str) -> usize {
        self.registry
            .read()
            .map(|r| r.by_venue.get(venue_id).map(|s| s.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of live subscribers bound to a specific entry
    pub fn subscriber_count_for_entry(&self, venue_id: &str, entry_id: EntryId) -> usize {
        self.registry
            .read()
            .map(|r| {
                r.by_venue
                    .get(venue_id)
                    .map(|subs| {
                        subs.iter()
                            .filter(|s| s.entry_id == Some(entry_id))
                            .count()
                    })
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Number of live subscribers bound to a specific user identity
    pub fn subscriber_count_for_user(&self, venue_id: &str, user_id: &str) -> usize {
        self.registry
            .read()
            .map(|r| {
                r.by_venue
                    .get(venue_id)
                    .map(|subs| {
                        subs.iter()
                            .filter(|s| s.user_id.as_deref() == Some(user_id))
                            .count()
                    })
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Total live subscribers across all venues
    pub fn total_subscribers(&self) -> usize {
        self.registry
            .read()
            .map(|r| r.venue_of.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::events::{EVENT_QUEUE_JOINED, EVENT_QUEUE_LEFT};
    use crate::utils::generate_entry_id;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_venue_subscribers() {
        let hub = BroadcastHub::new();
        let mut sub_a = hub.subscribe("venue-1", None, None).unwrap();
        let mut sub_b = hub.subscribe("venue-1", None, None).unwrap();
        let mut other = hub.subscribe("venue-2", None, None).unwrap();

        let delivered = hub.publish(QueueEvent::new(EVENT_QUEUE_JOINED, "venue-1", json!({})));
        assert_eq!(delivered, 2);

        assert_eq!(sub_a.receiver.recv().await.unwrap().name, "queue_joined");
        assert_eq!(sub_b.receiver.recv().await.unwrap().name, "queue_joined");
        assert!(other.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_others() {
        let hub = BroadcastHub::new();
        let dropped = hub.subscribe("venue-1", None, None).unwrap();
        let mut live = hub.subscribe("venue-1", None, None).unwrap();

        drop(dropped.receiver);

        let delivered = hub.publish(QueueEvent::new(EVENT_QUEUE_JOINED, "venue-1", json!({})));
        assert_eq!(delivered, 1);
        assert!(live.receiver.recv().await.is_some());

        // Closed subscriber was pruned on publish
        assert_eq!(hub.subscriber_count("venue-1"), 1);
        assert_eq!(hub.total_subscribers(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let hub = BroadcastHub::new();
        let sub = hub.subscribe("venue-1", None, None).unwrap();
        assert_eq!(hub.subscriber_count("venue-1"), 1);

        hub.unsubscribe(sub.id);
        hub.unsubscribe(sub.id);

        assert_eq!(hub.subscriber_count("venue-1"), 0);
        assert_eq!(hub.total_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_count_returns_to_baseline() {
        let hub = BroadcastHub::new();
        assert_eq!(hub.total_subscribers(), 0);

        for _ in 0..50 {
            let sub = hub.subscribe("venue-1", None, None).unwrap();
            hub.unsubscribe(sub.id);
        }

        assert_eq!(hub.subscriber_count("venue-1"), 0);
        assert_eq!(hub.total_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let hub = BroadcastHub::new();
        let mut sub = hub.subscribe("venue-1", None, None).unwrap();

        hub.publish(QueueEvent::new(EVENT_QUEUE_JOINED, "venue-1", json!({"seq": 1})));
        hub.publish(QueueEvent::new(EVENT_QUEUE_LEFT, "venue-1", json!({"seq": 2})));
        hub.publish(QueueEvent::new(EVENT_QUEUE_JOINED, "venue-1", json!({"seq": 3})));

        for expected in 1..=3 {
            let event = sub.receiver.recv().await.unwrap();
            assert_eq!(event.payload["seq"], expected);
        }
    }

    #[tokio::test]
    async fn test_entry_and_user_indices() {
        let hub = BroadcastHub::new();
        let entry_id = generate_entry_id();
        let _bound = hub
            .subscribe("venue-1", Some(entry_id), Some("user-1".to_string()))
            .unwrap();
        let _plain = hub.subscribe("venue-1", None, None).unwrap();

        assert_eq!(hub.subscriber_count_for_entry("venue-1", entry_id), 1);
        assert_eq!(hub.subscriber_count_for_user("venue-1", "user-1"), 1);
        assert_eq!(hub.subscriber_count("venue-1"), 2);
    }
}
