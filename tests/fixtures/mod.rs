//! Test fixtures and helpers for integration testing

use host_stand::hub::{BroadcastHub, QueueEvent, SubscriberId};
use host_stand::metrics::MetricsCollector;
use host_stand::queue::QueueEngine;
use host_stand::store::InMemoryQueueStore;
use host_stand::types::{JoinRequest, PartyIdentity};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Complete in-process system under test
pub struct TestSystem {
    pub engine: Arc<QueueEngine>,
    pub hub: Arc<BroadcastHub>,
    pub store: Arc<InMemoryQueueStore>,
    pub metrics: Arc<MetricsCollector>,
}

/// Build an engine + hub + store wired the way the service wires them
pub fn create_test_system() -> TestSystem {
    let store = Arc::new(InMemoryQueueStore::new());
    let hub = Arc::new(BroadcastHub::new());
    let metrics = Arc::new(MetricsCollector::new().expect("Failed to create metrics collector"));
    let engine = Arc::new(QueueEngine::new(store.clone(), hub.clone(), metrics.clone()));

    TestSystem {
        engine,
        hub,
        store,
        metrics,
    }
}

/// Join request for a named walk-in guest
pub fn guest(name: &str) -> JoinRequest {
    JoinRequest {
        party: PartyIdentity {
            user_id: None,
            guest_name: Some(name.to_string()),
            phone_number: None,
        },
        party_size: 2,
    }
}

/// Join request identified by phone number
pub fn phone_party(phone: &str, size: u32) -> JoinRequest {
    JoinRequest {
        party: PartyIdentity {
            user_id: None,
            guest_name: None,
            phone_number: Some(phone.to_string()),
        },
        party_size: size,
    }
}

/// Captures every event the hub publishes for one venue
pub struct EventRecorder {
    events: Arc<Mutex<Vec<QueueEvent>>>,
    subscriber_id: SubscriberId,
}

impl EventRecorder {
    /// Subscribe to a venue and record events in the background
    pub fn attach(hub: &Arc<BroadcastHub>, venue_id: &str) -> Self {
        let subscription = hub
            .subscribe(venue_id, None, None)
            .expect("Failed to subscribe event recorder");
        let subscriber_id = subscription.id;
        let events = Arc::new(Mutex::new(Vec::new()));

        let sink = events.clone();
        let mut receiver = subscription.receiver;
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Ok(mut sink) = sink.lock() {
                    sink.push(event);
                }
            }
        });

        Self {
            events,
            subscriber_id,
        }
    }

    /// Snapshot of all recorded events
    pub fn events(&self) -> Vec<QueueEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Count recorded events with a given name
    pub fn count_events_of_type(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name == name).count()
    }

    /// Wait until at least `count` events of a type arrived, or panic
    pub async fn wait_for(&self, name: &str, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.count_events_of_type(name) >= count {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "Timed out waiting for {} {} events (saw {})",
            count,
            name,
            self.count_events_of_type(name)
        );
    }

    /// The recorder's own subscriber id (to exclude it from counts)
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }
}
