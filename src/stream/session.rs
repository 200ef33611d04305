//! Stream session lifecycle
//!
//! One session per SSE connection. On open the session sends a connected
//! ack, a full snapshot of the venue's queue, and (when bound to an entry)
//! an immediate position update. While open it multiplexes hub events with
//! its own heartbeat and position-refresh timers, whichever fires first.
//! The session detects transport close when a send into the response
//! channel fails, and unregisters from the hub exactly once on loop exit.

use crate::hub::events::{
    QueueEvent, EVENT_ALMOST_READY, EVENT_CONNECTED, EVENT_HEARTBEAT, EVENT_INITIAL_STATE,
    EVENT_POSITION_UPDATE,
};
use crate::hub::BroadcastHub;
use crate::metrics::MetricsCollector;
use crate::queue::QueueEngine;
use crate::types::{EntryId, EntryStatus, PositionUpdate, VenueId};
use crate::utils::current_timestamp;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// Timer and threshold settings for a stream session
#[derive(Debug, Clone)]
pub struct StreamSessionConfig {
    /// Interval between heartbeat events
    pub heartbeat_interval: Duration,
    /// Interval between personalized position refreshes
    pub position_refresh_interval: Duration,
    /// Position at or below which a waiting party is notified once
    pub almost_ready_threshold: u32,
}

impl Default for StreamSessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            position_refresh_interval: Duration::from_secs(30),
            almost_ready_threshold: 3,
        }
    }
}

/// A single client's live view of one venue's queue
pub struct StreamSession {
    venue_id: VenueId,
    entry_id: Option<EntryId>,
    user_id: Option<String>,
    engine: Arc<QueueEngine>,
    hub: Arc<BroadcastHub>,
    metrics: Arc<MetricsCollector>,
    config: StreamSessionConfig,
}

impl StreamSession {
    /// Create a session for a venue, optionally bound to an entry and/or
    /// a user identity
    pub fn new(
        engine: Arc<QueueEngine>,
        hub: Arc<BroadcastHub>,
        metrics: Arc<MetricsCollector>,
        venue_id: impl Into<VenueId>,
        entry_id: Option<EntryId>,
        user_id: Option<String>,
        config: StreamSessionConfig,
    ) -> Self {
        Self {
            venue_id: venue_id.into(),
            entry_id,
            user_id,
            engine,
            hub,
            metrics,
            config,
        }
    }

    /// Drive the session until the client disconnects or the hub closes.
    ///
    /// Cleanup happens exactly once at loop exit regardless of which side
    /// ended the connection.
    pub async fn run(self, out: mpsc::Sender<QueueEvent>) {
        let subscription =
            match self
                .hub
                .subscribe(&self.venue_id, self.entry_id, self.user_id.clone())
            {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!("Failed to subscribe stream session: {}", e);
                    return;
                }
            };
        let subscriber_id = subscription.id;

        self.metrics.record_session_opened();
        info!(
            "Stream session opened for venue {} (entry: {:?}, user: {:?})",
            self.venue_id, self.entry_id, self.user_id
        );

        self.drive(subscription.receiver, &out).await;

        self.hub.unsubscribe(subscriber_id);
        self.metrics.record_session_closed();
        info!("Stream session closed for venue {}", self.venue_id);
    }

    /// Initial burst plus the multiplexed send loop
    async fn drive(&self, mut hub_events: mpsc::UnboundedReceiver<QueueEvent>, out: &mpsc::Sender<QueueEvent>) {
        let connected = QueueEvent::new(
            EVENT_CONNECTED,
            self.venue_id.clone(),
            json!({
                "venueId": self.venue_id,
                "entryId": self.entry_id,
                "timestamp": current_timestamp(),
            }),
        );
        if !self.forward(out, connected).await {
            return;
        }

        match self.engine.snapshot(&self.venue_id).await {
            Ok(snapshot) => {
                let initial = QueueEvent::new(EVENT_INITIAL_STATE, self.venue_id.clone(), snapshot);
                if !self.forward(out, initial).await {
                    return;
                }
            }
            Err(e) => {
                warn!(
                    "Failed to build initial snapshot for venue {}: {}",
                    self.venue_id, e
                );
                return;
            }
        }

        if let Some(entry_id) = self.entry_id {
            if !self.send_position_refresh(out, entry_id).await {
                return;
            }
        }

        let mut heartbeat = interval_at(
            Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        let mut refresh = interval_at(
            Instant::now() + self.config.position_refresh_interval,
            self.config.position_refresh_interval,
        );

        loop {
            tokio::select! {
                event = hub_events.recv() => {
                    match event {
                        Some(event) => {
                            if !self.forward(out, event).await {
                                break;
                            }
                        }
                        None => {
                            debug!("Hub channel closed for venue {}", self.venue_id);
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    let event = QueueEvent::new(
                        EVENT_HEARTBEAT,
                        self.venue_id.clone(),
                        json!({ "timestamp": current_timestamp() }),
                    );
                    if !self.forward(out, event).await {
                        break;
                    }
                }
                _ = refresh.tick(), if self.entry_id.is_some() => {
                    if let Some(entry_id) = self.entry_id {
                        if !self.send_position_refresh(out, entry_id).await {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Re-poll the bound entry and emit a position_update, plus a one-shot
    /// almost_ready the first time the party is waiting at or below the
    /// threshold. Returns false when the client is gone.
    async fn send_position_refresh(&self, out: &mpsc::Sender<QueueEvent>, entry_id: EntryId) -> bool {
        let view = match self.engine.entry_status(entry_id).await {
            Ok(view) => view,
            Err(e) => {
                // Entry may have been removed; venue-wide events still flow
                debug!("Position refresh skipped for entry {}: {}", entry_id, e);
                return true;
            }
        };

        let update = QueueEvent::new(
            EVENT_POSITION_UPDATE,
            self.venue_id.clone(),
            PositionUpdate::from_entry(&view.entry),
        )
        .for_entry(entry_id);
        if !self.forward(out, update).await {
            return false;
        }

        if view.entry.status == EntryStatus::Waiting
            && view.current_position <= self.config.almost_ready_threshold
        {
            match self.engine.mark_notified(entry_id).await {
                Ok(true) => {
                    let event = QueueEvent::new(
                        EVENT_ALMOST_READY,
                        self.venue_id.clone(),
                        json!({
                            "entryId": entry_id,
                            "position": view.current_position,
                            "estimatedWaitMinutes": view.estimated_wait_minutes,
                        }),
                    )
                    .for_entry(entry_id);
                    if !self.forward(out, event).await {
                        return false;
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    debug!("Almost-ready check failed for entry {}: {}", entry_id, e);
                }
            }
        }

        true
    }

    /// Push one event to the client; false means the transport is closed
    async fn forward(&self, out: &mpsc::Sender<QueueEvent>, event: QueueEvent) -> bool {
        match out.send(event).await {
            Ok(()) => {
                self.metrics.record_event_forwarded();
                true
            }
            Err(_) => {
                debug!(
                    "Client for venue {} disconnected, ending session",
                    self.venue_id
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::events::EVENT_QUEUE_CALLED;
    use crate::store::InMemoryQueueStore;
    use crate::types::{JoinRequest, PartyIdentity};
    use tokio::time::{sleep, timeout};

    fn fast_config() -> StreamSessionConfig {
        StreamSessionConfig {
            heartbeat_interval: Duration::from_millis(40),
            position_refresh_interval: Duration::from_millis(25),
            almost_ready_threshold: 3,
        }
    }

    struct TestSystem {
        engine: Arc<QueueEngine>,
        hub: Arc<BroadcastHub>,
        metrics: Arc<MetricsCollector>,
    }

    fn create_test_system() -> TestSystem {
        let store = Arc::new(InMemoryQueueStore::new());
        let hub = Arc::new(BroadcastHub::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let engine = Arc::new(QueueEngine::new(store, hub.clone(), metrics.clone()));
        TestSystem {
            engine,
            hub,
            metrics,
        }
    }

    fn guest(name: &str) -> JoinRequest {
        JoinRequest {
            party: PartyIdentity {
                user_id: None,
                guest_name: Some(name.to_string()),
                phone_number: None,
            },
            party_size: 2,
        }
    }

    fn spawn_session(
        system: &TestSystem,
        entry_id: Option<EntryId>,
    ) -> mpsc::Receiver<QueueEvent> {
        let (tx, rx) = mpsc::channel(64);
        let session = StreamSession::new(
            system.engine.clone(),
            system.hub.clone(),
            system.metrics.clone(),
            "venue-1",
            entry_id,
            None,
            fast_config(),
        );
        tokio::spawn(session.run(tx));
        rx
    }

    #[tokio::test]
    async fn test_initial_event_sequence_for_bound_entry() {
        let system = create_test_system();
        let outcome = system.engine.join("venue-1", guest("Alex")).await.unwrap();

        let mut rx = spawn_session(&system, Some(outcome.entry.id));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.name, EVENT_CONNECTED);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.name, EVENT_INITIAL_STATE);
        assert_eq!(second.payload["totalWaiting"], 1);

        let third = rx.recv().await.unwrap();
        assert_eq!(third.name, EVENT_POSITION_UPDATE);
        assert_eq!(third.payload["position"], 1);
    }

    #[tokio::test]
    async fn test_unbound_session_gets_no_initial_position() {
        let system = create_test_system();
        system.engine.join("venue-1", guest("Alex")).await.unwrap();

        let mut rx = spawn_session(&system, None);

        assert_eq!(rx.recv().await.unwrap().name, EVENT_CONNECTED);
        assert_eq!(rx.recv().await.unwrap().name, EVENT_INITIAL_STATE);

        // Next scheduled event is a heartbeat, not a position update
        let next = timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.name, EVENT_HEARTBEAT);
    }

    #[tokio::test]
    async fn test_heartbeats_keep_coming() {
        let system = create_test_system();
        let mut rx = spawn_session(&system, None);

        let mut heartbeats = 0;
        while heartbeats < 3 {
            let event = timeout(Duration::from_millis(500), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if event.name == EVENT_HEARTBEAT {
                heartbeats += 1;
            }
        }
    }

    #[tokio::test]
    async fn test_hub_events_are_forwarded() {
        let system = create_test_system();
        let outcome = system.engine.join("venue-1", guest("Alex")).await.unwrap();

        let mut rx = spawn_session(&system, None);
        assert_eq!(rx.recv().await.unwrap().name, EVENT_CONNECTED);
        assert_eq!(rx.recv().await.unwrap().name, EVENT_INITIAL_STATE);

        system.engine.call_next("venue-1", 1).await.unwrap();

        loop {
            let event = timeout(Duration::from_millis(500), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if event.name == EVENT_QUEUE_CALLED {
                assert_eq!(event.entry_id, Some(outcome.entry.id));
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_almost_ready_fires_once() {
        let system = create_test_system();
        let outcome = system.engine.join("venue-1", guest("Alex")).await.unwrap();

        let mut rx = spawn_session(&system, Some(outcome.entry.id));

        // Initial refresh already qualifies at position 1
        let mut almost_ready = 0;
        let deadline = Instant::now() + Duration::from_millis(300);
        while Instant::now() < deadline {
            match timeout(Duration::from_millis(100), rx.recv()).await {
                Ok(Some(event)) if event.name == EVENT_ALMOST_READY => almost_ready += 1,
                Ok(Some(_)) => {}
                _ => break,
            }
        }

        assert_eq!(almost_ready, 1);
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_from_hub() {
        let system = create_test_system();

        let rx = spawn_session(&system, None);
        // Give the session a moment to subscribe
        sleep(Duration::from_millis(30)).await;
        assert_eq!(system.hub.subscriber_count("venue-1"), 1);

        drop(rx);

        // The session notices the closed transport on its next send
        let deadline = Instant::now() + Duration::from_secs(2);
        while system.hub.subscriber_count("venue-1") > 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(system.hub.subscriber_count("venue-1"), 0);
        assert_eq!(system.hub.total_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_repeated_connect_disconnect_returns_to_baseline() {
        let system = create_test_system();

        for _ in 0..5 {
            let rx = spawn_session(&system, None);
            sleep(Duration::from_millis(20)).await;
            drop(rx);
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        while system.hub.total_subscribers() > 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(system.hub.total_subscribers(), 0);
        assert_eq!(system.metrics.stream().active_sessions.get(), 0);
    }
}
