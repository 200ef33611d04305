//! Position engine for venue waitlists
//!
//! This module owns the queue lifecycle: it admits parties, keeps the
//! waiting set densely ordered (positions 1..N with no gaps), keeps every
//! entry's derived timing fields current, and pushes an event to the
//! broadcast hub for every state change. Mutations for one venue are
//! serialized through a per-venue async mutex; venues are fully
//! independent of each other.

use crate::error::{QueueError, Result};
use crate::hub::events::{
    QueueEvent, EVENT_POSITION_UPDATE, EVENT_QUEUE_CALLED, EVENT_QUEUE_EXPIRED, EVENT_QUEUE_JOINED,
    EVENT_QUEUE_LEFT, EVENT_QUEUE_NO_SHOW, EVENT_QUEUE_SEATED,
};
use crate::hub::BroadcastHub;
use crate::metrics::MetricsCollector;
use crate::queue::estimator;
use crate::store::QueueStore;
use crate::types::{
    CallOutcome, EntryId, EntryStatus, EntryStatusView, JoinOutcome, JoinRequest, PositionUpdate,
    QueueEntry, QueueSnapshot, QueueStatistics, VenueQueueSettings,
};
use crate::utils::{current_timestamp, generate_entry_id, seconds_after};
use chrono::{DateTime, Timelike, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Position at or below which a waiting party counts as ready
const READY_POSITION_THRESHOLD: u32 = 3;

/// The main position engine
pub struct QueueEngine {
    /// Persistence for entries and settings
    store: Arc<dyn QueueStore>,
    /// Fan-out for queue events
    hub: Arc<BroadcastHub>,
    /// Metrics collector for recording queue activity
    metrics: Arc<MetricsCollector>,
    /// Settings used for venues without a stored record
    default_settings: VenueQueueSettings,
    /// Per-venue serialization locks; the table itself is guarded briefly
    venue_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl QueueEngine {
    /// Create a new engine with default venue settings
    pub fn new(
        store: Arc<dyn QueueStore>,
        hub: Arc<BroadcastHub>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self::with_default_settings(store, hub, metrics, VenueQueueSettings::default())
    }

    /// Create a new engine with explicit fallback venue settings
    pub fn with_default_settings(
        store: Arc<dyn QueueStore>,
        hub: Arc<BroadcastHub>,
        metrics: Arc<MetricsCollector>,
        default_settings: VenueQueueSettings,
    ) -> Self {
        Self {
            store,
            hub,
            metrics,
            default_settings,
            venue_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Get the serialization lock for a venue, creating it on first use
    fn venue_lock(&self, venue_id: &str) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self.venue_locks.lock().map_err(|_| QueueError::Internal {
            message: "Failed to acquire venue lock table".to_string(),
        })?;
        Ok(locks.entry(venue_id.to_string()).or_default().clone())
    }

    /// Effective settings for a venue: stored record or engine defaults
    pub async fn settings(&self, venue_id: &str) -> Result<VenueQueueSettings> {
        Ok(self
            .store
            .get_settings(venue_id)
            .await?
            .unwrap_or_else(|| self.default_settings.clone()))
    }

    /// Admit a party into a venue's waitlist.
    ///
    /// The new entry lands at the tail, so only its own estimate needs
    /// computing; predecessors are unaffected.
    pub async fn join(&self, venue_id: &str, request: JoinRequest) -> Result<JoinOutcome> {
        let start_time = Instant::now();
        let lock = self.venue_lock(venue_id)?;
        let _guard = lock.lock().await;

        let settings = self.settings(venue_id).await?;
        let now = current_timestamp();

        if !request.party.is_identified() {
            return Err(QueueError::InvalidRequest {
                reason: "A user id, guest name, or phone number is required".to_string(),
            }
            .into());
        }
        if request.party_size == 0 {
            return Err(QueueError::InvalidRequest {
                reason: "partySize must be at least 1".to_string(),
            }
            .into());
        }
        if request.party_size > settings.max_party_size {
            return Err(QueueError::InvalidRequest {
                reason: format!(
                    "partySize {} exceeds venue maximum of {}",
                    request.party_size, settings.max_party_size
                ),
            }
            .into());
        }
        if !settings.is_open_at(now.hour()) {
            return Err(QueueError::InvalidRequest {
                reason: "Venue is closed".to_string(),
            }
            .into());
        }

        let entries = self.store.entries_for_venue(venue_id).await?;
        if entries
            .iter()
            .any(|e| e.is_active() && e.party.same_party(&request.party))
        {
            return Err(QueueError::DuplicateEntry {
                venue_id: venue_id.to_string(),
            }
            .into());
        }

        let waiting_before = count_waiting(&entries);
        let position = waiting_before as u32 + 1;
        let minutes =
            estimator::estimate_wait_minutes(&settings, position, waiting_before, now.hour());

        let entry = QueueEntry {
            id: generate_entry_id(),
            venue_id: venue_id.to_string(),
            party: request.party,
            party_size: request.party_size,
            position,
            status: EntryStatus::Waiting,
            joined_at: now,
            called_at: None,
            call_deadline: None,
            estimated_wait_minutes: minutes,
            estimated_seating_time: estimator::estimated_seating_time(now, minutes),
            notified: false,
        };

        self.store.insert_entry(entry.clone()).await?;

        let current_queue_size = waiting_before + 1;
        self.metrics.record_join(venue_id, current_queue_size);
        self.metrics.record_mutation_duration(start_time.elapsed());

        info!(
            "Party '{}' (size {}) joined venue {} at position {} (est. {} min)",
            entry.party.display_name(),
            entry.party_size,
            venue_id,
            entry.position,
            entry.estimated_wait_minutes
        );

        self.hub.publish(
            QueueEvent::new(
                EVENT_QUEUE_JOINED,
                venue_id,
                json!({ "entry": entry, "totalWaiting": current_queue_size }),
            )
            .for_entry(entry.id),
        );

        Ok(JoinOutcome {
            estimated_wait_minutes: entry.estimated_wait_minutes,
            estimated_seating_time: entry.estimated_seating_time,
            current_queue_size,
            entry,
        })
    }

    /// Voluntarily remove a party from the queue.
    ///
    /// Entries behind the removed one shift down by one position, each
    /// with a fresh estimate and a position_update event.
    pub async fn leave(&self, venue_id: &str, entry_id: EntryId) -> Result<QueueEntry> {
        let lock = self.venue_lock(venue_id)?;
        let _guard = lock.lock().await;

        let mut entry = self
            .store
            .get_entry(entry_id)
            .await?
            .filter(|e| e.venue_id == venue_id)
            .ok_or_else(|| QueueError::NotFound {
                what: format!("entry {} at venue {}", entry_id, venue_id),
            })?;

        if entry.status.is_terminal() {
            return Err(QueueError::InvalidState {
                reason: format!("entry {} is already {}", entry_id, entry.status),
            }
            .into());
        }

        let was_waiting = entry.status == EntryStatus::Waiting;
        let removed_position = entry.position;

        entry.status = EntryStatus::Cancelled;
        self.store.update_entry(entry.clone()).await?;

        let mut shifted = Vec::new();
        if was_waiting {
            shifted = self
                .reseat_after_removal(venue_id, removed_position)
                .await?;
        }

        let remaining = count_waiting(&self.store.entries_for_venue(venue_id).await?);
        self.metrics.record_transition("cancelled", venue_id, remaining);

        info!(
            "Party '{}' left venue {} from position {} ({} entries shifted)",
            entry.party.display_name(),
            venue_id,
            removed_position,
            shifted.len()
        );

        self.hub.publish(
            QueueEvent::new(EVENT_QUEUE_LEFT, venue_id, json!({ "entry": entry }))
                .for_entry(entry.id),
        );
        self.publish_position_updates(&shifted);

        Ok(entry)
    }

    /// Call the next `count` waiting parties to be seated.
    ///
    /// Returns however many are available; errors only when the queue is
    /// completely empty. Called entries get a confirmation deadline, and
    /// the remaining waiting set is renumbered immediately so clients see
    /// the gap close.
    pub async fn call_next(&self, venue_id: &str, count: usize) -> Result<CallOutcome> {
        let lock = self.venue_lock(venue_id)?;
        let _guard = lock.lock().await;

        let settings = self.settings(venue_id).await?;
        let entries = self.store.entries_for_venue(venue_id).await?;
        let waiting = waiting_sorted(&entries);

        if waiting.is_empty() {
            return Err(QueueError::QueueEmpty {
                venue_id: venue_id.to_string(),
            }
            .into());
        }

        let take = count.max(1).min(waiting.len());
        let now = current_timestamp();
        let deadline = seconds_after(now, settings.called_timeout_seconds);

        let mut called = Vec::with_capacity(take);
        for mut entry in waiting.iter().take(take).cloned() {
            entry.status = EntryStatus::Called;
            entry.called_at = Some(now);
            entry.call_deadline = Some(deadline);
            self.store.update_entry(entry.clone()).await?;
            called.push(entry);
        }

        // Close the gap for everyone still waiting
        let mut repositioned = Vec::new();
        let remaining: Vec<QueueEntry> = waiting.iter().skip(take).cloned().collect();
        let remaining_count = remaining.len();
        for (index, mut entry) in remaining.into_iter().enumerate() {
            let new_position = index as u32 + 1;
            if entry.position != new_position {
                entry.position = new_position;
                self.apply_estimate(&mut entry, &settings, remaining_count, now);
                self.store.update_entry(entry.clone()).await?;
                repositioned.push(entry);
            }
        }

        self.metrics
            .record_transition("called", venue_id, remaining_count);

        info!(
            "Called {} parties at venue {} (deadline {}, {} still waiting)",
            called.len(),
            venue_id,
            deadline,
            remaining_count
        );

        for entry in &called {
            self.hub.publish(
                QueueEvent::new(EVENT_QUEUE_CALLED, venue_id, json!({ "entry": entry }))
                    .for_entry(entry.id),
            );
        }
        self.publish_position_updates(&repositioned);

        Ok(CallOutcome {
            called_entries: called,
            remaining_queue_size: remaining_count,
        })
    }

    /// Confirm a called party was seated (terminal)
    pub async fn mark_seated(&self, entry_id: EntryId) -> Result<QueueEntry> {
        self.finish_called_entry(entry_id, EntryStatus::Seated, EVENT_QUEUE_SEATED, "seated")
            .await
    }

    /// Record that a called party never showed up (terminal)
    pub async fn mark_no_show(&self, entry_id: EntryId) -> Result<QueueEntry> {
        self.finish_called_entry(entry_id, EntryStatus::NoShow, EVENT_QUEUE_NO_SHOW, "no_show")
            .await
    }

    /// Shared terminal transition for entries that must currently be Called
    async fn finish_called_entry(
        &self,
        entry_id: EntryId,
        to_status: EntryStatus,
        event_name: &'static str,
        transition: &str,
    ) -> Result<QueueEntry> {
        let found = self
            .store
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| QueueError::NotFound {
                what: format!("entry {}", entry_id),
            })?;

        let lock = self.venue_lock(&found.venue_id)?;
        let _guard = lock.lock().await;

        // Re-read under the venue lock; another staff action may have won
        let mut entry = self
            .store
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| QueueError::NotFound {
                what: format!("entry {}", entry_id),
            })?;

        if entry.status != EntryStatus::Called {
            return Err(QueueError::InvalidState {
                reason: format!(
                    "entry {} is {}, expected called",
                    entry_id, entry.status
                ),
            }
            .into());
        }

        entry.status = to_status;
        self.store.update_entry(entry.clone()).await?;

        let waiting = count_waiting(&self.store.entries_for_venue(&entry.venue_id).await?);
        self.metrics
            .record_transition(transition, &entry.venue_id, waiting);

        info!(
            "Party '{}' at venue {} marked {}",
            entry.party.display_name(),
            entry.venue_id,
            entry.status
        );

        self.hub.publish(
            QueueEvent::new(event_name, entry.venue_id.clone(), json!({ "entry": entry }))
                .for_entry(entry.id),
        );

        Ok(entry)
    }

    /// Set the almost-ready flag on a waiting entry.
    ///
    /// Returns true only for the caller that flips the flag, making the
    /// almost_ready notification one-shot across concurrent sessions.
    pub async fn mark_notified(&self, entry_id: EntryId) -> Result<bool> {
        let found = self
            .store
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| QueueError::NotFound {
                what: format!("entry {}", entry_id),
            })?;

        let lock = self.venue_lock(&found.venue_id)?;
        let _guard = lock.lock().await;

        let mut entry = match self.store.get_entry(entry_id).await? {
            Some(entry) => entry,
            None => return Ok(false),
        };

        if entry.status != EntryStatus::Waiting || entry.notified {
            return Ok(false);
        }

        entry.notified = true;
        self.store.update_entry(entry).await?;
        Ok(true)
    }

    /// Expire every called entry whose confirmation deadline has passed.
    ///
    /// This is the only transition the engine performs on its own clock.
    /// Store failures are logged and retried on the next sweep tick.
    pub async fn expire_overdue(&self) -> Result<usize> {
        let venues = self.store.venues().await?;
        let now = current_timestamp();
        let mut expired_total = 0;

        for venue_id in venues {
            match self.expire_venue(&venue_id, now).await {
                Ok(expired) => expired_total += expired,
                Err(e) => {
                    warn!(
                        "Expiry sweep failed for venue {} (will retry next tick): {}",
                        venue_id, e
                    );
                }
            }
        }

        if expired_total > 0 {
            info!("Expiry sweep moved {} overdue entries to expired", expired_total);
        }
        Ok(expired_total)
    }

    /// Expire overdue called entries for a single venue
    async fn expire_venue(&self, venue_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let lock = self.venue_lock(venue_id)?;
        let _guard = lock.lock().await;

        let entries = self.store.entries_for_venue(venue_id).await?;
        let overdue: Vec<QueueEntry> = entries
            .into_iter()
            .filter(|e| {
                e.status == EntryStatus::Called
                    && e.call_deadline.map(|d| d < now).unwrap_or(false)
            })
            .collect();

        if overdue.is_empty() {
            return Ok(0);
        }

        let mut expired = 0;
        for mut entry in overdue {
            entry.status = EntryStatus::Expired;
            self.store.update_entry(entry.clone()).await?;
            expired += 1;

            debug!(
                "Expired called entry {} at venue {} (deadline {:?})",
                entry.id, venue_id, entry.call_deadline
            );

            self.hub.publish(
                QueueEvent::new(EVENT_QUEUE_EXPIRED, venue_id, json!({ "entry": entry }))
                    .for_entry(entry.id),
            );
        }

        let waiting = count_waiting(&self.store.entries_for_venue(venue_id).await?);
        self.metrics.record_transition("expired", venue_id, waiting);

        Ok(expired)
    }

    /// Full current state of a venue's queue
    pub async fn snapshot(&self, venue_id: &str) -> Result<QueueSnapshot> {
        let lock = self.venue_lock(venue_id)?;
        let _guard = lock.lock().await;

        let settings = self.settings(venue_id).await?;
        let entries = self.store.entries_for_venue(venue_id).await?;
        let stats = compute_statistics(&entries);

        let mut visible = waiting_sorted(&entries);
        let mut called: Vec<QueueEntry> = entries
            .iter()
            .filter(|e| e.status == EntryStatus::Called)
            .cloned()
            .collect();
        called.sort_by_key(|e| e.called_at);
        visible.extend(called);

        Ok(QueueSnapshot {
            venue_id: venue_id.to_string(),
            entries: visible,
            total_waiting: stats.total_waiting,
            total_called: stats.total_called,
            avg_wait_minutes: stats.avg_wait_minutes,
            settings,
        })
    }

    /// Live status view for a single entry
    pub async fn entry_status(&self, entry_id: EntryId) -> Result<EntryStatusView> {
        let entry = self
            .store
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| QueueError::NotFound {
                what: format!("entry {}", entry_id),
            })?;

        let is_ready = entry.status == EntryStatus::Called
            || (entry.status == EntryStatus::Waiting
                && entry.position <= READY_POSITION_THRESHOLD);

        Ok(EntryStatusView {
            current_position: entry.position,
            estimated_wait_minutes: entry.estimated_wait_minutes,
            parties_ahead: entry.parties_ahead(),
            is_ready,
            entry,
        })
    }

    /// Derived statistics for a venue
    pub async fn statistics(&self, venue_id: &str) -> Result<QueueStatistics> {
        let lock = self.venue_lock(venue_id)?;
        let _guard = lock.lock().await;

        let entries = self.store.entries_for_venue(venue_id).await?;
        Ok(compute_statistics(&entries))
    }

    /// Replace a venue's settings and refresh every waiting estimate
    pub async fn update_settings(
        &self,
        venue_id: &str,
        settings: VenueQueueSettings,
    ) -> Result<VenueQueueSettings> {
        settings.validate()?;

        let lock = self.venue_lock(venue_id)?;
        let _guard = lock.lock().await;

        self.store.put_settings(venue_id, settings.clone()).await?;

        // Estimates derive from service time and capacity, so refresh the
        // whole waiting set under the new settings
        let entries = self.store.entries_for_venue(venue_id).await?;
        let waiting = waiting_sorted(&entries);
        let waiting_count = waiting.len();
        let now = current_timestamp();

        let mut refreshed = Vec::new();
        for mut entry in waiting {
            self.apply_estimate(&mut entry, &settings, waiting_count, now);
            self.store.update_entry(entry.clone()).await?;
            refreshed.push(entry);
        }

        info!(
            "Updated settings for venue {} ({} waiting estimates refreshed)",
            venue_id, waiting_count
        );
        self.publish_position_updates(&refreshed);

        Ok(settings)
    }

    /// Shift waiting entries behind a removed position down by one
    async fn reseat_after_removal(
        &self,
        venue_id: &str,
        removed_position: u32,
    ) -> Result<Vec<QueueEntry>> {
        let settings = self.settings(venue_id).await?;
        let entries = self.store.entries_for_venue(venue_id).await?;
        let waiting = waiting_sorted(&entries);
        let waiting_count = waiting.len();
        let now = current_timestamp();

        let mut shifted = Vec::new();
        for mut entry in waiting {
            if entry.position > removed_position {
                entry.position -= 1;
                self.apply_estimate(&mut entry, &settings, waiting_count, now);
                self.store.update_entry(entry.clone()).await?;
                shifted.push(entry);
            }
        }

        Ok(shifted)
    }

    /// Recompute an entry's derived timing fields in place
    fn apply_estimate(
        &self,
        entry: &mut QueueEntry,
        settings: &VenueQueueSettings,
        queue_size: usize,
        now: DateTime<Utc>,
    ) {
        let minutes =
            estimator::estimate_wait_minutes(settings, entry.position, queue_size, now.hour());
        entry.estimated_wait_minutes = minutes;
        entry.estimated_seating_time = estimator::estimated_seating_time(now, minutes);
    }

    /// Emit a position_update event for each re-ranked entry
    fn publish_position_updates(&self, entries: &[QueueEntry]) {
        for entry in entries {
            self.hub.publish(
                QueueEvent::new(
                    EVENT_POSITION_UPDATE,
                    entry.venue_id.clone(),
                    PositionUpdate::from_entry(entry),
                )
                .for_entry(entry.id),
            );
        }
    }
}

/// Waiting entries sorted by position
fn waiting_sorted(entries: &[QueueEntry]) -> Vec<QueueEntry> {
    let mut waiting: Vec<QueueEntry> = entries
        .iter()
        .filter(|e| e.status == EntryStatus::Waiting)
        .cloned()
        .collect();
    waiting.sort_by_key(|e| e.position);
    waiting
}

fn count_waiting(entries: &[QueueEntry]) -> usize {
    entries
        .iter()
        .filter(|e| e.status == EntryStatus::Waiting)
        .count()
}

/// Derived counts over the current waiting/called sets
fn compute_statistics(entries: &[QueueEntry]) -> QueueStatistics {
    let waiting: Vec<&QueueEntry> = entries
        .iter()
        .filter(|e| e.status == EntryStatus::Waiting)
        .collect();
    let total_called = entries
        .iter()
        .filter(|e| e.status == EntryStatus::Called)
        .count();

    let avg_wait_minutes = if waiting.is_empty() {
        0
    } else {
        let sum: u64 = waiting.iter().map(|e| e.estimated_wait_minutes as u64).sum();
        (sum as f64 / waiting.len() as f64).round() as u32
    };

    QueueStatistics {
        total_waiting: waiting.len(),
        total_called,
        avg_wait_minutes,
    }
}
