//! Queue storage interface and implementations
//!
//! This module defines the interface for persisting and retrieving queue
//! entries and per-venue settings, with an in-memory implementation. The
//! store serializes its own writes; entry insertion order under concurrent
//! joins is decided here, never re-derived by the engine.

use crate::error::{QueueError, Result};
use crate::types::{EntryId, QueueEntry, VenueId, VenueQueueSettings};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Trait for queue persistence operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a newly created entry
    async fn insert_entry(&self, entry: QueueEntry) -> Result<()>;

    /// Persist changes to an existing entry
    async fn update_entry(&self, entry: QueueEntry) -> Result<()>;

    /// Fetch a single entry by id
    async fn get_entry(&self, entry_id: EntryId) -> Result<Option<QueueEntry>>;

    /// Fetch all entries for a venue, in insertion order
    async fn entries_for_venue(&self, venue_id: &str) -> Result<Vec<QueueEntry>>;

    /// List venues that have at least one stored entry
    async fn venues(&self) -> Result<Vec<VenueId>>;

    /// Fetch stored settings for a venue, if any
    async fn get_settings(&self, venue_id: &str) -> Result<Option<VenueQueueSettings>>;

    /// Store or replace settings for a venue
    async fn put_settings(&self, venue_id: &str, settings: VenueQueueSettings) -> Result<()>;

    /// Cheap connectivity probe for health checks
    async fn ping(&self) -> Result<()>;
}

/// In-memory queue store implementation
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    entries: RwLock<HashMap<EntryId, QueueEntry>>,
    /// Insertion order per venue; this is the arrival-order tiebreak
    order: RwLock<HashMap<VenueId, Vec<EntryId>>>,
    settings: RwLock<HashMap<VenueId, VenueQueueSettings>>,
}

impl InMemoryQueueStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored entries, across venues (for tests/monitoring)
    pub fn entry_count(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}

fn store_lock_error(what: &str) -> anyhow::Error {
    QueueError::StoreUnavailable {
        message: format!("Failed to acquire {} lock", what),
    }
    .into()
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn insert_entry(&self, entry: QueueEntry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| store_lock_error("entries"))?;
        let mut order = self.order.write().map_err(|_| store_lock_error("order"))?;

        order
            .entry(entry.venue_id.clone())
            .or_default()
            .push(entry.id);
        entries.insert(entry.id, entry);
        Ok(())
    }

    async fn update_entry(&self, entry: QueueEntry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| store_lock_error("entries"))?;

        if !entries.contains_key(&entry.id) {
            return Err(QueueError::NotFound {
                what: format!("entry {}", entry.id),
            }
            .into());
        }

        entries.insert(entry.id, entry);
        Ok(())
    }

    async fn get_entry(&self, entry_id: EntryId) -> Result<Option<QueueEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| store_lock_error("entries"))?;
        Ok(entries.get(&entry_id).cloned())
    }

    async fn entries_for_venue(&self, venue_id: &str) -> Result<Vec<QueueEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| store_lock_error("entries"))?;
        let order = self.order.read().map_err(|_| store_lock_error("order"))?;

        let ids = match order.get(venue_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };

        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id).cloned())
            .collect())
    }

    async fn venues(&self) -> Result<Vec<VenueId>> {
        let order = self.order.read().map_err(|_| store_lock_error("order"))?;
        Ok(order.keys().cloned().collect())
    }

    async fn get_settings(&self, venue_id: &str) -> Result<Option<VenueQueueSettings>> {
        let settings = self
            .settings
            .read()
            .map_err(|_| store_lock_error("settings"))?;
        Ok(settings.get(venue_id).cloned())
    }

    async fn put_settings(&self, venue_id: &str, value: VenueQueueSettings) -> Result<()> {
        let mut settings = self
            .settings
            .write()
            .map_err(|_| store_lock_error("settings"))?;
        settings.insert(venue_id.to_string(), value);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.entries
            .read()
            .map(|_| ())
            .map_err(|_| store_lock_error("entries"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryStatus, PartyIdentity};
    use crate::utils::{current_timestamp, generate_entry_id};

    fn make_entry(venue_id: &str, name: &str) -> QueueEntry {
        let now = current_timestamp();
        QueueEntry {
            id: generate_entry_id(),
            venue_id: venue_id.to_string(),
            party: PartyIdentity {
                user_id: None,
                guest_name: Some(name.to_string()),
                phone_number: None,
            },
            party_size: 2,
            position: 1,
            status: EntryStatus::Waiting,
            joined_at: now,
            called_at: None,
            call_deadline: None,
            estimated_wait_minutes: 0,
            estimated_seating_time: now,
            notified: false,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryQueueStore::new();
        let entry = make_entry("venue-1", "Alex");
        let id = entry.id;

        store.insert_entry(entry).await.unwrap();

        let fetched = store.get_entry(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.venue_id, "venue-1");

        let missing = store.get_entry(generate_entry_id()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_entries_preserve_insertion_order() {
        let store = InMemoryQueueStore::new();
        let first = make_entry("venue-1", "Alex");
        let second = make_entry("venue-1", "Sam");
        let other_venue = make_entry("venue-2", "Kit");

        store.insert_entry(first.clone()).await.unwrap();
        store.insert_entry(second.clone()).await.unwrap();
        store.insert_entry(other_venue).await.unwrap();

        let entries = store.entries_for_venue("venue-1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, first.id);
        assert_eq!(entries[1].id, second.id);
    }

    #[tokio::test]
    async fn test_update_unknown_entry_fails() {
        let store = InMemoryQueueStore::new();
        let entry = make_entry("venue-1", "Alex");

        let err = store.update_entry(entry).await.unwrap_err();
        let queue_err = err.downcast_ref::<QueueError>().unwrap();
        assert_eq!(queue_err.kind(), "not_found");
    }

    #[test]
    fn test_settings_round_trip() {
        tokio_test::block_on(async {
            let store = InMemoryQueueStore::new();
            assert!(store.get_settings("venue-1").await.unwrap().is_none());

            let mut settings = VenueQueueSettings::default();
            settings.max_party_size = 12;
            store
                .put_settings("venue-1", settings.clone())
                .await
                .unwrap();

            let fetched = store.get_settings("venue-1").await.unwrap().unwrap();
            assert_eq!(fetched.max_party_size, 12);
        });
    }

    #[tokio::test]
    async fn test_venues_listing() {
        let store = InMemoryQueueStore::new();
        store.insert_entry(make_entry("venue-1", "Alex")).await.unwrap();
        store.insert_entry(make_entry("venue-2", "Sam")).await.unwrap();

        let mut venues = store.venues().await.unwrap();
        venues.sort();
        assert_eq!(venues, vec!["venue-1", "venue-2"]);
    }
}
