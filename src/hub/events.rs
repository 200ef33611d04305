//! Queue event definitions
//!
//! Events fan out from the hub to every stream session subscribed to the
//! affected venue. The name doubles as the SSE event name on the wire.

use crate::types::{EntryId, VenueId};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

/// SSE event names
pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_INITIAL_STATE: &str = "initial_state";
pub const EVENT_POSITION_UPDATE: &str = "position_update";
pub const EVENT_ALMOST_READY: &str = "almost_ready";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_QUEUE_JOINED: &str = "queue_joined";
pub const EVENT_QUEUE_LEFT: &str = "queue_left";
pub const EVENT_QUEUE_CALLED: &str = "queue_called";
pub const EVENT_QUEUE_SEATED: &str = "queue_seated";
pub const EVENT_QUEUE_NO_SHOW: &str = "queue_no_show";
pub const EVENT_QUEUE_EXPIRED: &str = "queue_expired";

/// A single queue event with its JSON payload
#[derive(Debug, Clone, Serialize)]
pub struct QueueEvent {
    /// SSE event name
    pub name: &'static str,
    pub venue_id: VenueId,
    /// Set when the event addresses one specific entry
    pub entry_id: Option<EntryId>,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl QueueEvent {
    /// Create an event for a venue with a serializable payload
    pub fn new(name: &'static str, venue_id: impl Into<VenueId>, payload: impl Serialize) -> Self {
        let payload = serde_json::to_value(payload).unwrap_or_else(|e| {
            warn!("Failed to serialize {} event payload: {}", name, e);
            serde_json::Value::Null
        });

        Self {
            name,
            venue_id: venue_id.into(),
            entry_id: None,
            timestamp: current_timestamp(),
            payload,
        }
    }

    /// Tag the event as addressed to a specific entry
    pub fn for_entry(mut self, entry_id: EntryId) -> Self {
        self.entry_id = Some(entry_id);
        self
    }

    /// JSON string sent as the SSE data line
    pub fn data(&self) -> String {
        self.payload.to_string()
    }
}
