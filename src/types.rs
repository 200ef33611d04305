//! Common types used throughout the waitlist service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for venues
pub type VenueId = String;

/// Unique identifier for queue entries
pub type EntryId = Uuid;

/// Lifecycle state of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Waiting,
    Called,
    Seated,
    Cancelled,
    Expired,
    NoShow,
}

impl EntryStatus {
    /// Whether the entry still occupies a place in the queue
    pub fn is_active(&self) -> bool {
        matches!(self, EntryStatus::Waiting | EntryStatus::Called)
    }

    /// Whether the entry has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStatus::Waiting => write!(f, "waiting"),
            EntryStatus::Called => write!(f, "called"),
            EntryStatus::Seated => write!(f, "seated"),
            EntryStatus::Cancelled => write!(f, "cancelled"),
            EntryStatus::Expired => write!(f, "expired"),
            EntryStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// Who is waiting: a registered user id, or a walk-in guest identified by
/// name and/or phone number. At least one field must be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl PartyIdentity {
    /// Check that at least one identity field is present
    pub fn is_identified(&self) -> bool {
        self.user_id.is_some() || self.guest_name.is_some() || self.phone_number.is_some()
    }

    /// Whether two identities refer to the same party.
    ///
    /// User id wins when both sides carry one; phone number is the next
    /// strongest signal; guest name alone is the weakest match.
    pub fn same_party(&self, other: &PartyIdentity) -> bool {
        if let (Some(a), Some(b)) = (&self.user_id, &other.user_id) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.phone_number, &other.phone_number) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.guest_name, &other.guest_name) {
            return a == b;
        }
        false
    }

    /// Best available label for log lines
    pub fn display_name(&self) -> &str {
        self.guest_name
            .as_deref()
            .or(self.user_id.as_deref())
            .or(self.phone_number.as_deref())
            .unwrap_or("unknown")
    }
}

/// One party's place in a venue's waitlist
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: EntryId,
    pub venue_id: VenueId,
    pub party: PartyIdentity,
    pub party_size: u32,
    /// 1-based rank among currently-waiting entries. Recomputed by the
    /// engine; non-waiting entries keep their last value as history.
    pub position: u32,
    pub status: EntryStatus,
    pub joined_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub called_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_deadline: Option<DateTime<Utc>>,
    pub estimated_wait_minutes: u32,
    pub estimated_seating_time: DateTime<Utc>,
    /// Whether an almost-ready notification was already sent for this entry
    pub notified: bool,
}

impl QueueEntry {
    /// Whether the entry still occupies a place in the queue
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Number of waiting parties ahead of this one (0 when not waiting)
    pub fn parties_ahead(&self) -> u32 {
        if self.status == EntryStatus::Waiting {
            self.position.saturating_sub(1)
        } else {
            0
        }
    }
}

/// Per-venue queue configuration, supplied by the settings store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VenueQueueSettings {
    /// Average minutes one table occupies a seat
    pub avg_service_minutes: u32,
    /// Number of tables that can be served concurrently
    pub seating_capacity: u32,
    /// Largest party the venue accepts into the queue
    pub max_party_size: u32,
    /// Opening hour, 0-23 (UTC)
    pub open_hour: u32,
    /// Closing hour, 1-24 (UTC); may wrap past midnight
    pub close_hour: u32,
    /// Hours treated as rush periods by the estimator
    pub peak_hours: Vec<u32>,
    /// Hours treated as quiet periods by the estimator
    pub off_peak_hours: Vec<u32>,
    /// How long a called party may take to confirm before expiring
    pub called_timeout_seconds: u64,
}

impl Default for VenueQueueSettings {
    fn default() -> Self {
        Self {
            avg_service_minutes: 15,
            seating_capacity: 10,
            max_party_size: 8,
            open_hour: 0,
            close_hour: 24,
            peak_hours: vec![12, 13, 18, 19, 20],
            off_peak_hours: vec![15, 16, 21, 22],
            called_timeout_seconds: 300,
        }
    }
}

impl VenueQueueSettings {
    /// Whether the venue accepts new parties at the given hour of day
    pub fn is_open_at(&self, hour: u32) -> bool {
        if self.open_hour < self.close_hour {
            hour >= self.open_hour && hour < self.close_hour
        } else {
            // Wraps past midnight (e.g. 18 -> 2)
            hour >= self.open_hour || hour < self.close_hour
        }
    }

    /// Validate settings values
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.avg_service_minutes == 0 {
            return Err(crate::error::QueueError::InvalidRequest {
                reason: "avgServiceMinutes must be greater than 0".to_string(),
            }
            .into());
        }
        if self.max_party_size == 0 {
            return Err(crate::error::QueueError::InvalidRequest {
                reason: "maxPartySize must be greater than 0".to_string(),
            }
            .into());
        }
        if self.open_hour > 23 || self.close_hour > 24 {
            return Err(crate::error::QueueError::InvalidRequest {
                reason: "operating hours must be within 0-24".to_string(),
            }
            .into());
        }
        if self.called_timeout_seconds == 0 {
            return Err(crate::error::QueueError::InvalidRequest {
                reason: "calledTimeoutSeconds must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Derived counts over the current waiting/called sets; never stored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatistics {
    pub total_waiting: usize,
    pub total_called: usize,
    pub avg_wait_minutes: u32,
}

/// Full current state of a venue's queue, sent to newly connected sessions
/// and returned by the venue snapshot endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub venue_id: VenueId,
    pub entries: Vec<QueueEntry>,
    pub total_waiting: usize,
    pub total_called: usize,
    pub avg_wait_minutes: u32,
    pub settings: VenueQueueSettings,
}

/// Live status view for a single entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryStatusView {
    pub entry: QueueEntry,
    pub current_position: u32,
    pub estimated_wait_minutes: u32,
    pub parties_ahead: u32,
    pub is_ready: bool,
}

/// Payload for position_update events and the status refresh loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub entry_id: EntryId,
    pub venue_id: VenueId,
    pub position: u32,
    pub status: EntryStatus,
    pub estimated_wait_minutes: u32,
    pub estimated_seating_time: DateTime<Utc>,
}

impl PositionUpdate {
    /// Build an update payload from an entry's current fields
    pub fn from_entry(entry: &QueueEntry) -> Self {
        Self {
            entry_id: entry.id,
            venue_id: entry.venue_id.clone(),
            position: entry.position,
            status: entry.status,
            estimated_wait_minutes: entry.estimated_wait_minutes,
            estimated_seating_time: entry.estimated_seating_time,
        }
    }
}

/// Validated input for joining a queue
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub party: PartyIdentity,
    pub party_size: u32,
}

/// Result of a successful join
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOutcome {
    pub entry: QueueEntry,
    pub estimated_wait_minutes: u32,
    pub estimated_seating_time: DateTime<Utc>,
    pub current_queue_size: usize,
}

/// Result of a staff call-next action
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    pub called_entries: Vec<QueueEntry>,
    pub remaining_queue_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(EntryStatus::Waiting.is_active());
        assert!(EntryStatus::Called.is_active());
        assert!(EntryStatus::Seated.is_terminal());
        assert!(EntryStatus::Cancelled.is_terminal());
        assert!(EntryStatus::Expired.is_terminal());
        assert!(EntryStatus::NoShow.is_terminal());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&EntryStatus::NoShow).unwrap();
        assert_eq!(json, "\"no_show\"");

        let status: EntryStatus = serde_json::from_str("\"waiting\"").unwrap();
        assert_eq!(status, EntryStatus::Waiting);
    }

    #[test]
    fn test_party_identity_matching() {
        let by_user = PartyIdentity {
            user_id: Some("u-1".to_string()),
            guest_name: Some("Alex".to_string()),
            phone_number: None,
        };
        let same_user = PartyIdentity {
            user_id: Some("u-1".to_string()),
            guest_name: Some("Someone Else".to_string()),
            phone_number: None,
        };
        let other_user = PartyIdentity {
            user_id: Some("u-2".to_string()),
            guest_name: Some("Alex".to_string()),
            phone_number: None,
        };

        // User id is authoritative when both sides have one
        assert!(by_user.same_party(&same_user));
        assert!(!by_user.same_party(&other_user));

        let by_phone = PartyIdentity {
            user_id: None,
            guest_name: Some("Sam".to_string()),
            phone_number: Some("555-0100".to_string()),
        };
        let same_phone = PartyIdentity {
            user_id: None,
            guest_name: None,
            phone_number: Some("555-0100".to_string()),
        };
        assert!(by_phone.same_party(&same_phone));

        let unidentified = PartyIdentity::default();
        assert!(!unidentified.is_identified());
        assert!(!unidentified.same_party(&by_phone));
    }

    #[test]
    fn test_operating_hours() {
        let mut settings = VenueQueueSettings::default();
        assert!(settings.is_open_at(0));
        assert!(settings.is_open_at(23));

        settings.open_hour = 11;
        settings.close_hour = 22;
        assert!(settings.is_open_at(11));
        assert!(settings.is_open_at(21));
        assert!(!settings.is_open_at(22));
        assert!(!settings.is_open_at(3));

        // Overnight hours wrap past midnight
        settings.open_hour = 18;
        settings.close_hour = 2;
        assert!(settings.is_open_at(23));
        assert!(settings.is_open_at(1));
        assert!(!settings.is_open_at(12));
    }

    #[test]
    fn test_settings_validation() {
        let settings = VenueQueueSettings::default();
        assert!(settings.validate().is_ok());

        let mut invalid = VenueQueueSettings::default();
        invalid.avg_service_minutes = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = VenueQueueSettings::default();
        invalid.open_hour = 25;
        assert!(invalid.validate().is_err());

        let mut invalid = VenueQueueSettings::default();
        invalid.called_timeout_seconds = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_camel_case_wire_format() {
        let settings = VenueQueueSettings::default();
        let json = serde_json::to_value(&settings).unwrap();
        assert!(json.get("avgServiceMinutes").is_some());
        assert!(json.get("maxPartySize").is_some());
        assert!(json.get("avg_service_minutes").is_none());
    }
}
