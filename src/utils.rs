//! Utility functions for the waitlist service

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Generate a new unique queue entry ID
pub fn generate_entry_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique stream subscriber ID
pub fn generate_subscriber_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Timestamp a given number of minutes after `from`
pub fn minutes_after(from: DateTime<Utc>, minutes: u32) -> DateTime<Utc> {
    from + Duration::minutes(minutes as i64)
}

/// Timestamp a given number of seconds after `from`
pub fn seconds_after(from: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    from + Duration::seconds(seconds as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_entry_id();
        let id2 = generate_entry_id();
        assert_ne!(id1, id2);

        let sub1 = generate_subscriber_id();
        let sub2 = generate_subscriber_id();
        assert_ne!(sub1, sub2);
    }

    #[test]
    fn test_offsets() {
        let now = current_timestamp();
        assert_eq!((minutes_after(now, 15) - now).num_minutes(), 15);
        assert_eq!((seconds_after(now, 300) - now).num_seconds(), 300);
    }
}
