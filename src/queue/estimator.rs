//! Wait time estimation
//!
//! This module computes the estimated wait in minutes for a queue position
//! from the venue's operating parameters. Estimates are deterministic and
//! side-effect free; the engine re-invokes them whenever position, queue
//! size, or the time-of-day bucket changes for an entry.

use crate::types::VenueQueueSettings;
use chrono::{DateTime, Utc};

/// Multiplier applied during configured peak hours
const PEAK_FACTOR: f64 = 1.3;

/// Multiplier applied during configured off-peak hours
const OFF_PEAK_FACTOR: f64 = 0.8;

/// Safety buffer applied to every estimate
const BUFFER_FACTOR: f64 = 1.15;

/// Rush multiplier for the given hour of day
pub fn rush_factor(settings: &VenueQueueSettings, hour_of_day: u32) -> f64 {
    if settings.peak_hours.contains(&hour_of_day) {
        PEAK_FACTOR
    } else if settings.off_peak_hours.contains(&hour_of_day) {
        OFF_PEAK_FACTOR
    } else {
        1.0
    }
}

/// Estimate the wait in minutes for a party at `position`.
///
/// `current_queue_size` is the number of waiting parties ahead of the
/// computation (longer queues move proportionally slower). The 15% buffer
/// folds into a single final round-up.
pub fn estimate_wait_minutes(
    settings: &VenueQueueSettings,
    position: u32,
    current_queue_size: usize,
    hour_of_day: u32,
) -> u32 {
    let capacity = settings.seating_capacity.max(1);
    let base = position as f64 * settings.avg_service_minutes as f64 / capacity as f64;
    let queue_factor = 1.0 + (current_queue_size as f64 / 100.0) * 0.2;
    let rush = rush_factor(settings, hour_of_day);

    (base * queue_factor * rush * BUFFER_FACTOR).ceil() as u32
}

/// Projected seating time for an estimate computed at `now`
pub fn estimated_seating_time(now: DateTime<Utc>, wait_minutes: u32) -> DateTime<Utc> {
    crate::utils::minutes_after(now, wait_minutes)
}
