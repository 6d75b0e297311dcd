//! Store Hours Model
//!
//! Per-weekday open/close times. The dashboard uses these to gate the
//! silent auto-refresh of the customer roster: no configured hours means
//! the store is treated as closed and the refresh stays off.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opening hours for one weekday of one location.
///
/// `day_of_week`: 0 = Sunday .. 6 = Saturday. Both times unset means
/// closed that day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHours {
    pub location_id: Uuid,
    pub day_of_week: u8,
    pub open_time: Option<NaiveTime>,
    pub close_time: Option<NaiveTime>,
}

/// Whether the location is open at the given weekday/time.
///
/// Open interval is half-open: `open_time <= t < close_time`.
pub fn is_open_at(hours: &[StoreHours], day_of_week: u8, time: NaiveTime) -> bool {
    let Some(today) = hours.iter().find(|h| h.day_of_week == day_of_week) else {
        return false;
    };
    match (today.open_time, today.close_time) {
        (Some(open), Some(close)) => time >= open && time < close,
        _ => false,
    }
}
