//! Slot time conversion
//!
//! Slots are stored as display strings in the marketplace's local time,
//! e.g. `Mon Jan 1, 2024 - 6:00 PM` (requested slots) or
//! `Monday, Jan 1, 2024 - 6:00 PM` (confirmed slot). They carry no zone.
//! [`SlotClock`] turns them into UTC instants by adding a fixed offset.
//!
//! The offset is a plain number of hours and ignores daylight saving. The
//! default of 7 hours matches Pacific Daylight Time only.

use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const SLOT_FORMAT: &str = "%b %d, %Y - %I:%M %p";

/// Default local-to-UTC offset applied to slot strings
pub const DEFAULT_SLOT_UTC_OFFSET_HOURS: i64 = 7;

/// Converts stored slot strings into UTC instants using a fixed offset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotClock {
    utc_offset_hours: i64,
}

impl Default for SlotClock {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_UTC_OFFSET_HOURS)
    }
}

impl SlotClock {
    pub fn new(utc_offset_hours: i64) -> Self {
        Self { utc_offset_hours }
    }

    pub fn utc_offset_hours(&self) -> i64 {
        self.utc_offset_hours
    }

    /// Parse a slot string as a zone-less local time. A leading weekday
    /// (`Mon`, `Monday,`) is optional and not cross-checked against the date.
    pub fn parse_local(&self, slot: &str) -> WorkflowResult<NaiveDateTime> {
        let slot = slot.trim();
        if let Ok(parsed) = NaiveDateTime::parse_from_str(slot, SLOT_FORMAT) {
            return Ok(parsed);
        }

        let without_weekday = slot
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim_start())
            .ok_or_else(|| WorkflowError::InvalidSlot(slot.to_string()))?;

        NaiveDateTime::parse_from_str(without_weekday, SLOT_FORMAT)
            .map_err(|_| WorkflowError::InvalidSlot(slot.to_string()))
    }

    /// The UTC instant of a slot string (local time plus the fixed offset)
    pub fn instant(&self, slot: &str) -> WorkflowResult<DateTime<Utc>> {
        let local = self.parse_local(slot)?;
        Ok(Utc.from_utc_datetime(&(local + Duration::hours(self.utc_offset_hours))))
    }

    /// The latest of the given slots, or `None` when there are none
    pub fn latest(&self, slots: &[String]) -> WorkflowResult<Option<DateTime<Utc>>> {
        let mut latest = None;
        for slot in slots {
            let instant = self.instant(slot)?;
            if latest.map_or(true, |l| instant > l) {
                latest = Some(instant);
            }
        }
        Ok(latest)
    }
}
