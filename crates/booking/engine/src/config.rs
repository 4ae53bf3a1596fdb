//! Engine tunables

use booking_types::slot::DEFAULT_SLOT_UTC_OFFSET_HOURS;
use booking_types::SlotClock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed hour offset added when converting slot strings to UTC
    pub slot_utc_offset_hours: i64,

    /// How often the timer loop re-scans storage for sleeping runs
    pub timer_poll_interval_secs: u64,

    /// Upper bound on a single action attempt; 0 disables the bound.
    /// Batch actions that bound their own units are exempt.
    pub action_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_utc_offset_hours: DEFAULT_SLOT_UTC_OFFSET_HOURS,
            timer_poll_interval_secs: 30,
            action_timeout_secs: 60,
        }
    }
}

impl EngineConfig {
    pub fn slot_clock(&self) -> SlotClock {
        SlotClock::new(self.slot_utc_offset_hours)
    }

    pub fn timer_poll_interval(&self) -> Duration {
        Duration::from_secs(self.timer_poll_interval_secs.max(1))
    }

    pub fn action_timeout(&self) -> Option<Duration> {
        (self.action_timeout_secs > 0).then(|| Duration::from_secs(self.action_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.slot_clock().utc_offset_hours(), 7);
        assert_eq!(config.timer_poll_interval(), Duration::from_secs(30));
        assert_eq!(config.action_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_timeout_disables_bound() {
        let config = EngineConfig {
            action_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.action_timeout(), None);
    }
}
