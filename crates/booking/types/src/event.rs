//! Inbound domain events
//!
//! Every booking status change in the marketplace emits one event. The
//! dispatcher turns events into new runs and cancellation signals.

use crate::{CorrelationKey, WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Correlation key used by the periodic maintenance trigger
pub const MAINTENANCE_CORRELATION_KEY: &str = "maintenance";

/// Types of events the engine understands
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "booking.created")]
    BookingCreated,
    #[serde(rename = "booking.approved")]
    BookingApproved,
    #[serde(rename = "booking.declined")]
    BookingDeclined,
    #[serde(rename = "booking.canceled")]
    BookingCanceled,
    #[serde(rename = "booking.redeemed")]
    BookingRedeemed,
    #[serde(rename = "maintenance.refresh-profiles")]
    Maintenance,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::BookingCreated,
        EventType::BookingApproved,
        EventType::BookingDeclined,
        EventType::BookingCanceled,
        EventType::BookingRedeemed,
        EventType::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BookingCreated => "booking.created",
            EventType::BookingApproved => "booking.approved",
            EventType::BookingDeclined => "booking.declined",
            EventType::BookingCanceled => "booking.canceled",
            EventType::BookingRedeemed => "booking.redeemed",
            EventType::Maintenance => "maintenance.refresh-profiles",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| WorkflowError::InvalidPayload(format!("unknown event type '{}'", s)))
    }
}

/// A domain event as received from the marketplace
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub correlation_key: CorrelationKey,
    #[serde(default)]
    pub payload: Value,
    pub emitted_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Build an event whose correlation key is taken from `payload.booking.id`.
    pub fn new(event_type: EventType, payload: Value, emitted_at: DateTime<Utc>) -> WorkflowResult<Self> {
        let correlation_key = correlation_key_of(&payload).ok_or_else(|| {
            WorkflowError::InvalidPayload(format!("{} payload has no booking.id", event_type))
        })?;

        Ok(Self {
            event_type,
            correlation_key,
            payload,
            emitted_at,
        })
    }

    /// Build an event with an explicit correlation key. When the payload
    /// names a booking, the key must be that booking's id.
    pub fn with_correlation_key(
        event_type: EventType,
        correlation_key: CorrelationKey,
        payload: Value,
        emitted_at: DateTime<Utc>,
    ) -> WorkflowResult<Self> {
        if let Some(booking_key) = correlation_key_of(&payload) {
            if booking_key != correlation_key {
                return Err(WorkflowError::InvalidPayload(format!(
                    "correlation key '{}' does not match booking.id '{}'",
                    correlation_key, booking_key
                )));
            }
        }

        Ok(Self {
            event_type,
            correlation_key,
            payload,
            emitted_at,
        })
    }

    /// The periodic maintenance trigger. It carries no payload.
    pub fn maintenance(emitted_at: DateTime<Utc>) -> Self {
        Self {
            event_type: EventType::Maintenance,
            correlation_key: CorrelationKey::new(MAINTENANCE_CORRELATION_KEY),
            payload: Value::Null,
            emitted_at,
        }
    }

    /// Correlation key for runs created from this event: the booking id in
    /// the payload when present, otherwise the key the event was sent with.
    pub fn run_correlation_key(&self) -> CorrelationKey {
        correlation_key_of(&self.payload).unwrap_or_else(|| self.correlation_key.clone())
    }
}

fn correlation_key_of(payload: &Value) -> Option<CorrelationKey> {
    match payload.pointer("/booking/id")? {
        Value::String(s) if !s.is_empty() => Some(CorrelationKey::new(s.clone())),
        Value::Number(n) => Some(CorrelationKey::new(n.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_round_trips_through_str() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert!("booking.exploded".parse::<EventType>().is_err());
    }

    #[test]
    fn test_correlation_key_from_payload() {
        let event = DomainEvent::new(
            EventType::BookingCreated,
            json!({"booking": {"id": "bk-1"}}),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(event.correlation_key, CorrelationKey::new("bk-1"));
        assert_eq!(event.run_correlation_key(), CorrelationKey::new("bk-1"));
    }

    #[test]
    fn test_numeric_booking_id_is_accepted() {
        let event =
            DomainEvent::new(EventType::BookingApproved, json!({"booking": {"id": 42}}), Utc::now())
                .unwrap();
        assert_eq!(event.correlation_key.as_str(), "42");
    }

    #[test]
    fn test_missing_booking_id_is_rejected() {
        let result = DomainEvent::new(EventType::BookingCreated, json!({}), Utc::now());
        assert!(matches!(result, Err(WorkflowError::InvalidPayload(_))));
    }

    #[test]
    fn test_explicit_key_must_match_booking_id() {
        let payload = json!({"booking": {"id": "bk-1"}});
        let matching = DomainEvent::with_correlation_key(
            EventType::BookingApproved,
            CorrelationKey::new("bk-1"),
            payload.clone(),
            Utc::now(),
        );
        assert!(matching.is_ok());

        let mismatched = DomainEvent::with_correlation_key(
            EventType::BookingApproved,
            CorrelationKey::new("booking-1"),
            payload,
            Utc::now(),
        );
        assert!(matches!(mismatched, Err(WorkflowError::InvalidPayload(_))));

        let keyed_only = DomainEvent::with_correlation_key(
            EventType::BookingCanceled,
            CorrelationKey::new("bk-7"),
            json!({}),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(keyed_only.run_correlation_key().as_str(), "bk-7");
    }

    #[test]
    fn test_maintenance_event_uses_own_identity() {
        let event = DomainEvent::maintenance(Utc::now());
        assert_eq!(event.run_correlation_key().as_str(), MAINTENANCE_CORRELATION_KEY);
    }

    #[test]
    fn test_wire_format() {
        let raw = json!({
            "type": "booking.declined",
            "correlationKey": "bk-9",
            "payload": {"booking": {"id": "bk-9"}},
            "emittedAt": "2024-01-01T00:00:00Z"
        });
        let event: DomainEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.event_type, EventType::BookingDeclined);
        assert_eq!(event.correlation_key.as_str(), "bk-9");
    }
}
