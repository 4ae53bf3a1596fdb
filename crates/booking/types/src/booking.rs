//! The booking entity and the payload shape carried by booking events
//!
//! Bookings are owned by the marketplace's persistence layer. The engine only
//! reads them and applies conditional status writes.

use crate::{WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted booking status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Unsuccessful,
    Completed,
    /// Written by the marketplace when a party cancels; never by the engine.
    Canceled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Unsuccessful => "unsuccessful",
            BookingStatus::Completed => "completed",
            BookingStatus::Canceled => "canceled",
        }
    }

    /// Lowercase spellings the marketplace may have stored for this status
    pub fn spellings(&self) -> &'static [&'static str] {
        match self {
            BookingStatus::Pending => &["pending"],
            BookingStatus::Approved => &["approved"],
            BookingStatus::Unsuccessful => &["unsuccessful"],
            BookingStatus::Completed => &["completed"],
            BookingStatus::Canceled => &["canceled", "cancelled"],
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "approved" => Some(BookingStatus::Approved),
            "unsuccessful" => Some(BookingStatus::Unsuccessful),
            "completed" => Some(BookingStatus::Completed),
            "canceled" | "cancelled" => Some(BookingStatus::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted booking, as far as the engine needs to see it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub status: BookingStatus,
    #[serde(default)]
    pub confirmed_slot: Option<String>,
    #[serde(default)]
    pub time_slots: Vec<String>,
}

impl Booking {
    pub fn new(id: impl Into<String>, status: BookingStatus) -> Self {
        Self {
            id: id.into(),
            status,
            confirmed_slot: None,
            time_slots: Vec::new(),
        }
    }
}

/// How a listing is redeemed by the creator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RedeemType {
    /// The creator picks time slots; the business confirms one.
    #[default]
    TimeSlot,
    /// Redeemable at any time; completion follows the redeem event.
    Anytime,
}

/// A party to the booking (creator, business, or the business's user)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Party {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Listing {
    pub id: Option<String>,
    pub title: Option<String>,
    pub redeem_type: RedeemType,
}

impl Listing {
    pub fn requires_time_slot(&self) -> bool {
        self.redeem_type == RedeemType::TimeSlot
    }
}

/// Booking joined with listing, business and creator, as embedded in events
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSnapshot {
    pub id: String,
    #[serde(default)]
    pub status: Option<BookingStatus>,
    #[serde(default)]
    pub confirmed_slot: Option<String>,
    #[serde(default)]
    pub time_slots: Vec<String>,
    #[serde(default)]
    pub listing: Listing,
    #[serde(default)]
    pub business: Party,
    /// The content creator who requested the booking
    #[serde(default)]
    pub user: Party,
}

/// Payload of every `booking.*` event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPayload {
    pub booking: BookingSnapshot,
    #[serde(default)]
    pub business_user: Party,
}

impl BookingPayload {
    pub fn from_value(value: &Value) -> WorkflowResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| WorkflowError::InvalidPayload(e.to_string()))
    }
}
