use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::Booking;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotType {
    Online,
    ExpressSameDay,
    Offline,
}

impl SlotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotType::Online => "ONLINE",
            SlotType::ExpressSameDay => "EXPRESS_SAME_DAY",
            SlotType::Offline => "OFFLINE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ONLINE" => Some(SlotType::Online),
            "EXPRESS_SAME_DAY" => Some(SlotType::ExpressSameDay),
            "OFFLINE" => Some(SlotType::Offline),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Available,
    Booked,
    Cancelled,
    Overridden,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "AVAILABLE",
            SlotStatus::Booked => "BOOKED",
            SlotStatus::Cancelled => "CANCELLED",
            SlotStatus::Overridden => "OVERRIDDEN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(SlotStatus::Available),
            "BOOKED" => Some(SlotStatus::Booked),
            "CANCELLED" => Some(SlotStatus::Cancelled),
            "OVERRIDDEN" => Some(SlotStatus::Overridden),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: i64,
    pub facility_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub slot_type: SlotType,
    pub status: SlotStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A slot together with its booking, read in one statement.
#[derive(Debug, Clone)]
pub struct SlotWithBooking {
    pub slot: Slot,
    pub booking: Option<Booking>,
}

impl SlotWithBooking {
    /// Counts as taken if either side of the BOOKED/booking pair says so.
    pub fn is_taken(&self) -> bool {
        self.slot.status == SlotStatus::Booked || self.booking.is_some()
    }
}

/// Slot row prepared for insertion by the generator.
#[derive(Debug, Clone)]
pub struct NewSlot {
    pub facility_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub slot_type: SlotType,
}
