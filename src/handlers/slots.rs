use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::{iso_datetime, query_error};
use crate::models::{SlotStatus, SlotType, SlotWithBooking};
use crate::services::clock::express_window_open;
use crate::services::validation::parse_date;
use crate::state::AppState;

// GET /api/slots?date=YYYY-MM-DD
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    id: i64,
    date: String,
    start_time: String,
    end_time: String,
    #[serde(rename = "type")]
    slot_type: SlotType,
    status: SlotStatus,
    is_booked: bool,
    message: &'static str,
    booking: Option<BookingSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    patient_name: String,
    created_at: String,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypeSummary {
    total: usize,
    available: usize,
    booked: usize,
    all_booked: bool,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct OfflineSummary {
    total: usize,
    available: usize,
}

#[derive(Serialize)]
pub struct DaySummary {
    date: String,
    total: usize,
    online: TypeSummary,
    express: TypeSummary,
    offline: OfflineSummary,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    slots: Vec<SlotView>,
    summary: DaySummary,
}

pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SlotsQuery>, QueryRejection>,
) -> Result<Json<SlotsResponse>, AppError> {
    let Query(query) = query.map_err(query_error)?;
    let raw = query.date.unwrap_or_default();
    let date = parse_date("date", &raw).map_err(|e| AppError::Validation(vec![e]))?;

    let slots = state.store.read(|conn| queries::get_slots_for_date(conn, date))?;
    let now = state.clock.now();

    let summary = DaySummary {
        date: raw,
        total: slots.len(),
        online: type_summary(&slots, SlotType::Online),
        express: type_summary(&slots, SlotType::ExpressSameDay),
        offline: {
            let offline = type_summary(&slots, SlotType::Offline);
            OfflineSummary {
                total: offline.total,
                available: offline.available,
            }
        },
    };

    let slots = slots
        .iter()
        .map(|entry| SlotView {
            id: entry.slot.id,
            date: entry.slot.date.format(queries::DATE_FORMAT).to_string(),
            start_time: iso_datetime(&entry.slot.start_time),
            end_time: iso_datetime(&entry.slot.end_time),
            slot_type: entry.slot.slot_type,
            status: entry.slot.status,
            is_booked: entry.booking.is_some(),
            message: display_message(entry, now),
            booking: entry.booking.as_ref().map(|b| BookingSummary {
                patient_name: b.patient_name.clone(),
                created_at: iso_datetime(&b.created_at),
            }),
        })
        .collect();

    Ok(Json(SlotsResponse { slots, summary }))
}

/// Short label shown next to each slot in the day view.
pub fn display_message(entry: &SlotWithBooking, now: NaiveDateTime) -> &'static str {
    match entry.slot.status {
        SlotStatus::Booked => return "Booked",
        SlotStatus::Cancelled => return "Cancelled",
        SlotStatus::Available | SlotStatus::Overridden => {}
    }
    match entry.slot.slot_type {
        SlotType::Online => "Available",
        SlotType::ExpressSameDay if express_window_open(entry.slot.date, now) => "Express (Available)",
        SlotType::ExpressSameDay => "Express (Not yet available)",
        SlotType::Offline => "Offline (Not bookable online)",
    }
}

fn type_summary(slots: &[SlotWithBooking], slot_type: SlotType) -> TypeSummary {
    let of_type = slots.iter().filter(|e| e.slot.slot_type == slot_type);
    let total = of_type.clone().count();
    let available = of_type
        .filter(|e| e.slot.status == SlotStatus::Available && e.booking.is_none())
        .count();
    TypeSummary {
        total,
        available,
        booked: total - available,
        all_booked: available == 0 && total > 0,
    }
}
