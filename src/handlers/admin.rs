use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries::{self, BookedSlotFilter};
use crate::errors::AppError;
use crate::handlers::{body_error, iso_datetime, query_error};
use crate::models::{Booking, SlotStatus, SlotType, SlotWithBooking};
use crate::services::validation::{parse_date, validate_slot_id, FieldError};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 1000;

// GET /api/admin/slots
#[derive(Deserialize)]
pub struct BookedSlotsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub slot_type: Option<String>,
    pub status: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSlot {
    id: i64,
    facility_id: i64,
    date: String,
    start_time: String,
    end_time: String,
    #[serde(rename = "type")]
    slot_type: SlotType,
    status: SlotStatus,
    booking: Option<AdminBooking>,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminBooking {
    id: i64,
    patient_name: String,
    patient_email: String,
    patient_phone: String,
    created_at: String,
}

#[derive(Serialize)]
pub struct BookedSlotsResponse {
    slots: Vec<AdminSlot>,
    count: usize,
    limit: i64,
    offset: i64,
}

pub async fn list_booked_slots(
    State(state): State<Arc<AppState>>,
    query: Result<Query<BookedSlotsQuery>, QueryRejection>,
) -> Result<Json<BookedSlotsResponse>, AppError> {
    let Query(query) = query.map_err(query_error)?;
    let filter = parse_filter(query)?;

    let slots = state.store.read(|conn| queries::get_booked_slots(conn, &filter))?;
    let slots: Vec<AdminSlot> = slots.into_iter().map(admin_slot).collect();

    Ok(Json(BookedSlotsResponse {
        count: slots.len(),
        slots,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

fn parse_filter(query: BookedSlotsQuery) -> Result<BookedSlotFilter, AppError> {
    let mut errors = vec![];
    let mut filter = BookedSlotFilter {
        limit: query.limit.unwrap_or(DEFAULT_LIMIT),
        offset: query.offset.unwrap_or(0),
        ..Default::default()
    };

    if filter.limit < 0 {
        errors.push(field("limit", "Limit must not be negative"));
    }
    if filter.offset < 0 {
        errors.push(field("offset", "Offset must not be negative"));
    }

    if let Some(raw) = query.date.as_deref().filter(|d| !d.is_empty()) {
        // accept full timestamps and keep only the day
        let day = raw.split('T').next().unwrap_or(raw);
        match parse_date("date", day) {
            Ok(date) => filter.date = Some(date),
            Err(e) => errors.push(e),
        }
    }
    if let Some(raw) = query.slot_type.as_deref().filter(|t| !t.is_empty()) {
        match SlotType::parse(raw) {
            Some(t) => filter.slot_type = Some(t),
            None => errors.push(field("type", "Type must be ONLINE, EXPRESS_SAME_DAY or OFFLINE")),
        }
    }
    if let Some(raw) = query.status.as_deref().filter(|s| !s.is_empty()) {
        match SlotStatus::parse(raw) {
            Some(s) => filter.status = Some(s),
            None => errors.push(invalid_status()),
        }
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    Ok(filter)
}

fn admin_slot(entry: SlotWithBooking) -> AdminSlot {
    let slot = entry.slot;
    AdminSlot {
        id: slot.id,
        facility_id: slot.facility_id,
        date: slot.date.format(queries::DATE_FORMAT).to_string(),
        start_time: iso_datetime(&slot.start_time),
        end_time: iso_datetime(&slot.end_time),
        slot_type: slot.slot_type,
        status: slot.status,
        booking: entry.booking.map(admin_booking),
        created_at: iso_datetime(&slot.created_at),
        updated_at: iso_datetime(&slot.updated_at),
    }
}

fn admin_booking(b: Booking) -> AdminBooking {
    AdminBooking {
        id: b.id,
        patient_name: b.patient_name,
        patient_email: b.patient_email,
        patient_phone: b.patient_phone,
        created_at: iso_datetime(&b.created_at),
    }
}

// POST /api/admin/slot/override
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    pub slot_id: Option<i64>,
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct OverrideResponse {
    success: bool,
    message: &'static str,
    slot: AdminSlot,
}

/// Rewrites a slot's status unconditionally. Any booking on the slot is left
/// in place.
pub async fn override_slot(
    State(state): State<Arc<AppState>>,
    body: Result<Json<OverrideRequest>, JsonRejection>,
) -> Result<Json<OverrideResponse>, AppError> {
    let Json(req) = body.map_err(body_error)?;

    let mut errors = vec![];
    let slot_id = match req.slot_id.map(validate_slot_id) {
        Some(Ok(id)) => Some(id),
        Some(Err(e)) => {
            errors.push(e);
            None
        }
        None => {
            errors.push(field("slotId", "Slot id is required"));
            None
        }
    };
    let status = req.status.as_deref().and_then(SlotStatus::parse);
    if status.is_none() {
        errors.push(invalid_status());
    }
    let (Some(slot_id), Some(status)) = (slot_id, status) else {
        return Err(AppError::Validation(errors));
    };

    let updated = state.store.transaction(|tx| -> anyhow::Result<_> {
        if !queries::set_slot_status(tx, slot_id, status)? {
            return Ok(None);
        }
        queries::get_slot_with_booking(tx, slot_id)
    })?;
    let entry = updated.ok_or_else(|| AppError::NotFound(format!("Slot {slot_id}")))?;

    tracing::info!(slot_id, status = status.as_str(), "slot status overridden");

    Ok(Json(OverrideResponse {
        success: true,
        message: "Slot status updated successfully",
        slot: admin_slot(entry),
    }))
}

fn invalid_status() -> FieldError {
    field("status", "Status must be AVAILABLE, BOOKED, CANCELLED or OVERRIDDEN")
}

fn field(path: &str, message: &str) -> FieldError {
    FieldError {
        path: path.to_string(),
        message: message.to_string(),
    }
}
