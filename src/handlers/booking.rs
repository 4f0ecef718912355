use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::{AppError, BookingError};
use crate::handlers::{body_error, iso_datetime};
use crate::middleware::ClientMeta;
use crate::models::{PatientInfo, SlotStatus, SlotType};
use crate::services::booking::BookingConfirmation;
use crate::services::validation::{parse_date, validate_patient, validate_slot_id, FieldError};
use crate::state::AppState;

// POST /api/book
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSlotRequest {
    pub slot_id: Option<i64>,
    #[serde(flatten)]
    pub patient: PatientFields,
}

// POST /api/book/by-date
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookByDateRequest {
    pub date: Option<String>,
    #[serde(flatten)]
    pub patient: PatientFields,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatientFields {
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub patient_email: String,
    #[serde(default)]
    pub patient_phone: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSlotResponse {
    success: bool,
    message: &'static str,
    booking_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookByDateResponse {
    success: bool,
    message: &'static str,
    booking_id: i64,
    slot_time: String,
    slot_date: String,
}

pub async fn book_slot(
    State(state): State<Arc<AppState>>,
    ClientMeta(audit): ClientMeta,
    body: Result<Json<BookSlotRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookSlotResponse>), AppError> {
    let Json(req) = body.map_err(body_error)?;

    let slot_id = req
        .slot_id
        .ok_or_else(|| field_error("slotId", "Slot id is required"))
        .and_then(validate_slot_id);
    let (slot_id, patient) = collect_errors(slot_id, validate_request_patient(&req.patient))?;

    let confirmation = with_timeout(&state, state.bookings.book_slot(slot_id, &patient, &audit)).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookSlotResponse {
            success: true,
            message: "Slot booked successfully",
            booking_id: confirmation.booking.id,
        }),
    ))
}

pub async fn book_by_date(
    State(state): State<Arc<AppState>>,
    ClientMeta(audit): ClientMeta,
    body: Result<Json<BookByDateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookByDateResponse>), AppError> {
    let Json(req) = body.map_err(body_error)?;

    let date = req
        .date
        .as_deref()
        .ok_or_else(|| field_error("date", "Date is required"))
        .and_then(|d| parse_date("date", d));
    let (date, patient) = collect_errors(date, validate_request_patient(&req.patient))?;

    let confirmation = with_timeout(&state, state.allocator.book_by_date(date, &patient, &audit)).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookByDateResponse {
            success: true,
            message: "Slot booked successfully",
            booking_id: confirmation.booking.id,
            slot_time: iso_datetime(&confirmation.slot.start_time),
            slot_date: confirmation.slot.date.format(queries::DATE_FORMAT).to_string(),
        }),
    ))
}

// GET /api/bookings/:id
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    id: i64,
    patient_name: String,
    patient_email: String,
    patient_phone: String,
    created_at: String,
    slot: BookedSlot,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedSlot {
    id: i64,
    date: String,
    start_time: String,
    end_time: String,
    #[serde(rename = "type")]
    slot_type: SlotType,
    status: SlotStatus,
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BookingDetail>, AppError> {
    let found = state.store.read(|conn| {
        let Some(booking) = queries::get_booking_by_id(conn, id)? else {
            return Ok(None);
        };
        let slot = queries::get_slot_with_booking(conn, booking.slot_id)?;
        Ok(slot.map(|entry| (booking, entry.slot)))
    })?;

    let (booking, slot) = found.ok_or_else(|| AppError::NotFound(format!("Booking {id}")))?;

    Ok(Json(BookingDetail {
        id: booking.id,
        patient_name: booking.patient_name,
        patient_email: booking.patient_email,
        patient_phone: booking.patient_phone,
        created_at: iso_datetime(&booking.created_at),
        slot: BookedSlot {
            id: slot.id,
            date: slot.date.format(queries::DATE_FORMAT).to_string(),
            start_time: iso_datetime(&slot.start_time),
            end_time: iso_datetime(&slot.end_time),
            slot_type: slot.slot_type,
            status: slot.status,
        },
    }))
}

/// Bounds a booking call by the configured request timeout. The store
/// transaction itself never yields, so a cut-off call has either committed
/// or written nothing.
async fn with_timeout(
    state: &AppState,
    call: impl Future<Output = Result<BookingConfirmation, BookingError>>,
) -> Result<BookingConfirmation, AppError> {
    match tokio::time::timeout(state.config.request_timeout, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(AppError::Timeout),
    }
}

fn validate_request_patient(fields: &PatientFields) -> Result<PatientInfo, Vec<FieldError>> {
    validate_patient(&fields.patient_name, &fields.patient_email, &fields.patient_phone)
}

fn collect_errors<T>(
    first: Result<T, FieldError>,
    patient: Result<PatientInfo, Vec<FieldError>>,
) -> Result<(T, PatientInfo), AppError> {
    match (first, patient) {
        (Ok(value), Ok(patient)) => Ok((value, patient)),
        (first, patient) => {
            let mut errors: Vec<FieldError> = first.err().into_iter().collect();
            errors.extend(patient.err().unwrap_or_default());
            Err(AppError::Validation(errors))
        }
    }
}

fn field_error(path: &str, message: &str) -> FieldError {
    FieldError {
        path: path.to_string(),
        message: message.to_string(),
    }
}
