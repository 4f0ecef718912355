use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use crate::db::{queries, Store};
use crate::errors::BookingError;
use crate::models::{AuditInfo, PatientInfo, SlotStatus, SlotType};
use crate::services::booking::{commit_booking, ensure_bookable, BookingConfirmation};
use crate::services::clock::Clock;
use crate::services::lock::{date_lock_key, LockAttempt, LockCoordinator};

/// Number of candidates tried before giving up: the earliest plus one retry.
const MAX_CANDIDATE_ATTEMPTS: usize = 2;

/// Picks a slot for a caller who only names a date.
#[derive(Clone)]
pub struct SlotAllocator {
    store: Store,
    locks: LockCoordinator,
    clock: Arc<dyn Clock>,
    lock_ttl: Duration,
    capacity_percent: u32,
}

impl SlotAllocator {
    pub fn new(
        store: Store,
        locks: LockCoordinator,
        clock: Arc<dyn Clock>,
        lock_ttl: Duration,
        capacity_percent: u32,
    ) -> Self {
        Self {
            store,
            locks,
            clock,
            lock_ttl,
            capacity_percent,
        }
    }

    pub async fn book_by_date(
        &self,
        date: NaiveDate,
        patient: &PatientInfo,
        audit: &AuditInfo,
    ) -> Result<BookingConfirmation, BookingError> {
        let key = date_lock_key(date);
        let guard = match self.locks.acquire(&key, self.lock_ttl).await {
            LockAttempt::Acquired(guard) => Some(guard),
            LockAttempt::Held => {
                tracing::info!(%date, "date lock held, rejecting as busy");
                return Err(BookingError::Busy);
            }
            LockAttempt::Unavailable => None,
        };

        let now = self.clock.now();
        let capacity_percent = self.capacity_percent;
        let result = self
            .store
            .transaction(|tx| allocate(tx, date, patient, audit, now, capacity_percent));

        if let Some(guard) = guard {
            guard.release().await;
        }

        match &result {
            Ok(confirmation) => tracing::info!(
                %date,
                slot_id = confirmation.slot.id,
                booking_id = confirmation.booking.id,
                start_time = %confirmation.slot.start_time,
                "slot auto-assigned"
            ),
            Err(BookingError::Internal(e)) => {
                tracing::error!(%date, error = %e, "auto-assignment transaction failed");
            }
            Err(e) => tracing::info!(%date, code = ?e.code(), "auto-assignment rejected"),
        }

        result
    }
}

/// Booked-slot count at which a date stops accepting auto-assignment.
pub fn capacity_threshold(total_slots: usize, capacity_percent: u32) -> usize {
    (total_slots * capacity_percent as usize).div_ceil(100)
}

pub(crate) fn allocate(
    conn: &Connection,
    date: NaiveDate,
    patient: &PatientInfo,
    audit: &AuditInfo,
    now: NaiveDateTime,
    capacity_percent: u32,
) -> Result<BookingConfirmation, BookingError> {
    let day = queries::get_slots_for_allocation(conn, date)?;
    if day.is_empty() {
        return Err(BookingError::NoOnlineSlots);
    }

    let total_booked = day.iter().filter(|entry| entry.is_taken()).count();
    if total_booked >= capacity_threshold(day.len(), capacity_percent) {
        return Err(BookingError::CapacityExceeded);
    }

    let mut candidates: Vec<_> = day
        .iter()
        .filter(|entry| {
            entry.slot.slot_type == SlotType::Online
                && entry.slot.status == SlotStatus::Available
                && entry.booking.is_none()
        })
        .map(|entry| (entry.slot.start_time, entry.slot.id))
        .collect();
    candidates.sort();

    if candidates.is_empty() {
        return Err(BookingError::NoOnlineSlots);
    }

    let candidate_ids: Vec<i64> = candidates.into_iter().map(|(_, id)| id).collect();
    book_first_bookable(conn, &candidate_ids, patient, audit, now)
}

/// Tries up to two candidates in order, re-reading each one first. A
/// candidate taken since it was listed is skipped; any other failure ends
/// the attempt.
fn book_first_bookable(
    conn: &Connection,
    candidate_ids: &[i64],
    patient: &PatientInfo,
    audit: &AuditInfo,
    now: NaiveDateTime,
) -> Result<BookingConfirmation, BookingError> {
    for &slot_id in candidate_ids.iter().take(MAX_CANDIDATE_ATTEMPTS) {
        let Some(fresh) = queries::get_slot_with_booking(conn, slot_id)? else {
            tracing::debug!(slot_id, "candidate disappeared, trying next");
            continue;
        };

        let attempt = ensure_bookable(&fresh, now)
            .and_then(|_| commit_booking(conn, fresh.slot, patient, audit, now));
        match attempt {
            Ok(confirmation) => return Ok(confirmation),
            Err(e) if e.is_stale() => {
                tracing::debug!(slot_id, code = ?e.code(), "candidate taken, trying next");
            }
            Err(e) => return Err(e),
        }
    }

    Err(BookingError::RetryLater)
}
