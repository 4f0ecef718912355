use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::{queries, Store};
use crate::errors::BookingError;
use crate::models::{AuditInfo, Booking, PatientInfo, Slot, SlotStatus, SlotType, SlotWithBooking};
use crate::services::clock::{express_window_open, Clock};
use crate::services::lock::{slot_lock_key, LockAttempt, LockCoordinator};

#[derive(Debug, Clone)]
pub struct BookingConfirmation {
    pub booking: Booking,
    pub slot: Slot,
}

/// Books a caller-chosen slot.
#[derive(Clone)]
pub struct BookingExecutor {
    store: Store,
    locks: LockCoordinator,
    clock: Arc<dyn Clock>,
    lock_ttl: Duration,
}

impl BookingExecutor {
    pub fn new(store: Store, locks: LockCoordinator, clock: Arc<dyn Clock>, lock_ttl: Duration) -> Self {
        Self {
            store,
            locks,
            clock,
            lock_ttl,
        }
    }

    pub async fn book_slot(
        &self,
        slot_id: i64,
        patient: &PatientInfo,
        audit: &AuditInfo,
    ) -> Result<BookingConfirmation, BookingError> {
        let key = slot_lock_key(slot_id);
        let guard = match self.locks.acquire(&key, self.lock_ttl).await {
            LockAttempt::Acquired(guard) => Some(guard),
            LockAttempt::Held => {
                // The holder may still fail; the transaction below decides.
                tracing::debug!(slot_id, "slot lock contended, relying on transaction");
                None
            }
            LockAttempt::Unavailable => None,
        };

        let now = self.clock.now();
        let result = self
            .store
            .transaction(|tx| check_and_book(tx, slot_id, patient, audit, now));

        if let Some(guard) = guard {
            guard.release().await;
        }

        match &result {
            Ok(confirmation) => {
                tracing::info!(slot_id, booking_id = confirmation.booking.id, "slot booked");
            }
            Err(BookingError::Internal(e)) => {
                tracing::error!(slot_id, error = %e, "booking transaction failed");
            }
            Err(e) => {
                tracing::info!(slot_id, code = ?e.code(), "booking rejected");
            }
        }

        result
    }
}

/// One check-and-set: point read, rule evaluation, then insert + status flip.
/// Must run inside a store transaction.
pub(crate) fn check_and_book(
    conn: &Connection,
    slot_id: i64,
    patient: &PatientInfo,
    audit: &AuditInfo,
    now: NaiveDateTime,
) -> Result<BookingConfirmation, BookingError> {
    let Some(entry) = queries::get_slot_with_booking(conn, slot_id)? else {
        return Err(BookingError::NotFound);
    };
    ensure_bookable(&entry, now)?;
    commit_booking(conn, entry.slot, patient, audit, now)
}

/// Booking rules in priority order; the first one that fails wins.
pub fn ensure_bookable(entry: &SlotWithBooking, now: NaiveDateTime) -> Result<(), BookingError> {
    let slot = &entry.slot;

    if entry.is_taken() {
        return Err(BookingError::AlreadyBooked);
    }
    if slot.slot_type == SlotType::Offline {
        return Err(BookingError::NotOnlineBookable);
    }
    if slot.slot_type == SlotType::ExpressSameDay && !express_window_open(slot.date, now) {
        return Err(BookingError::ExpressNotYetAvailable);
    }
    if slot.status != SlotStatus::Available {
        return Err(BookingError::InvalidState(slot.status));
    }
    Ok(())
}

/// Writes the booking row and marks the slot BOOKED.
pub(crate) fn commit_booking(
    conn: &Connection,
    mut slot: Slot,
    patient: &PatientInfo,
    audit: &AuditInfo,
    now: NaiveDateTime,
) -> Result<BookingConfirmation, BookingError> {
    let booking = queries::create_booking(conn, slot.id, patient, audit, now).map_err(|e| {
        if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
            BookingError::AlreadyBooked
        } else {
            BookingError::from(e)
        }
    })?;

    if !queries::set_slot_status(conn, slot.id, SlotStatus::Booked)? {
        return Err(BookingError::Internal(anyhow::anyhow!(
            "slot {} vanished during booking",
            slot.id
        )));
    }
    slot.status = SlotStatus::Booked;

    Ok(BookingConfirmation { booking, slot })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::Coordinator;
    use crate::models::{Facility, NewSlot};
    use crate::services::clock::ManualClock;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn setup(now: &str) -> (Store, Arc<ManualClock>, BookingExecutor) {
        let store = Store::open(":memory:").unwrap();
        store
            .read(|conn| {
                queries::insert_facility(
                    conn,
                    &Facility {
                        id: 0,
                        name: "Clinic".to_string(),
                        address: "1 Main St".to_string(),
                        start_hour: 8,
                        end_hour: 18,
                        slots_per_hour: 10,
                    },
                )
            })
            .unwrap();
        let clock = Arc::new(ManualClock::new(dt(now)));
        let executor = BookingExecutor::new(
            store.clone(),
            LockCoordinator::new(Coordinator::in_memory()),
            clock.clone(),
            Duration::from_secs(10),
        );
        (store, clock, executor)
    }

    fn add_slot(store: &Store, start: &str, slot_type: SlotType) -> i64 {
        let start_time = dt(start);
        store
            .read(|conn| {
                queries::insert_slots(
                    conn,
                    &[NewSlot {
                        facility_id: 1,
                        date: start_time.date(),
                        start_time,
                        end_time: start_time + chrono::Duration::minutes(6),
                        slot_type,
                    }],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .unwrap()
    }

    fn set_status(store: &Store, slot_id: i64, status: SlotStatus) {
        store
            .read(|conn| queries::set_slot_status(conn, slot_id, status))
            .unwrap();
    }

    fn patient() -> PatientInfo {
        PatientInfo {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone: "+15551110000".to_string(),
        }
    }

    fn bookings_for(store: &Store, slot_id: i64) -> i64 {
        store
            .read(|conn| queries::count_bookings_for_slot(conn, slot_id))
            .unwrap()
    }

    #[tokio::test]
    async fn test_books_available_online_slot() {
        let (store, _, executor) = setup("2025-06-15 12:00");
        let slot_id = add_slot(&store, "2025-06-16 08:00", SlotType::Online);

        let audit = AuditInfo {
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: Some("test-agent".to_string()),
        };
        let confirmation = executor.book_slot(slot_id, &patient(), &audit).await.unwrap();

        assert_eq!(confirmation.slot.status, SlotStatus::Booked);
        assert_eq!(confirmation.booking.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(bookings_for(&store, slot_id), 1);

        let stored = store
            .read(|conn| queries::get_slot_with_booking(conn, slot_id))
            .unwrap()
            .unwrap();
        assert_eq!(stored.slot.status, SlotStatus::Booked);
        assert_eq!(stored.booking.unwrap().id, confirmation.booking.id);
    }

    #[tokio::test]
    async fn test_missing_slot() {
        let (_, _, executor) = setup("2025-06-15 12:00");
        let err = executor
            .book_slot(404, &patient(), &AuditInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound));
    }

    #[tokio::test]
    async fn test_second_booking_is_rejected() {
        let (store, _, executor) = setup("2025-06-15 12:00");
        let slot_id = add_slot(&store, "2025-06-16 08:00", SlotType::Online);

        executor.book_slot(slot_id, &patient(), &AuditInfo::default()).await.unwrap();
        let err = executor
            .book_slot(slot_id, &patient(), &AuditInfo::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::AlreadyBooked));
        assert_eq!(bookings_for(&store, slot_id), 1);
    }

    #[tokio::test]
    async fn test_offline_slot_never_bookable() {
        let (store, _, executor) = setup("2025-06-16 12:00");
        let slot_id = add_slot(&store, "2025-06-16 08:00", SlotType::Offline);

        for status in [SlotStatus::Available, SlotStatus::Cancelled, SlotStatus::Overridden] {
            set_status(&store, slot_id, status);
            let err = executor
                .book_slot(slot_id, &patient(), &AuditInfo::default())
                .await
                .unwrap_err();
            assert!(matches!(err, BookingError::NotOnlineBookable), "status {status:?}");
        }
        assert_eq!(bookings_for(&store, slot_id), 0);
    }

    #[tokio::test]
    async fn test_express_before_six_on_same_day() {
        let (store, _, executor) = setup("2025-06-16 05:59");
        let slot_id = add_slot(&store, "2025-06-16 10:00", SlotType::ExpressSameDay);

        let err = executor
            .book_slot(slot_id, &patient(), &AuditInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::ExpressNotYetAvailable));
    }

    #[tokio::test]
    async fn test_express_after_six_on_same_day() {
        let (store, clock, executor) = setup("2025-06-16 05:59");
        let slot_id = add_slot(&store, "2025-06-16 10:00", SlotType::ExpressSameDay);

        clock.set(dt("2025-06-16 06:00"));
        executor
            .book_slot(slot_id, &patient(), &AuditInfo::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_express_on_other_date() {
        let (store, _, executor) = setup("2025-06-15 09:00");
        let slot_id = add_slot(&store, "2025-06-16 10:00", SlotType::ExpressSameDay);

        let err = executor
            .book_slot(slot_id, &patient(), &AuditInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::ExpressNotYetAvailable));
    }

    #[tokio::test]
    async fn test_non_available_status_is_invalid_state() {
        let (store, _, executor) = setup("2025-06-15 12:00");
        let slot_id = add_slot(&store, "2025-06-16 08:00", SlotType::Online);
        set_status(&store, slot_id, SlotStatus::Cancelled);

        let err = executor
            .book_slot(slot_id, &patient(), &AuditInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(SlotStatus::Cancelled)));
        assert_eq!(err.to_string(), "Slot is cancelled and cannot be booked");
    }

    #[tokio::test]
    async fn test_booked_status_wins_over_type_rules() {
        let (store, _, executor) = setup("2025-06-15 12:00");
        let slot_id = add_slot(&store, "2025-06-16 08:00", SlotType::Offline);
        set_status(&store, slot_id, SlotStatus::Booked);

        let err = executor
            .book_slot(slot_id, &patient(), &AuditInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::AlreadyBooked));
    }

    #[tokio::test]
    async fn test_lock_is_released_after_rejection() {
        let (store, _, executor) = setup("2025-06-15 12:00");
        let slot_id = add_slot(&store, "2025-06-16 08:00", SlotType::Offline);

        let _ = executor.book_slot(slot_id, &patient(), &AuditInfo::default()).await;

        let attempt = executor
            .locks
            .acquire(&slot_lock_key(slot_id), Duration::from_secs(10))
            .await;
        assert!(matches!(attempt, LockAttempt::Acquired(_)));
    }

    #[tokio::test]
    async fn test_store_failure_rolls_back_and_releases_lock() {
        let (store, _, executor) = setup("2025-06-15 12:00");
        let slot_id = add_slot(&store, "2025-06-16 08:00", SlotType::Online);
        // the booking row goes in first; make the status flip after it fail
        store
            .read(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER fail_status_flip BEFORE UPDATE OF status ON slots
                     BEGIN SELECT RAISE(ABORT, 'status update blocked'); END;",
                )?;
                Ok(())
            })
            .unwrap();

        let result = executor.book_slot(slot_id, &patient(), &AuditInfo::default()).await;

        assert!(matches!(result, Err(BookingError::Internal(_))));
        assert_eq!(bookings_for(&store, slot_id), 0);
        let stored = store
            .read(|conn| queries::get_slot_with_booking(conn, slot_id))
            .unwrap()
            .unwrap();
        assert_eq!(stored.slot.status, SlotStatus::Available);
        assert!(stored.booking.is_none());
        assert!(matches!(
            executor
                .locks
                .acquire(&slot_lock_key(slot_id), Duration::from_secs(10))
                .await,
            LockAttempt::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_held_slot_lock_falls_through_to_transaction() {
        let (store, _, executor) = setup("2025-06-15 12:00");
        let slot_id = add_slot(&store, "2025-06-16 08:00", SlotType::Online);

        let LockAttempt::Acquired(guard) = executor
            .locks
            .acquire(&slot_lock_key(slot_id), Duration::from_secs(10))
            .await
        else {
            panic!("expected lock");
        };

        executor
            .book_slot(slot_id, &patient(), &AuditInfo::default())
            .await
            .unwrap();
        guard.release().await;
    }

    #[tokio::test]
    async fn test_works_without_coordination() {
        let (store, clock, _) = setup("2025-06-15 12:00");
        let slot_id = add_slot(&store, "2025-06-16 08:00", SlotType::Online);
        let executor = BookingExecutor::new(
            store.clone(),
            LockCoordinator::new(Coordinator::Unavailable),
            clock,
            Duration::from_secs(10),
        );

        executor
            .book_slot(slot_id, &patient(), &AuditInfo::default())
            .await
            .unwrap();
        assert!(matches!(
            executor
                .book_slot(slot_id, &patient(), &AuditInfo::default())
                .await,
            Err(BookingError::AlreadyBooked)
        ));
    }
}
