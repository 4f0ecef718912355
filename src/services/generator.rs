use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::db::{queries, Store};
use crate::models::{Facility, NewSlot, SlotType};

pub const DAILY_SLOTS: usize = 100;
pub const ONLINE_SLOTS: usize = 50;
pub const EXPRESS_SLOTS: usize = 30;
pub const OFFLINE_SLOTS: usize = 20;
pub const SLOT_MINUTES: i64 = 6;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("facility {facility_id} is open {window_minutes} minutes, too short for 100 slots of 6 minutes")]
    WindowTooShort { facility_id: i64, window_minutes: i64 },
    #[error("facility {0} has an invalid opening hour")]
    InvalidHours(i64),
}

/// One day of slots for `facility`, spread evenly over its opening hours
/// with the type mix shuffled.
pub fn generate_day<R: Rng + ?Sized>(
    facility: &Facility,
    date: NaiveDate,
    rng: &mut R,
) -> Result<Vec<NewSlot>, GenerationError> {
    let window_minutes = facility.operating_minutes();
    let spacing_secs = window_minutes * 60 / DAILY_SLOTS as i64;
    if spacing_secs < SLOT_MINUTES * 60 {
        return Err(GenerationError::WindowTooShort {
            facility_id: facility.id,
            window_minutes,
        });
    }

    let opening = date
        .and_hms_opt(facility.start_hour, 0, 0)
        .ok_or(GenerationError::InvalidHours(facility.id))?;

    let mut types = Vec::with_capacity(DAILY_SLOTS);
    types.extend(std::iter::repeat(SlotType::Online).take(ONLINE_SLOTS));
    types.extend(std::iter::repeat(SlotType::ExpressSameDay).take(EXPRESS_SLOTS));
    types.extend(std::iter::repeat(SlotType::Offline).take(OFFLINE_SLOTS));
    types.shuffle(rng);

    let slots = types
        .into_iter()
        .enumerate()
        .map(|(i, slot_type)| {
            let start_time = opening + Duration::seconds(spacing_secs * i as i64);
            NewSlot {
                facility_id: facility.id,
                date,
                start_time,
                end_time: start_time + Duration::minutes(SLOT_MINUTES),
                slot_type,
            }
        })
        .collect();

    Ok(slots)
}

pub fn default_facility() -> Facility {
    Facility {
        id: 1,
        name: "Main Healthcare Facility".to_string(),
        address: "123 Health Street, City, State 12345".to_string(),
        start_hour: 8,
        end_hour: 18,
        slots_per_hour: 10,
    }
}

/// Returns the first facility, creating the default one on an empty database.
pub fn ensure_default_facility(store: &Store) -> anyhow::Result<Facility> {
    store.transaction(|tx| {
        if let Some(existing) = queries::list_facilities(tx)?.into_iter().next() {
            return Ok(existing);
        }
        let mut facility = default_facility();
        facility.id = queries::insert_facility(tx, &facility)?;
        tracing::info!(facility_id = facility.id, name = %facility.name, "created default facility");
        Ok(facility)
    })
}

/// Generates slots for `days` consecutive dates starting at `from`. Dates
/// that already have slots for the facility are left alone.
pub fn seed_days(store: &Store, facility: &Facility, from: NaiveDate, days: u32) -> anyhow::Result<usize> {
    let mut rng = rand::thread_rng();
    let mut created = 0;

    for offset in 0..days {
        let date = from + Duration::days(i64::from(offset));
        created += store.transaction(|tx| -> anyhow::Result<usize> {
            if queries::count_slots_for_facility_date(tx, facility.id, date)? > 0 {
                return Ok(0);
            }
            let slots = generate_day(facility, date, &mut rng)?;
            queries::insert_slots(tx, &slots)
        })?;
    }

    if created > 0 {
        tracing::info!(facility_id = facility.id, %from, days, created, "seeded slots");
    } else {
        tracing::debug!(facility_id = facility.id, %from, days, "slots already seeded");
    }
    Ok(created)
}
