use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    AuditInfo, Booking, Facility, NewSlot, PatientInfo, Slot, SlotStatus, SlotType,
    SlotWithBooking,
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SLOT_COLUMNS: &str = "s.id, s.facility_id, s.date, s.start_time, s.end_time, s.type, s.status, s.created_at, s.updated_at,
     b.id, b.slot_id, b.patient_name, b.patient_email, b.patient_phone, b.ip_address, b.user_agent, b.created_at";

// ── Facilities ──

pub fn insert_facility(conn: &Connection, facility: &Facility) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO facilities (name, address, start_hour, end_hour, slots_per_hour)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            facility.name,
            facility.address,
            facility.start_hour,
            facility.end_hour,
            facility.slots_per_hour,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_facilities(conn: &Connection) -> anyhow::Result<Vec<Facility>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, address, start_hour, end_hour, slots_per_hour FROM facilities ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], parse_facility_row)?;

    let mut facilities = vec![];
    for row in rows {
        facilities.push(row?);
    }
    Ok(facilities)
}

fn parse_facility_row(row: &rusqlite::Row) -> rusqlite::Result<Facility> {
    Ok(Facility {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        start_hour: row.get(3)?,
        end_hour: row.get(4)?,
        slots_per_hour: row.get(5)?,
    })
}

// ── Slots ──

pub fn insert_slots(conn: &Connection, slots: &[NewSlot]) -> anyhow::Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO slots (facility_id, date, start_time, end_time, type)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    let mut inserted = 0;
    for slot in slots {
        inserted += stmt.execute(params![
            slot.facility_id,
            slot.date.format(DATE_FORMAT).to_string(),
            slot.start_time.format(DATETIME_FORMAT).to_string(),
            slot.end_time.format(DATETIME_FORMAT).to_string(),
            slot.slot_type.as_str(),
        ])?;
    }
    Ok(inserted)
}

pub fn count_slots_for_facility_date(
    conn: &Connection,
    facility_id: i64,
    date: NaiveDate,
) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM slots WHERE facility_id = ?1 AND date = ?2",
        params![facility_id, date.format(DATE_FORMAT).to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Point read of one slot and its booking.
pub fn get_slot_with_booking(
    conn: &Connection,
    slot_id: i64,
) -> anyhow::Result<Option<SlotWithBooking>> {
    let sql = format!(
        "SELECT {SLOT_COLUMNS} FROM slots s LEFT JOIN bookings b ON b.slot_id = s.id WHERE s.id = ?1"
    );
    let result = conn
        .query_row(&sql, params![slot_id], |row| Ok(parse_slot_row(row)))
        .optional()?;

    match result {
        Some(slot) => Ok(Some(slot?)),
        None => Ok(None),
    }
}

/// All slots on `date`, in display order (start time, then type).
pub fn get_slots_for_date(conn: &Connection, date: NaiveDate) -> anyhow::Result<Vec<SlotWithBooking>> {
    let date = date.format(DATE_FORMAT).to_string();
    query_slots(
        conn,
        &format!(
            "SELECT {SLOT_COLUMNS} FROM slots s LEFT JOIN bookings b ON b.slot_id = s.id
             WHERE s.date = ?1 ORDER BY s.start_time ASC, s.type ASC"
        ),
        params![date],
    )
}

/// All slots on `date`, grouped by type and then by start time.
pub fn get_slots_for_allocation(
    conn: &Connection,
    date: NaiveDate,
) -> anyhow::Result<Vec<SlotWithBooking>> {
    let date = date.format(DATE_FORMAT).to_string();
    query_slots(
        conn,
        &format!(
            "SELECT {SLOT_COLUMNS} FROM slots s LEFT JOIN bookings b ON b.slot_id = s.id
             WHERE s.date = ?1 ORDER BY s.type ASC, s.start_time ASC"
        ),
        params![date],
    )
}

#[derive(Debug, Clone, Default)]
pub struct BookedSlotFilter {
    pub date: Option<NaiveDate>,
    pub slot_type: Option<SlotType>,
    pub status: Option<SlotStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Slots that carry a booking, for the admin listing.
pub fn get_booked_slots(
    conn: &Connection,
    filter: &BookedSlotFilter,
) -> anyhow::Result<Vec<SlotWithBooking>> {
    let mut sql = format!(
        "SELECT {SLOT_COLUMNS} FROM slots s INNER JOIN bookings b ON b.slot_id = s.id WHERE 1 = 1"
    );
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(date) = filter.date {
        params_vec.push(Box::new(date.format(DATE_FORMAT).to_string()));
        sql.push_str(&format!(" AND s.date = ?{}", params_vec.len()));
    }
    if let Some(slot_type) = filter.slot_type {
        params_vec.push(Box::new(slot_type.as_str()));
        sql.push_str(&format!(" AND s.type = ?{}", params_vec.len()));
    }
    if let Some(status) = filter.status {
        params_vec.push(Box::new(status.as_str()));
        sql.push_str(&format!(" AND s.status = ?{}", params_vec.len()));
    }

    params_vec.push(Box::new(filter.limit));
    sql.push_str(&format!(
        " ORDER BY s.date ASC, s.start_time ASC LIMIT ?{}",
        params_vec.len()
    ));
    params_vec.push(Box::new(filter.offset));
    sql.push_str(&format!(" OFFSET ?{}", params_vec.len()));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    query_slots(conn, &sql, params_refs.as_slice())
}

pub fn set_slot_status(conn: &Connection, slot_id: i64, status: SlotStatus) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE slots SET status = ?1, updated_at = datetime('now', 'localtime') WHERE id = ?2",
        params![status.as_str(), slot_id],
    )?;
    Ok(count > 0)
}

fn query_slots(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> anyhow::Result<Vec<SlotWithBooking>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(parse_slot_row(row)))?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row??);
    }
    Ok(slots)
}

fn parse_slot_row(row: &rusqlite::Row) -> anyhow::Result<SlotWithBooking> {
    let date_str: String = row.get(2)?;
    let start_str: String = row.get(3)?;
    let end_str: String = row.get(4)?;
    let type_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    let slot = Slot {
        id: row.get(0)?,
        facility_id: row.get(1)?,
        date: NaiveDate::parse_from_str(&date_str, DATE_FORMAT)?,
        start_time: NaiveDateTime::parse_from_str(&start_str, DATETIME_FORMAT)?,
        end_time: NaiveDateTime::parse_from_str(&end_str, DATETIME_FORMAT)?,
        slot_type: SlotType::parse(&type_str)
            .ok_or_else(|| anyhow::anyhow!("unknown slot type: {type_str}"))?,
        status: SlotStatus::parse(&status_str)
            .ok_or_else(|| anyhow::anyhow!("unknown slot status: {status_str}"))?,
        created_at: NaiveDateTime::parse_from_str(&created_at_str, DATETIME_FORMAT)?,
        updated_at: NaiveDateTime::parse_from_str(&updated_at_str, DATETIME_FORMAT)?,
    };

    let booking_id: Option<i64> = row.get(9)?;
    let booking = match booking_id {
        Some(id) => {
            let created_at_str: String = row.get(16)?;
            Some(Booking {
                id,
                slot_id: row.get(10)?,
                patient_name: row.get(11)?,
                patient_email: row.get(12)?,
                patient_phone: row.get(13)?,
                ip_address: row.get(14)?,
                user_agent: row.get(15)?,
                created_at: NaiveDateTime::parse_from_str(&created_at_str, DATETIME_FORMAT)?,
            })
        }
        None => None,
    };

    Ok(SlotWithBooking { slot, booking })
}

// ── Bookings ──

pub fn create_booking(
    conn: &Connection,
    slot_id: i64,
    patient: &PatientInfo,
    audit: &AuditInfo,
    created_at: NaiveDateTime,
) -> rusqlite::Result<Booking> {
    conn.execute(
        "INSERT INTO bookings (slot_id, patient_name, patient_email, patient_phone, ip_address, user_agent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            slot_id,
            patient.name,
            patient.email,
            patient.phone,
            audit.ip_address,
            audit.user_agent,
            created_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;

    Ok(Booking {
        id: conn.last_insert_rowid(),
        slot_id,
        patient_name: patient.name.clone(),
        patient_email: patient.email.clone(),
        patient_phone: patient.phone.clone(),
        ip_address: audit.ip_address.clone(),
        user_agent: audit.user_agent.clone(),
        created_at,
    })
}

pub fn count_bookings_for_slot(conn: &Connection, slot_id: i64) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE slot_id = ?1",
        params![slot_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn get_booking_by_id(conn: &Connection, id: i64) -> anyhow::Result<Option<Booking>> {
    let booking = conn
        .query_row(
            "SELECT id, slot_id, patient_name, patient_email, patient_phone, ip_address, user_agent, created_at
             FROM bookings WHERE id = ?1",
            params![id],
            |row| {
                let created_at: String = row.get(7)?;
                Ok(Booking {
                    id: row.get(0)?,
                    slot_id: row.get(1)?,
                    patient_name: row.get(2)?,
                    patient_email: row.get(3)?,
                    patient_phone: row.get(4)?,
                    ip_address: row.get(5)?,
                    user_agent: row.get(6)?,
                    created_at: parse_datetime_column(7, &created_at)?,
                })
            },
        )
        .optional()?;
    Ok(booking)
}

fn parse_datetime_column(idx: usize, value: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
