use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub slot_id: i64,
    pub patient_name: String,
    pub patient_email: String,
    pub patient_phone: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Who the booking is for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Where the request came from; stored on the booking row.
#[derive(Debug, Clone, Default)]
pub struct AuditInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
