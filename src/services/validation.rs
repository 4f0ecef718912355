use chrono::NaiveDate;
use serde::Serialize;

use crate::models::PatientInfo;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_EMAIL_LEN: usize = 255;
pub const MIN_PHONE_LEN: usize = 10;
pub const MAX_PHONE_LEN: usize = 20;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

pub fn validate_slot_id(slot_id: i64) -> Result<i64, FieldError> {
    if slot_id <= 0 {
        return Err(FieldError::new("slotId", "Slot id must be a positive integer"));
    }
    Ok(slot_id)
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, FieldError> {
    let well_formed = value.len() == 10
        && value
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    if !well_formed {
        return Err(FieldError::new(field, "Date must be in YYYY-MM-DD format"));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| FieldError::new(field, "Date is not a valid calendar date"))
}

/// Checks the three patient fields together so the client sees every problem at once.
pub fn validate_patient(name: &str, email: &str, phone: &str) -> Result<PatientInfo, Vec<FieldError>> {
    let mut errors = vec![];

    let name_len = name.chars().count();
    if name_len == 0 || name_len > MAX_NAME_LEN {
        errors.push(FieldError::new(
            "patientName",
            format!("Name must be between 1 and {MAX_NAME_LEN} characters"),
        ));
    }

    if email.chars().count() > MAX_EMAIL_LEN {
        errors.push(FieldError::new(
            "patientEmail",
            format!("Email must be at most {MAX_EMAIL_LEN} characters"),
        ));
    } else if !is_valid_email(email) {
        errors.push(FieldError::new("patientEmail", "Invalid email"));
    }

    let phone_len = phone.chars().count();
    if !(MIN_PHONE_LEN..=MAX_PHONE_LEN).contains(&phone_len) {
        errors.push(FieldError::new(
            "patientPhone",
            format!("Phone must be between {MIN_PHONE_LEN} and {MAX_PHONE_LEN} characters"),
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(PatientInfo {
        name: name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
    })
}

pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => {
            !host.is_empty() && !host.starts_with('.') && !host.ends_with('.') && tld.len() >= 2
        }
        None => false,
    }
}
