use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::models::SlotStatus;
use crate::services::validation::FieldError;

/// Stable, client-visible outcome codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    AlreadyBooked,
    NotOnlineBookable,
    ExpressNotYetAvailable,
    InvalidState,
    CapacityExceeded,
    NoOnlineSlots,
    RetryLater,
    Busy,
    RateLimited,
    ValidationError,
    Internal,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyBooked
            | ErrorCode::InvalidState
            | ErrorCode::CapacityExceeded
            | ErrorCode::NoOnlineSlots
            | ErrorCode::RetryLater
            | ErrorCode::Busy => StatusCode::CONFLICT,
            ErrorCode::NotOnlineBookable | ErrorCode::ExpressNotYetAvailable => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Reasons a booking attempt did not produce a booking.
///
/// Everything except `Internal` is a business outcome: the store was left
/// untouched and the message is safe to show to the client as-is.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Slot not found")]
    NotFound,

    #[error("This slot is already booked")]
    AlreadyBooked,

    #[error("This slot cannot be booked online")]
    NotOnlineBookable,

    #[error("Express slots can only be booked after 6:00 AM on the same day")]
    ExpressNotYetAvailable,

    #[error("Slot is {} and cannot be booked", .0.as_str().to_lowercase())]
    InvalidState(SlotStatus),

    #[error("This date is nearly fully booked, please choose another date")]
    CapacityExceeded,

    #[error("No online slots are available for this date")]
    NoOnlineSlots,

    #[error("Slots for this date are in high demand, please try again")]
    RetryLater,

    #[error("Another booking for this date is in progress, please try again")]
    Busy,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BookingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BookingError::NotFound => ErrorCode::NotFound,
            BookingError::AlreadyBooked => ErrorCode::AlreadyBooked,
            BookingError::NotOnlineBookable => ErrorCode::NotOnlineBookable,
            BookingError::ExpressNotYetAvailable => ErrorCode::ExpressNotYetAvailable,
            BookingError::InvalidState(_) => ErrorCode::InvalidState,
            BookingError::CapacityExceeded => ErrorCode::CapacityExceeded,
            BookingError::NoOnlineSlots => ErrorCode::NoOnlineSlots,
            BookingError::RetryLater => ErrorCode::RetryLater,
            BookingError::Busy => ErrorCode::Busy,
            BookingError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// The slot changed between listing and the point read.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            BookingError::NotFound | BookingError::AlreadyBooked | BookingError::InvalidState(_)
        )
    }
}

impl From<rusqlite::Error> for BookingError {
    fn from(e: rusqlite::Error) -> Self {
        BookingError::Internal(e.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("validation error")]
    Validation(Vec<FieldError>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { limit: u64, retry_after_secs: u64 },

    #[error("request timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Booking(e) => e.code(),
            AppError::Validation(_) => ErrorCode::ValidationError,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Timeout | AppError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = code.status();

        let body = match &self {
            AppError::Booking(BookingError::Internal(e)) | AppError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                serde_json::json!({
                    "success": false,
                    "error": "Internal Server Error",
                    "code": code,
                    "message": "An unexpected error occurred",
                })
            }
            AppError::Booking(e) => serde_json::json!({
                "success": false,
                "error": "Booking Failed",
                "code": code,
                "message": e.to_string(),
            }),
            AppError::Validation(details) => serde_json::json!({
                "success": false,
                "error": "Validation Error",
                "code": code,
                "message": "Invalid request data",
                "details": details,
            }),
            AppError::NotFound(what) => serde_json::json!({
                "success": false,
                "error": "Not Found",
                "code": code,
                "message": format!("{what} not found"),
            }),
            AppError::RateLimited {
                limit,
                retry_after_secs,
            } => {
                let body = serde_json::json!({
                    "success": false,
                    "error": "Too Many Requests",
                    "code": code,
                    "message": format!("Rate limit exceeded. Maximum {limit} requests per window."),
                    "retryAfter": retry_after_secs,
                });
                return (
                    status,
                    [(header::RETRY_AFTER, retry_after_secs.to_string())],
                    axum::Json(body),
                )
                    .into_response();
            }
            AppError::Timeout => {
                tracing::warn!("request timed out");
                serde_json::json!({
                    "success": false,
                    "error": "Internal Server Error",
                    "code": code,
                    "message": "The request timed out, please try again",
                })
            }
        };

        (status, axum::Json(body)).into_response()
    }
}
