pub mod admin;
pub mod booking;
pub mod health;
pub mod slots;

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{header, HeaderValue, Method, Uri};
use axum::routing::{get, post};
use axum::Router;
use chrono::NaiveDateTime;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::services::validation::FieldError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/slots", get(slots::list_slots))
        .route("/book", post(booking::book_slot))
        .route("/book/by-date", post(booking::book_by_date))
        .route("/bookings/:id", get(booking::get_booking))
        .route("/admin/slots", get(admin::list_booked_slots))
        .route("/admin/slot/override", post(admin::override_slot))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit,
        ));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api)
        .fallback(not_found)
        .layer(cors_layer(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn not_found(method: Method, uri: Uri) -> AppError {
    AppError::NotFound(format!("Route {method} {}", uri.path()))
}

/// ISO-8601 without offset; all slot times are facility-local.
pub(crate) fn iso_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub(crate) fn body_error(rejection: JsonRejection) -> AppError {
    AppError::Validation(vec![FieldError {
        path: "body".to_string(),
        message: rejection.body_text(),
    }])
}

pub(crate) fn query_error(rejection: QueryRejection) -> AppError {
    AppError::Validation(vec![FieldError {
        path: "query".to_string(),
        message: rejection.body_text(),
    }])
}
