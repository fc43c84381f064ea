// File: crates/darsly_booking/src/handlers.rs
use crate::error::BookingError;
use crate::logic::{AddSlotRequest, BookingLifecycle, CreateBookingRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use darsly_common::models::{Booking, Slot};
use darsly_common::HttpStatusCode;
use darsly_config::AppConfig;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

// Define shared state needed by booking handlers
#[derive(Clone)]
pub struct BookingState {
    pub config: Arc<AppConfig>,
    pub lifecycle: Arc<BookingLifecycle>,
}

fn into_response(err: BookingError) -> (StatusCode, String) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Booking operation failed: {}", err);
    }
    (status, err.to_string())
}

#[derive(Deserialize, Debug)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TeacherActionRequest {
    pub teacher_id: String,
    pub reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CancelBookingRequest {
    pub user_id: String,
}

/// Handler to publish a teacher availability slot.
#[axum::debug_handler]
pub async fn add_slot_handler(
    State(state): State<Arc<BookingState>>,
    Json(payload): Json<AddSlotRequest>,
) -> Result<Json<Slot>, (StatusCode, String)> {
    if payload.end_time <= payload.start_time {
        return Err((
            StatusCode::BAD_REQUEST,
            "end_time must be after start_time".to_string(),
        ));
    }

    state
        .lifecycle
        .add_slot(payload)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler to list a teacher's slots.
#[axum::debug_handler]
pub async fn list_slots_handler(
    State(state): State<Arc<BookingState>>,
    Path(teacher_id): Path<String>,
) -> Result<Json<Vec<Slot>>, (StatusCode, String)> {
    state
        .lifecycle
        .list_slots(&teacher_id)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler to delete a still-available slot.
#[axum::debug_handler]
pub async fn remove_slot_handler(
    State(state): State<Arc<BookingState>>,
    Path(slot_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .lifecycle
        .remove_slot(&slot_id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(into_response)
}

/// Handler to create a booking (atomic slot reservation).
#[axum::debug_handler]
pub async fn create_booking_handler(
    State(state): State<Arc<BookingState>>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<Json<Booking>, (StatusCode, String)> {
    state
        .lifecycle
        .create(payload)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler to fetch a booking.
#[axum::debug_handler]
pub async fn get_booking_handler(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, (StatusCode, String)> {
    state
        .lifecycle
        .get(&booking_id)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler to list a student's bookings.
#[axum::debug_handler]
pub async fn list_student_bookings_handler(
    State(state): State<Arc<BookingState>>,
    Path(student_id): Path<String>,
) -> Result<Json<Vec<Booking>>, (StatusCode, String)> {
    state
        .lifecycle
        .list_for_student(&student_id)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler to list a teacher's bookings.
#[axum::debug_handler]
pub async fn list_teacher_bookings_handler(
    State(state): State<Arc<BookingState>>,
    Path(teacher_id): Path<String>,
) -> Result<Json<Vec<Booking>>, (StatusCode, String)> {
    state
        .lifecycle
        .list_for_teacher(&teacher_id)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler for teacher approval of a pending booking.
#[axum::debug_handler]
pub async fn approve_booking_handler(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<String>,
    Json(payload): Json<TeacherActionRequest>,
) -> Result<Json<Booking>, (StatusCode, String)> {
    state
        .lifecycle
        .approve(&booking_id, &payload.teacher_id)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler for teacher rejection of a pending booking.
#[axum::debug_handler]
pub async fn reject_booking_handler(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<String>,
    Json(payload): Json<TeacherActionRequest>,
) -> Result<Json<Booking>, (StatusCode, String)> {
    state
        .lifecycle
        .reject(&booking_id, &payload.teacher_id, payload.reason.as_deref())
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler for student/teacher cancellation.
#[axum::debug_handler]
pub async fn cancel_booking_handler(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<String>,
    Json(payload): Json<CancelBookingRequest>,
) -> Result<Json<Booking>, (StatusCode, String)> {
    state
        .lifecycle
        .cancel(&booking_id, &payload.user_id)
        .await
        .map(Json)
        .map_err(into_response)
}

/// Handler for marking a session delivered.
#[axum::debug_handler]
pub async fn complete_booking_handler(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<String>,
    Json(payload): Json<TeacherActionRequest>,
) -> Result<Json<Booking>, (StatusCode, String)> {
    state
        .lifecycle
        .complete(&booking_id, &payload.teacher_id)
        .await
        .map(Json)
        .map_err(into_response)
}
