// --- File: crates/darsly_booking/src/routes.rs ---

use axum::{
    routing::{delete, get, post},
    Router,
};
use darsly_config::AppConfig;
use std::sync::Arc;

use crate::handlers::{
    add_slot_handler, approve_booking_handler, cancel_booking_handler, complete_booking_handler,
    create_booking_handler, get_booking_handler, list_slots_handler,
    list_student_bookings_handler, list_teacher_bookings_handler, reject_booking_handler,
    remove_slot_handler, BookingState,
};
use crate::logic::BookingLifecycle;

/// Creates a router containing all routes for the booking feature.
///
/// # Arguments
/// * `config` - Shared application configuration (`Arc<AppConfig>`).
/// * `lifecycle` - The shared booking lifecycle service.
///
/// # Returns
/// An Axum Router configured with booking routes and state.
pub fn routes(config: Arc<AppConfig>, lifecycle: Arc<BookingLifecycle>) -> Router {
    let booking_state = Arc::new(BookingState { config, lifecycle });

    Router::new()
        // Teacher scheduling surface
        .route("/slots", post(add_slot_handler))
        .route("/slots/teacher/{teacher_id}", get(list_slots_handler))
        .route("/slots/{slot_id}", delete(remove_slot_handler))
        // Booking lifecycle
        .route("/bookings", post(create_booking_handler))
        .route("/bookings/{booking_id}", get(get_booking_handler))
        .route("/bookings/student/{student_id}", get(list_student_bookings_handler))
        .route("/bookings/teacher/{teacher_id}", get(list_teacher_bookings_handler))
        .route("/bookings/{booking_id}/approve", post(approve_booking_handler))
        .route("/bookings/{booking_id}/reject", post(reject_booking_handler))
        .route("/bookings/{booking_id}/cancel", post(cancel_booking_handler))
        .route("/bookings/{booking_id}/complete", post(complete_booking_handler))
        .with_state(booking_state)
}
