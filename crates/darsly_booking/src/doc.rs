// File: crates/darsly_booking/src/doc.rs
#![allow(dead_code)] // Allow dead code for doc functions

#[cfg(feature = "openapi")]
use crate::logic::{AddSlotRequest, CreateBookingRequest};
#[cfg(feature = "openapi")]
use darsly_common::models::{Booking, BookingPaymentStatus, BookingStatus, Slot, SlotStatus};
#[cfg(feature = "openapi")]
use utoipa::OpenApi;

// Dummy functions carrying the handler attributes for utoipa
#[cfg(feature = "openapi")]
#[utoipa::path(
    post,
    path = "/api/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 200, description = "Booking created and slots reserved", body = Booking),
        (status = 400, description = "Bad request (no slots, mixed teachers, slot in past)"),
        (status = 409, description = "A requested slot is no longer available"),
    ),
    tag = "Bookings"
)]
fn doc_create_booking_handler() {}

#[cfg(feature = "openapi")]
#[utoipa::path(
    post,
    path = "/api/slots",
    request_body = AddSlotRequest,
    responses(
        (status = 200, description = "Slot published", body = Slot),
        (status = 400, description = "Bad request"),
    ),
    tag = "Bookings"
)]
fn doc_add_slot_handler() {}

#[cfg(feature = "openapi")]
#[derive(OpenApi)]
#[openapi(
    paths(doc_create_booking_handler, doc_add_slot_handler),
    components(schemas(
        CreateBookingRequest,
        AddSlotRequest,
        Booking,
        Slot,
        BookingStatus,
        BookingPaymentStatus,
        SlotStatus
    )),
    tags(
        (name = "Bookings", description = "Slot reservation and booking lifecycle API")
    )
)]
pub struct BookingApiDoc;
