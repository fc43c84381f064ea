use crate::error::BookingError;
use crate::logic::{AddSlotRequest, BookingLifecycle, CreateBookingRequest};
use chrono::{Duration, NaiveTime, Utc};
use darsly_common::models::{BookingPaymentStatus, BookingStatus, SlotStatus};
use darsly_common::services::{BoxFuture, BoxedError, RateCard, RateProvider};
use darsly_db::{DbClient, SqlSlotRepository};
use std::sync::Arc;

struct FixedRate;

impl RateProvider for FixedRate {
    fn unit_price(
        &self,
        _teacher_id: &str,
        _subject_id: Option<&str>,
    ) -> BoxFuture<'_, RateCard, BoxedError> {
        Box::pin(async {
            Ok(RateCard {
                unit_amount: 5000,
                currency: "AED".to_string(),
                product_name: Some("Private session".to_string()),
            })
        })
    }
}

async fn setup() -> (Arc<BookingLifecycle>, SqlSlotRepository) {
    let db = DbClient::from_url("sqlite::memory:").await.expect("db");
    let lifecycle = Arc::new(BookingLifecycle::new(db.clone(), Arc::new(FixedRate)));
    lifecycle.init_schema().await.expect("schema");
    (lifecycle, SqlSlotRepository::new(db))
}

async fn publish_slot(lifecycle: &BookingLifecycle, teacher_id: &str, hour: u32) -> String {
    let date = (Utc::now() + Duration::days(30)).date_naive();
    let slot = lifecycle
        .add_slot(AddSlotRequest {
            teacher_id: teacher_id.to_string(),
            date,
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
            subject_id: None,
        })
        .await
        .expect("slot published");
    slot.id
}

fn request(student: &str, teacher: &str, slot_ids: Vec<String>) -> CreateBookingRequest {
    CreateBookingRequest {
        student_id: student.to_string(),
        teacher_id: teacher.to_string(),
        slot_ids,
        subject_id: None,
        subject_label: Some("Mathematics".to_string()),
    }
}

#[tokio::test]
async fn create_computes_total_from_rate_and_slot_count() {
    let (lifecycle, slots) = setup().await;
    let s1 = publish_slot(&lifecycle, "teacher-1", 10).await;
    let s2 = publish_slot(&lifecycle, "teacher-1", 12).await;

    let booking = lifecycle
        .create(request("student-1", "teacher-1", vec![s1.clone(), s2.clone()]))
        .await
        .expect("booking created");

    // 2 slots at 50.00 AED each => 100.00 AED
    assert_eq!(booking.unit_price, 5000);
    assert_eq!(booking.total_price, 10000);
    assert_eq!(booking.currency, "AED");
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.payment_status, BookingPaymentStatus::Pending);

    for id in [&s1, &s2] {
        let slot = slots.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(slot.status, SlotStatus::Booked);
        assert_eq!(slot.booking_id.as_deref(), Some(booking.id.as_str()));
    }
}

#[tokio::test]
async fn create_rejects_empty_and_mixed_requests() {
    let (lifecycle, _) = setup().await;
    let s1 = publish_slot(&lifecycle, "teacher-1", 10).await;
    let s2 = publish_slot(&lifecycle, "teacher-2", 10).await;

    let err = lifecycle
        .create(request("student-1", "teacher-1", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NoSlotsSelected));

    let err = lifecycle
        .create(request("student-1", "teacher-1", vec![s1, s2]))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::MixedTeachers));
}

#[tokio::test]
async fn overlapping_bookings_have_one_winner() {
    let (lifecycle, slots) = setup().await;
    let s1 = publish_slot(&lifecycle, "teacher-1", 10).await;
    let s2 = publish_slot(&lifecycle, "teacher-1", 12).await;

    let first = lifecycle
        .create(request("student-1", "teacher-1", vec![s1.clone()]))
        .await
        .expect("first booking wins");

    // Second student asks for the taken slot plus a free one: the whole
    // request fails and the free slot stays free.
    let err = lifecycle
        .create(request("student-2", "teacher-1", vec![s2.clone(), s1.clone()]))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SlotUnavailable { ref slot_id } if *slot_id == s1));

    let free = slots.find_by_id(&s2).await.unwrap().unwrap();
    assert_eq!(free.status, SlotStatus::Available);

    let taken = slots.find_by_id(&s1).await.unwrap().unwrap();
    assert_eq!(taken.booking_id.as_deref(), Some(first.id.as_str()));
}

#[tokio::test]
async fn reject_releases_slots_for_rebooking() {
    let (lifecycle, slots) = setup().await;
    let s1 = publish_slot(&lifecycle, "teacher-1", 10).await;

    let booking = lifecycle
        .create(request("student-1", "teacher-1", vec![s1.clone()]))
        .await
        .unwrap();

    let err = lifecycle
        .reject(&booking.id, "someone-else", None)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Unauthorized));

    let rejected = lifecycle
        .reject(&booking.id, "teacher-1", Some("not available"))
        .await
        .unwrap();
    assert_eq!(rejected.status, BookingStatus::Rejected);
    assert!(rejected.rejected_at.is_some());

    let slot = slots.find_by_id(&s1).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Available);
    assert_eq!(slot.booking_id, None);

    // Another student can now take the same interval.
    lifecycle
        .create(request("student-2", "teacher-1", vec![s1]))
        .await
        .expect("rebooking succeeds");
}

#[tokio::test]
async fn cancel_is_limited_to_participants_and_non_completed() {
    let (lifecycle, slots) = setup().await;
    let s1 = publish_slot(&lifecycle, "teacher-1", 10).await;
    let booking = lifecycle
        .create(request("student-1", "teacher-1", vec![s1.clone()]))
        .await
        .unwrap();

    let err = lifecycle.cancel(&booking.id, "stranger").await.unwrap_err();
    assert!(matches!(err, BookingError::Unauthorized));

    lifecycle.approve(&booking.id, "teacher-1").await.unwrap();
    lifecycle.complete(&booking.id, "teacher-1").await.unwrap();

    let err = lifecycle.cancel(&booking.id, "student-1").await.unwrap_err();
    assert!(matches!(err, BookingError::AlreadyCompleted));

    // Completion does not release the slot.
    let slot = slots.find_by_id(&s1).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Booked);
}

#[tokio::test]
async fn approve_transitions_once() {
    let (lifecycle, _) = setup().await;
    let s1 = publish_slot(&lifecycle, "teacher-1", 10).await;
    let booking = lifecycle
        .create(request("student-1", "teacher-1", vec![s1]))
        .await
        .unwrap();

    let err = lifecycle
        .approve(&booking.id, "teacher-2")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Unauthorized));

    let approved = lifecycle.approve(&booking.id, "teacher-1").await.unwrap();
    assert_eq!(approved.status, BookingStatus::Confirmed);
    assert!(approved.approved_at.is_some());

    let err = lifecycle
        .approve(&booking.id, "teacher-1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::AlreadyFinalized(BookingStatus::Confirmed)
    ));
}

#[tokio::test]
async fn finalize_on_payment_is_idempotent_and_advances_pending() {
    let (lifecycle, _) = setup().await;
    let s1 = publish_slot(&lifecycle, "teacher-1", 10).await;
    let booking = lifecycle
        .create(request("student-1", "teacher-1", vec![s1]))
        .await
        .unwrap();

    assert!(lifecycle.finalize_on_payment(&booking.id).await.unwrap());
    assert!(!lifecycle.finalize_on_payment(&booking.id).await.unwrap());

    let paid = lifecycle.get(&booking.id).await.unwrap();
    assert_eq!(paid.payment_status, BookingPaymentStatus::Paid);
    assert_eq!(paid.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn complete_requires_confirmed() {
    let (lifecycle, _) = setup().await;
    let s1 = publish_slot(&lifecycle, "teacher-1", 10).await;
    let booking = lifecycle
        .create(request("student-1", "teacher-1", vec![s1]))
        .await
        .unwrap();

    let err = lifecycle
        .complete(&booking.id, "teacher-1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::NotConfirmed(BookingStatus::Pending)
    ));
}
