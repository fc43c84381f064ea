use crate::client::DbClient;
use crate::repositories::slot::ReserveError;
use crate::repositories::{SqlBookingRepository, SqlPaymentRepository, SqlSlotRepository};
use chrono::{NaiveDate, NaiveTime, Utc};
use darsly_common::models::{
    Booking, BookingPaymentStatus, BookingStatus, Payment, PaymentStatus, Slot, SlotStatus,
};

async fn setup() -> (DbClient, SqlSlotRepository, SqlBookingRepository, SqlPaymentRepository) {
    let client = DbClient::from_url("sqlite::memory:")
        .await
        .expect("in-memory db");
    let slots = SqlSlotRepository::new(client.clone());
    let bookings = SqlBookingRepository::new(client.clone());
    let payments = SqlPaymentRepository::new(client.clone());
    slots.init_schema().await.expect("slots schema");
    bookings.init_schema().await.expect("bookings schema");
    payments.init_schema().await.expect("payments schema");
    (client, slots, bookings, payments)
}

fn slot(id: &str, teacher_id: &str) -> Slot {
    Slot {
        id: id.to_string(),
        teacher_id: teacher_id.to_string(),
        date: NaiveDate::from_ymd_opt(2026, 9, 14).unwrap(),
        start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
        subject_id: None,
        status: SlotStatus::Available,
        booking_id: None,
    }
}

fn booking(id: &str, teacher_id: &str, slot_ids: &[&str]) -> Booking {
    Booking {
        id: id.to_string(),
        teacher_id: teacher_id.to_string(),
        student_id: "student-1".to_string(),
        slot_ids: slot_ids.iter().map(|s| s.to_string()).collect(),
        subject_label: "Mathematics".to_string(),
        unit_price: 5000,
        total_price: 5000 * slot_ids.len() as i64,
        currency: "AED".to_string(),
        status: BookingStatus::Pending,
        payment_status: BookingPaymentStatus::Pending,
        created_at: Utc::now(),
        approved_at: None,
        rejected_at: None,
        cancelled_at: None,
        completed_at: None,
    }
}

fn payment(id: &str, booking_id: &str) -> Payment {
    Payment {
        id: id.to_string(),
        booking_id: booking_id.to_string(),
        student_id: "student-1".to_string(),
        teacher_id: "teacher-1".to_string(),
        amount: 10000,
        currency: "AED".to_string(),
        status: PaymentStatus::Pending,
        gateway_order_id: None,
        reference: format!("ref-{}", id),
        gateway_payload: None,
        created_at: Utc::now(),
        paid_at: None,
        failed_at: None,
        refunded_at: None,
        failure_reason: None,
    }
}

async fn try_reserve(
    client: &DbClient,
    slots: &SqlSlotRepository,
    slot_ids: &[String],
    teacher_id: &str,
    booking_id: &str,
) -> Result<(), ReserveError> {
    let mut tx = client.begin().await.expect("begin");
    match slots.reserve_tx(&mut tx, slot_ids, teacher_id, booking_id).await {
        Ok(()) => {
            tx.commit().await.expect("commit");
            Ok(())
        }
        Err(e) => {
            tx.rollback().await.expect("rollback");
            Err(e)
        }
    }
}

#[tokio::test]
async fn reserve_is_all_or_nothing() {
    let (client, slots, _, _) = setup().await;
    slots.insert(&slot("s1", "teacher-1")).await.unwrap();
    let mut taken = slot("s2", "teacher-1");
    taken.status = SlotStatus::Booked;
    taken.booking_id = Some("other".to_string());
    slots.insert(&taken).await.unwrap();

    let ids = vec!["s1".to_string(), "s2".to_string()];
    let result = try_reserve(&client, &slots, &ids, "teacher-1", "b1").await;
    assert!(matches!(result, Err(ReserveError::Unavailable { ref slot_id }) if slot_id == "s2"));

    // The rollback must have left s1 untouched.
    let s1 = slots.find_by_id("s1").await.unwrap().unwrap();
    assert_eq!(s1.status, SlotStatus::Available);
    assert_eq!(s1.booking_id, None);
}

#[tokio::test]
async fn concurrent_reserve_has_exactly_one_winner() {
    let (client, slots, _, _) = setup().await;
    slots.insert(&slot("s1", "teacher-1")).await.unwrap();

    let ids = vec!["s1".to_string()];
    let (a, b) = tokio::join!(
        try_reserve(&client, &slots, &ids, "teacher-1", "booking-a"),
        try_reserve(&client, &slots, &ids, "teacher-1", "booking-b"),
    );

    assert!(
        a.is_ok() != b.is_ok(),
        "exactly one reservation must win, got a={:?} b={:?}",
        a.is_ok(),
        b.is_ok()
    );

    let s1 = slots.find_by_id("s1").await.unwrap().unwrap();
    assert_eq!(s1.status, SlotStatus::Booked);
    let winner = if a.is_ok() { "booking-a" } else { "booking-b" };
    assert_eq!(s1.booking_id.as_deref(), Some(winner));
}

#[tokio::test]
async fn reserve_rejects_foreign_teacher() {
    let (client, slots, _, _) = setup().await;
    slots.insert(&slot("s1", "teacher-1")).await.unwrap();

    let ids = vec!["s1".to_string()];
    let result = try_reserve(&client, &slots, &ids, "teacher-2", "b1").await;
    assert!(matches!(result, Err(ReserveError::TeacherMismatch { .. })));
}

#[tokio::test]
async fn release_is_idempotent_and_scoped_to_booking() {
    let (client, slots, _, _) = setup().await;
    slots.insert(&slot("s1", "teacher-1")).await.unwrap();
    let ids = vec!["s1".to_string()];
    try_reserve(&client, &slots, &ids, "teacher-1", "b1").await.unwrap();

    // Releasing under the wrong booking id touches nothing.
    assert_eq!(slots.release(&ids, "someone-else").await.unwrap(), 0);

    assert_eq!(slots.release(&ids, "b1").await.unwrap(), 1);
    assert_eq!(slots.release(&ids, "b1").await.unwrap(), 0);

    let s1 = slots.find_by_id("s1").await.unwrap().unwrap();
    assert_eq!(s1.status, SlotStatus::Available);

    // The slot can be taken again by a different booking.
    try_reserve(&client, &slots, &ids, "teacher-1", "b2").await.unwrap();
}

#[tokio::test]
async fn booking_round_trip_and_conditional_status() {
    let (client, slots, bookings, _) = setup().await;
    slots.insert(&slot("s1", "teacher-1")).await.unwrap();
    slots.insert(&slot("s2", "teacher-1")).await.unwrap();

    let b = booking("b1", "teacher-1", &["s1", "s2"]);
    let mut tx = client.begin().await.unwrap();
    bookings.insert_tx(&mut tx, &b).await.unwrap();
    slots
        .reserve_tx(&mut tx, &b.slot_ids, "teacher-1", "b1")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let stored = bookings.find_by_id("b1").await.unwrap().unwrap();
    assert_eq!(stored.slot_ids, vec!["s1".to_string(), "s2".to_string()]);
    assert_eq!(stored.total_price, 10000);
    assert_eq!(stored.status, BookingStatus::Pending);

    // pending -> confirmed succeeds once; a repeat matches nothing.
    let now = Utc::now();
    assert!(bookings
        .update_status("b1", &[BookingStatus::Pending], BookingStatus::Confirmed, now)
        .await
        .unwrap());
    assert!(!bookings
        .update_status("b1", &[BookingStatus::Pending], BookingStatus::Confirmed, now)
        .await
        .unwrap());

    let stored = bookings.find_by_id("b1").await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Confirmed);
    assert!(stored.approved_at.is_some());
}

#[tokio::test]
async fn mark_paid_is_idempotent_and_advances_pending() {
    let (client, slots, bookings, _) = setup().await;
    slots.insert(&slot("s1", "teacher-1")).await.unwrap();
    let b = booking("b1", "teacher-1", &["s1"]);
    let mut tx = client.begin().await.unwrap();
    bookings.insert_tx(&mut tx, &b).await.unwrap();
    tx.commit().await.unwrap();

    assert!(bookings.mark_paid("b1", Utc::now()).await.unwrap());
    assert!(!bookings.mark_paid("b1", Utc::now()).await.unwrap());

    let stored = bookings.find_by_id("b1").await.unwrap().unwrap();
    assert_eq!(stored.payment_status, BookingPaymentStatus::Paid);
    assert_eq!(stored.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn payment_transitions_are_guarded() {
    let (_, _, _, payments) = setup().await;
    payments.insert(&payment("p1", "b1")).await.unwrap();

    // Refund is not reachable from pending.
    assert!(!payments.mark_refunded("p1", Utc::now()).await.unwrap());

    assert!(payments.mark_processing("p1").await.unwrap());
    assert!(!payments.mark_processing("p1").await.unwrap());

    assert!(payments.mark_completed("p1", Utc::now()).await.unwrap());
    // A second settlement attempt matches nothing.
    assert!(!payments.mark_completed("p1", Utc::now()).await.unwrap());

    assert!(payments.mark_refunded("p1", Utc::now()).await.unwrap());
    assert!(!payments.mark_refunded("p1", Utc::now()).await.unwrap());

    let stored = payments.find_by_id("p1").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Refunded);
    assert!(stored.paid_at.is_some());
    assert!(stored.refunded_at.is_some());
}

#[tokio::test]
async fn active_payment_blocks_new_attempts_until_terminal() {
    let (_, _, _, payments) = setup().await;
    payments.insert(&payment("p1", "b1")).await.unwrap();

    assert!(payments.find_active_for_booking("b1").await.unwrap().is_some());

    payments.mark_failed("p1", Utc::now(), "declined").await.unwrap();
    assert!(payments.find_active_for_booking("b1").await.unwrap().is_none());

    let stored = payments.find_by_id("p1").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert_eq!(stored.failure_reason.as_deref(), Some("declined"));
}

#[tokio::test]
async fn abandoned_pending_payments_expire() {
    let (_, _, _, payments) = setup().await;
    let mut stale = payment("p1", "b1");
    stale.created_at = Utc::now() - chrono::Duration::hours(2);
    payments.insert(&stale).await.unwrap();

    let mut linked = payment("p2", "b2");
    linked.created_at = Utc::now() - chrono::Duration::hours(2);
    linked.gateway_order_id = Some("ord-1".to_string());
    payments.insert(&linked).await.unwrap();

    let cutoff = Utc::now() - chrono::Duration::minutes(30);
    assert_eq!(payments.expire_abandoned(cutoff).await.unwrap(), 1);

    let p1 = payments.find_by_id("p1").await.unwrap().unwrap();
    assert_eq!(p1.status, PaymentStatus::Cancelled);
    // A payment that already reached the gateway is never swept.
    let p2 = payments.find_by_id("p2").await.unwrap().unwrap();
    assert_eq!(p2.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn gateway_order_link_is_idempotent() {
    let (_, _, _, payments) = setup().await;
    payments.insert(&payment("p1", "b1")).await.unwrap();

    assert!(payments.set_gateway_order("p1", "ord-1").await.unwrap());
    assert!(payments.set_gateway_order("p1", "ord-1").await.unwrap());
    assert!(!payments.set_gateway_order("p1", "ord-2").await.unwrap());

    let stored = payments.find_by_id("p1").await.unwrap().unwrap();
    assert_eq!(stored.gateway_order_id.as_deref(), Some("ord-1"));
}
