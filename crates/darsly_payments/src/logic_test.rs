use crate::error::PaymentError;
use crate::logic::{CancelOutcome, PaymentFlow, ReconciliationOutcome};
use chrono::{Duration, NaiveTime, Utc};
use darsly_booking::logic::{AddSlotRequest, CreateBookingRequest};
use darsly_booking::BookingLifecycle;
use darsly_common::models::{
    BookingPaymentStatus, Customer, PaymentStatus, SlotStatus,
};
use darsly_common::services::{
    BoxFuture, BoxedError, CaptureOutcome, ChatRoomService, CheckoutOrder, CheckoutSession,
    GatewayError, GatewayOrderStatus, InstallmentGateway, OrderAuthorization, OrderSnapshot,
    RateCard, RateProvider, RefundOutcome,
};
use darsly_config::{AppConfig, PaymentConfig, ServerConfig, TamaraConfig};
use darsly_db::{DbClient, SqlSlotRepository};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const VALID_SIGNATURE: &str = "valid-signature";

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
                product_name: None,
            })
        })
    }
}

/// Gateway double scripted by queueing responses per operation. An
/// unscripted call fails loudly as unreachable, which also keeps tests
/// honest about how often the gateway is actually hit.
#[derive(Default)]
struct MockGateway {
    authorize: Mutex<VecDeque<Result<OrderAuthorization, GatewayError>>>,
    captures: Mutex<VecDeque<Result<CaptureOutcome, GatewayError>>>,
    orders: Mutex<VecDeque<Result<OrderSnapshot, GatewayError>>>,
    cancels: Mutex<VecDeque<Result<OrderSnapshot, GatewayError>>>,
    refunds: Mutex<VecDeque<Result<RefundOutcome, GatewayError>>>,
    authorize_calls: AtomicUsize,
    capture_calls: AtomicUsize,
    refund_calls: AtomicUsize,
}

impl MockGateway {
    fn script_authorize(&self, result: Result<OrderAuthorization, GatewayError>) {
        self.authorize.lock().unwrap().push_back(result);
    }

    fn script_capture(&self, result: Result<CaptureOutcome, GatewayError>) {
        self.captures.lock().unwrap().push_back(result);
    }

    fn script_get_order(&self, result: Result<OrderSnapshot, GatewayError>) {
        self.orders.lock().unwrap().push_back(result);
    }

    fn script_cancel(&self, result: Result<OrderSnapshot, GatewayError>) {
        self.cancels.lock().unwrap().push_back(result);
    }

    fn script_refund(&self, result: Result<RefundOutcome, GatewayError>) {
        self.refunds.lock().unwrap().push_back(result);
    }

    fn unscripted() -> GatewayError {
        GatewayError::Unreachable("unscripted gateway call".to_string())
    }
}

impl InstallmentGateway for MockGateway {
    fn create_checkout(
        &self,
        order: &CheckoutOrder,
    ) -> BoxFuture<'_, CheckoutSession, GatewayError> {
        let reference = order.reference.clone();
        Box::pin(async move {
            Ok(CheckoutSession {
                gateway_order_id: format!("ord-{}", reference),
                checkout_url: format!("https://checkout.example/{}", reference),
            })
        })
    }

    fn get_order(&self, _gateway_order_id: &str) -> BoxFuture<'_, OrderSnapshot, GatewayError> {
        let next = self.orders.lock().unwrap().pop_front();
        Box::pin(async move { next.unwrap_or_else(|| Err(Self::unscripted())) })
    }

    fn authorize_order(
        &self,
        _gateway_order_id: &str,
    ) -> BoxFuture<'_, OrderAuthorization, GatewayError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.authorize.lock().unwrap().pop_front();
        Box::pin(async move { next.unwrap_or_else(|| Err(Self::unscripted())) })
    }

    fn capture_order(
        &self,
        _gateway_order_id: &str,
        _amount: i64,
        _currency: &str,
    ) -> BoxFuture<'_, CaptureOutcome, GatewayError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.captures.lock().unwrap().pop_front();
        Box::pin(async move { next.unwrap_or_else(|| Err(Self::unscripted())) })
    }

    fn cancel_order(
        &self,
        _gateway_order_id: &str,
        _amount: i64,
        _currency: &str,
    ) -> BoxFuture<'_, OrderSnapshot, GatewayError> {
        let next = self.cancels.lock().unwrap().pop_front();
        Box::pin(async move { next.unwrap_or_else(|| Err(Self::unscripted())) })
    }

    fn refund_order(
        &self,
        _gateway_order_id: &str,
        _amount: i64,
        _currency: &str,
        _comment: Option<&str>,
    ) -> BoxFuture<'_, RefundOutcome, GatewayError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.refunds.lock().unwrap().pop_front();
        Box::pin(async move { next.unwrap_or_else(|| Err(Self::unscripted())) })
    }

    fn verify_webhook_signature(&self, _payload: &[u8], signature: Option<&str>) -> bool {
        signature == Some(VALID_SIGNATURE)
    }
}

#[derive(Default)]
struct CountingChat {
    rooms_created: AtomicUsize,
}

impl ChatRoomService for CountingChat {
    fn create_room(
        &self,
        _booking_id: &str,
        _teacher_id: &str,
        _student_id: &str,
    ) -> BoxFuture<'_, (), BoxedError> {
        self.rooms_created.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

struct TestEnv {
    flow: Arc<PaymentFlow>,
    bookings: Arc<BookingLifecycle>,
    gateway: Arc<MockGateway>,
    chat: Arc<CountingChat>,
    slots: SqlSlotRepository,
}

fn test_config(cancellation_window_hours: i64) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: None,
        booking: None,
        tamara: Some(TamaraConfig {
            api_url: "https://api-sandbox.tamara.co".to_string(),
            success_url: "https://darsly.app/pay/success".to_string(),
            failure_url: "https://darsly.app/pay/failure".to_string(),
            cancel_url: "https://darsly.app/pay/cancel".to_string(),
            webhook_url: "https://darsly.app/api/payments/webhook".to_string(),
            currency: Some("AED".to_string()),
            default_country_code: Some("+971".to_string()),
            auto_capture: false,
        }),
        payment: Some(PaymentConfig {
            cancellation_window_hours,
            abandoned_ttl_minutes: 30,
        }),
    })
}

async fn setup_with_window(cancellation_window_hours: i64) -> TestEnv {
    let db = DbClient::from_url("sqlite::memory:").await.expect("db");
    let bookings = Arc::new(BookingLifecycle::new(db.clone(), Arc::new(FixedRate)));
    bookings.init_schema().await.expect("booking schema");

    let gateway = Arc::new(MockGateway::default());
    let chat = Arc::new(CountingChat::default());
    let flow = Arc::new(PaymentFlow::new(
        db.clone(),
        test_config(cancellation_window_hours),
        gateway.clone(),
        bookings.clone(),
        Some(chat.clone()),
        None,
        None,
    ));
    flow.init_schema().await.expect("payment schema");

    TestEnv {
        flow,
        bookings,
        gateway,
        chat,
        slots: SqlSlotRepository::new(db),
    }
}

async fn setup() -> TestEnv {
    setup_with_window(24).await
}

fn customer() -> Customer {
    Customer {
        name: "Sara Khan".to_string(),
        email: "sara@example.com".to_string(),
        phone_numbers: vec!["050 123 4567".to_string()],
    }
}

/// Create a booking with two slots and return (booking_id, slot_ids).
async fn make_booking(env: &TestEnv) -> (String, Vec<String>) {
    let date = (Utc::now() + Duration::days(30)).date_naive();
    let mut slot_ids = Vec::new();
    for hour in [10, 12] {
        let slot = env
            .bookings
            .add_slot(AddSlotRequest {
                teacher_id: "teacher-1".to_string(),
                date,
                start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
                subject_id: None,
            })
            .await
            .unwrap()
            .id;
        slot_ids.push(slot);
    }

    let booking = env
        .bookings
        .create(CreateBookingRequest {
            student_id: "student-1".to_string(),
            teacher_id: "teacher-1".to_string(),
            slot_ids: slot_ids.clone(),
            subject_id: None,
            subject_label: Some("Mathematics".to_string()),
        })
        .await
        .unwrap();

    (booking.id, slot_ids)
}

/// Prepare a payment and create its checkout; returns the payment id.
async fn make_checkout(env: &TestEnv, booking_id: &str) -> String {
    let payment = env
        .flow
        .prepare_payment(booking_id, "student-1")
        .await
        .unwrap();
    let checkout = env
        .flow
        .create_checkout(&payment.id, &customer())
        .await
        .unwrap();
    assert!(checkout.checkout_url.starts_with("https://checkout.example/"));
    payment.id
}

fn authorised(auto: bool) -> OrderAuthorization {
    OrderAuthorization {
        status: GatewayOrderStatus::Authorised,
        auto_captured: auto,
    }
}

#[tokio::test]
async fn checkout_round_trip_settles_booking() {
    let env = setup().await;
    let (booking_id, _) = make_booking(&env).await;

    let payment = env
        .flow
        .prepare_payment(&booking_id, "student-1")
        .await
        .unwrap();
    // 2 slots at 50.00 AED => the payment collects 100.00 AED
    assert_eq!(payment.amount, 10000);
    assert_eq!(payment.currency, "AED");

    let checkout = env
        .flow
        .create_checkout(&payment.id, &customer())
        .await
        .unwrap();
    assert_eq!(checkout.gateway_order_id, format!("ord-{}", payment.reference));

    env.gateway.script_authorize(Ok(OrderAuthorization {
        status: GatewayOrderStatus::FullyCaptured,
        auto_captured: false,
    }));
    let outcome = env.flow.reconcile(&payment.id).await.unwrap();
    assert_eq!(outcome, ReconciliationOutcome::Completed);

    let settled = env.flow.get(&payment.id).await.unwrap();
    assert_eq!(settled.status, PaymentStatus::Completed);
    assert!(settled.paid_at.is_some());

    let booking = env.bookings.get(&booking_id).await.unwrap();
    assert_eq!(booking.payment_status, BookingPaymentStatus::Paid);
    assert_eq!(
        booking.status,
        darsly_common::models::BookingStatus::Confirmed
    );
    assert_eq!(env.chat.rooms_created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconcile_is_idempotent_and_fires_side_effects_once() {
    let env = setup().await;
    let (booking_id, _) = make_booking(&env).await;
    let payment_id = make_checkout(&env, &booking_id).await;

    env.gateway.script_authorize(Ok(OrderAuthorization {
        status: GatewayOrderStatus::FullyCaptured,
        auto_captured: false,
    }));

    let first = env.flow.reconcile(&payment_id).await.unwrap();
    let second = env.flow.reconcile(&payment_id).await.unwrap();
    assert_eq!(first, ReconciliationOutcome::Completed);
    assert_eq!(second, ReconciliationOutcome::Completed);

    // The second call answered from local state: one gateway round trip,
    // one chat room.
    assert_eq!(env.gateway.authorize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(env.chat.rooms_created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn webhook_verifies_signature_before_processing() {
    let env = setup().await;
    let (booking_id, _) = make_booking(&env).await;
    let payment_id = make_checkout(&env, &booking_id).await;
    let payment = env.flow.get(&payment_id).await.unwrap();

    let body = serde_json::json!({
        "order_reference_id": payment.reference,
        "order_id": payment.gateway_order_id,
        "event_type": "order_approved",
    })
    .to_string();

    let err = env
        .flow
        .handle_webhook(body.as_bytes(), Some("forged"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::WebhookSignature));
    assert_eq!(env.gateway.authorize_calls.load(Ordering::SeqCst), 0);

    env.gateway
        .script_authorize(Ok(authorised(true)));
    let outcome = env
        .flow
        .handle_webhook(body.as_bytes(), Some(VALID_SIGNATURE))
        .await
        .unwrap();
    assert_eq!(outcome, ReconciliationOutcome::Completed);
}

#[tokio::test]
async fn authorised_without_auto_capture_waits_for_manual_capture() {
    let env = setup().await;
    let (booking_id, _) = make_booking(&env).await;
    let payment_id = make_checkout(&env, &booking_id).await;

    env.gateway.script_authorize(Ok(authorised(false)));
    let outcome = env.flow.reconcile(&payment_id).await.unwrap();
    assert_eq!(outcome, ReconciliationOutcome::AwaitingCapture);

    let payment = env.flow.get(&payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Processing);

    // The booking is not paid until capture actually happens.
    let booking = env.bookings.get(&booking_id).await.unwrap();
    assert_eq!(booking.payment_status, BookingPaymentStatus::Pending);

    env.gateway.script_capture(Ok(CaptureOutcome {
        status: GatewayOrderStatus::FullyCaptured,
    }));
    let outcome = env.flow.capture(&payment_id).await.unwrap();
    assert_eq!(outcome, ReconciliationOutcome::Completed);

    // A second capture is rejected before any gateway call.
    let err = env.flow.capture(&payment_id).await.unwrap_err();
    assert!(matches!(err, PaymentError::AlreadyCompleted));
    assert_eq!(env.gateway.capture_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn declined_payment_fails_without_releasing_slots() {
    let env = setup().await;
    let (booking_id, slot_ids) = make_booking(&env).await;
    let payment_id = make_checkout(&env, &booking_id).await;

    env.gateway.script_authorize(Ok(OrderAuthorization {
        status: GatewayOrderStatus::Declined,
        auto_captured: false,
    }));
    let outcome = env.flow.reconcile(&payment_id).await.unwrap();
    assert!(matches!(outcome, ReconciliationOutcome::Failed { .. }));

    let payment = env.flow.get(&payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(payment.failed_at.is_some());

    let booking = env.bookings.get(&booking_id).await.unwrap();
    assert_eq!(booking.payment_status, BookingPaymentStatus::Failed);

    // The slots stay reserved until an explicit cancel.
    for id in &slot_ids {
        let slot = env.slots.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(slot.status, SlotStatus::Booked);
    }
}

#[tokio::test]
async fn gateway_trouble_leaves_payment_retriable() {
    let env = setup().await;
    let (booking_id, _) = make_booking(&env).await;
    let payment_id = make_checkout(&env, &booking_id).await;

    env.gateway
        .script_authorize(Err(GatewayError::Unreachable("timeout".to_string())));
    let outcome = env.flow.reconcile(&payment_id).await.unwrap();
    assert_eq!(outcome, ReconciliationOutcome::Pending);

    let payment = env.flow.get(&payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    // A later retry can still settle.
    env.gateway.script_authorize(Ok(authorised(true)));
    let outcome = env.flow.reconcile(&payment_id).await.unwrap();
    assert_eq!(outcome, ReconciliationOutcome::Completed);
}

#[tokio::test]
async fn prepare_blocks_while_an_attempt_is_active() {
    let env = setup().await;
    let (booking_id, _) = make_booking(&env).await;

    let first = env
        .flow
        .prepare_payment(&booking_id, "student-1")
        .await
        .unwrap();

    let err = env
        .flow
        .prepare_payment(&booking_id, "student-1")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::PaymentInProgress));

    // Once the attempt dies, a new one may start.
    env.flow
        .create_checkout(&first.id, &customer())
        .await
        .unwrap();
    env.gateway.script_authorize(Ok(OrderAuthorization {
        status: GatewayOrderStatus::Declined,
        auto_captured: false,
    }));
    env.flow.reconcile(&first.id).await.unwrap();

    env.flow
        .prepare_payment(&booking_id, "student-1")
        .await
        .expect("retry allowed after failure");
}

#[tokio::test]
async fn checkout_requires_a_gateway_valid_phone() {
    let env = setup().await;
    let (booking_id, _) = make_booking(&env).await;
    let payment = env
        .flow
        .prepare_payment(&booking_id, "student-1")
        .await
        .unwrap();

    let mut no_phone = customer();
    no_phone.phone_numbers = vec!["n/a".to_string()];

    let err = env
        .flow
        .create_checkout(&payment.id, &no_phone)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidPhoneNumber));
}

#[tokio::test]
async fn cancel_of_captured_order_requires_refund() {
    let env = setup().await;
    let (booking_id, _) = make_booking(&env).await;
    let payment_id = make_checkout(&env, &booking_id).await;

    env.gateway.script_authorize(Ok(authorised(false)));
    env.flow.reconcile(&payment_id).await.unwrap();

    env.gateway.script_get_order(Ok(OrderSnapshot {
        status: GatewayOrderStatus::FullyCaptured,
    }));
    let err = env
        .flow
        .cancel(&payment_id, "student-1")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::MustRefundInstead));

    // Local state untouched.
    let payment = env.flow.get(&payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Processing);
}

#[tokio::test]
async fn cancel_conflict_translates_to_advice_without_local_change() {
    let env = setup().await;
    let (booking_id, _) = make_booking(&env).await;
    let payment_id = make_checkout(&env, &booking_id).await;

    env.gateway.script_authorize(Ok(authorised(false)));
    env.flow.reconcile(&payment_id).await.unwrap();

    env.gateway.script_get_order(Ok(OrderSnapshot {
        status: GatewayOrderStatus::Authorised,
    }));
    env.gateway.script_cancel(Err(GatewayError::Conflict {
        prior_state: GatewayOrderStatus::Authorised,
    }));

    let outcome = env.flow.cancel(&payment_id, "student-1").await.unwrap();
    match outcome {
        CancelOutcome::Conflict { advice } => {
            assert!(advice.contains("awaiting capture"), "advice was: {}", advice)
        }
        other => panic!("expected conflict, got {:?}", other),
    }

    let payment = env.flow.get(&payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Processing);
}

#[tokio::test]
async fn local_cancel_releases_slots_before_any_checkout() {
    let env = setup().await;
    let (booking_id, slot_ids) = make_booking(&env).await;
    let payment = env
        .flow
        .prepare_payment(&booking_id, "student-1")
        .await
        .unwrap();

    let outcome = env.flow.cancel(&payment.id, "student-1").await.unwrap();
    assert_eq!(outcome, CancelOutcome::Cancelled);

    let cancelled = env.flow.get(&payment.id).await.unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);

    for id in &slot_ids {
        let slot = env.slots.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(slot.status, SlotStatus::Available);
    }

    let err = env.flow.cancel(&payment.id, "student-1").await.unwrap_err();
    assert!(matches!(err, PaymentError::AlreadyCancelled));
}

#[tokio::test]
async fn student_cancel_of_settled_payment_honors_grace_window() {
    // Window of zero hours: the settled payment is immediately out of
    // window for the student.
    let env = setup_with_window(0).await;
    let (booking_id, _) = make_booking(&env).await;
    let payment_id = make_checkout(&env, &booking_id).await;

    env.gateway.script_authorize(Ok(authorised(true)));
    env.flow.reconcile(&payment_id).await.unwrap();

    let err = env
        .flow
        .cancel(&payment_id, "student-1")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::CancellationWindowExpired));
}

#[tokio::test]
async fn student_cancel_within_window_cancels_uncaptured_order() {
    let env = setup().await;
    let (booking_id, _) = make_booking(&env).await;
    let payment_id = make_checkout(&env, &booking_id).await;

    // Settled locally through auto-capture, but the provider still shows
    // the order as only authorised.
    env.gateway.script_authorize(Ok(authorised(true)));
    env.flow.reconcile(&payment_id).await.unwrap();

    env.gateway.script_get_order(Ok(OrderSnapshot {
        status: GatewayOrderStatus::Authorised,
    }));
    env.gateway.script_cancel(Ok(OrderSnapshot {
        status: GatewayOrderStatus::Canceled,
    }));

    let outcome = env.flow.cancel(&payment_id, "student-1").await.unwrap();
    assert_eq!(outcome, CancelOutcome::Cancelled);

    let payment = env.flow.get(&payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Cancelled);
}

#[tokio::test]
async fn refund_requires_settlement_and_happens_once() {
    let env = setup().await;
    let (booking_id, slot_ids) = make_booking(&env).await;
    let payment_id = make_checkout(&env, &booking_id).await;

    // Not completed yet: rejected without calling the gateway.
    let err = env.flow.refund(&payment_id, None, None).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotCompleted));
    assert_eq!(env.gateway.refund_calls.load(Ordering::SeqCst), 0);

    env.gateway.script_authorize(Ok(authorised(true)));
    env.flow.reconcile(&payment_id).await.unwrap();

    let err = env
        .flow
        .refund(&payment_id, Some(999999), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidRefundAmount));

    env.gateway.script_refund(Ok(RefundOutcome {
        status: GatewayOrderStatus::Refunded,
    }));
    let refunded = env
        .flow
        .refund(&payment_id, None, Some("teacher no-show"))
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert!(refunded.refunded_at.is_some());

    let err = env.flow.refund(&payment_id, None, None).await.unwrap_err();
    assert!(matches!(err, PaymentError::AlreadyRefunded));
    assert_eq!(env.gateway.refund_calls.load(Ordering::SeqCst), 1);

    // A refunded session stays delivered: slots remain booked.
    for id in &slot_ids {
        let slot = env.slots.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(slot.status, SlotStatus::Booked);
    }
}
