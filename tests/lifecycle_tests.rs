// End-to-end tests of the reservation and payment lifecycle
//
// Every test drives the public `BookingEngine` API over the in-memory
// backend with a manual clock. Processor events are built, signed and fed
// through webhook ingestion exactly as a processor delivery would be.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rental_booking_engine::core::{
    sign_payload, BalanceLedger, BookingEngine, ChargeIntent, Clock, Collaborators,
    InMemoryBackend, IntentStatus, ManualClock, MemoryLedger, MemoryStore, PaymentRepository,
    PaymentProcessor, ProcessorEvent, SimulatedProcessor, TransitionOutcome, WebhookAck,
};
use rental_booking_engine::types::{
    BookingError, BookingReceipt, BookingRequest, CommissionPolicy, EngineConfig, Listing,
    OwnerBalance, Payment, PaymentId, PaymentStatus, RentPeriod, Renter, ReservationId,
    ReservationStatus,
};
use rstest::rstest;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use uuid::Uuid;

const SECRET: &str = "whsec_test";
const OWNER: &str = "owner-1";
const RENTER: &str = "renter-1";

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn money(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap()
}

fn config() -> EngineConfig {
    EngineConfig {
        webhook_secret: SECRET.to_string(),
        ..EngineConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Failure-injecting collaborators
// ---------------------------------------------------------------------------

/// Ledger that can be told to fail every credit
#[derive(Default)]
struct FailingLedger {
    inner: MemoryLedger,
    fail: AtomicBool,
}

impl BalanceLedger for FailingLedger {
    fn credit_balance(&self, owner: &str, amount: Decimal) -> Result<Decimal, BookingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BookingError::storage("credit_balance", "ledger unavailable"));
        }
        self.inner.credit_balance(owner, amount)
    }

    fn balance(&self, owner: &str) -> Result<Decimal, BookingError> {
        self.inner.balance(owner)
    }

    fn balances(&self) -> Result<Vec<OwnerBalance>, BookingError> {
        self.inner.balances()
    }
}

/// Payment storage that fails `create_payment` once its budget is spent
struct FlakyPayments {
    inner: Arc<MemoryStore>,
    budget: AtomicUsize,
}

impl FlakyPayments {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            budget: AtomicUsize::new(usize::MAX),
        }
    }
}

impl PaymentRepository for FlakyPayments {
    fn create_payment(&self, payment: Payment) -> Result<(), BookingError> {
        let left = self.budget.load(Ordering::SeqCst);
        if left == 0 {
            return Err(BookingError::storage("create_payment", "disk full"));
        }
        if left != usize::MAX {
            self.budget.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.create_payment(payment)
    }

    fn get_payment(&self, id: PaymentId) -> Result<Payment, BookingError> {
        self.inner.get_payment(id)
    }

    fn save_payment(&self, payment: Payment) -> Result<(), BookingError> {
        self.inner.save_payment(payment)
    }

    fn update_payment(
        &self,
        id: PaymentId,
        f: rental_booking_engine::core::traits::PaymentUpdate<'_>,
    ) -> Result<Payment, BookingError> {
        self.inner.update_payment(id, f)
    }

    fn find_by_intent_ref(&self, intent_ref: &str) -> Result<Option<Payment>, BookingError> {
        self.inner.find_by_intent_ref(intent_ref)
    }

    fn find_by_charge_ref(&self, charge_ref: &str) -> Result<Option<Payment>, BookingError> {
        self.inner.find_by_charge_ref(charge_ref)
    }

    fn first_payment(&self, reservation: ReservationId) -> Result<Payment, BookingError> {
        self.inner.first_payment(reservation)
    }

    fn payments_for_reservation(
        &self,
        reservation: ReservationId,
    ) -> Result<Vec<Payment>, BookingError> {
        self.inner.payments_for_reservation(reservation)
    }

    fn delete_payments(
        &self,
        reservation: ReservationId,
        exclude_first: bool,
    ) -> Result<usize, BookingError> {
        self.inner.delete_payments(reservation, exclude_first)
    }
}

/// User action on a reservation
#[derive(Debug, Clone, Copy)]
enum Action {
    Cancel,
    Accept,
    Reject,
}

impl Action {
    fn run(self, engine: &BookingEngine, id: ReservationId) -> Result<(), BookingError> {
        match self {
            Action::Cancel => engine.cancel_reservation(id, RENTER).map(|_| ()),
            Action::Accept => engine.accept_reservation(id, OWNER).map(|_| ()),
            Action::Reject => engine.reject_reservation(id, OWNER).map(|_| ()),
        }
    }
}

/// Processor that runs a second user action while a refund is in flight
struct InterleavingProcessor {
    inner: Arc<SimulatedProcessor>,
    engine: OnceLock<BookingEngine>,
    during_refund: Mutex<Option<(Action, ReservationId)>>,
    interleaved: Mutex<Vec<Result<(), BookingError>>>,
}

impl InterleavingProcessor {
    fn new(inner: Arc<SimulatedProcessor>) -> Self {
        Self {
            inner,
            engine: OnceLock::new(),
            during_refund: Mutex::new(None),
            interleaved: Mutex::new(Vec::new()),
        }
    }

    fn on_next_refund(&self, action: Action, id: ReservationId) {
        *self.during_refund.lock().unwrap() = Some((action, id));
    }

    fn interleaved(&self) -> Vec<Result<(), BookingError>> {
        self.interleaved.lock().unwrap().clone()
    }
}

impl PaymentProcessor for InterleavingProcessor {
    fn create_charge_intent(
        &self,
        customer_ref: &str,
        amount: Decimal,
        currency: &str,
        description: &str,
    ) -> Result<ChargeIntent, BookingError> {
        self.inner
            .create_charge_intent(customer_ref, amount, currency, description)
    }

    fn confirmation_status(&self, intent_ref: &str) -> Result<IntentStatus, BookingError> {
        self.inner.confirmation_status(intent_ref)
    }

    fn refund_charge(&self, charge_ref: &str) -> Result<String, BookingError> {
        let pending = self.during_refund.lock().unwrap().take();
        if let (Some((action, id)), Some(engine)) = (pending, self.engine.get()) {
            let result = action.run(engine, id);
            self.interleaved.lock().unwrap().push(result);
        }
        self.inner.refund_charge(charge_ref)
    }

    fn receipt_url(&self, charge_ref: &str) -> Result<String, BookingError> {
        self.inner.receipt_url(charge_ref)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    backend: InMemoryBackend,
    clock: Arc<ManualClock>,
    engine: BookingEngine,
}

impl Harness {
    fn new() -> Self {
        Self::with(|_, collab| collab)
    }

    fn with(wrap: impl FnOnce(&InMemoryBackend, Collaborators) -> Collaborators) -> Self {
        let backend = InMemoryBackend::new();
        let clock = Arc::new(ManualClock::new(start_time()));
        let collab = wrap(&backend, backend.collaborators(clock.clone()));
        let engine = BookingEngine::new(collab, Arc::new(config())).unwrap();
        Self {
            backend,
            clock,
            engine,
        }
    }

    fn listing(&self, id: &str, period: RentPeriod, price: &str, min_day: i64, commission: CommissionPolicy) {
        self.backend.store.insert_listing(Listing {
            id: id.to_string(),
            owner: OWNER.to_string(),
            title: format!("Listing {}", id),
            rent_period: period,
            unit_price: money(price),
            min_day,
            commission,
        });
    }

    fn book_as(
        &self,
        renter: &str,
        listing: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BookingReceipt, BookingError> {
        self.engine.create_reservation(&BookingRequest {
            listing_id: listing.to_string(),
            requester: renter.to_string(),
            start_date: start,
            end_date: end,
            renter: Renter {
                full_name: "Ayse Yilmaz".to_string(),
                email: "ayse@example.test".to_string(),
                phone: "+905551112233".to_string(),
                identity_number: "12345678901".to_string(),
            },
        })
    }

    fn book(&self, listing: &str, start: NaiveDate, end: NaiveDate) -> Result<BookingReceipt, BookingError> {
        self.book_as(RENTER, listing, start, end)
    }

    /// Start checkout and return the intent reference
    fn checkout(&self, payment: PaymentId) -> String {
        self.engine.begin_payment(payment, RENTER).unwrap().intent_ref
    }

    fn deliver(&self, event: &ProcessorEvent) -> Result<WebhookAck, BookingError> {
        let payload = event.to_payload().unwrap();
        let header = sign_payload(SECRET, self.clock.now().timestamp(), &payload).unwrap();
        self.engine.handle_processor_webhook(&payload, &header)
    }

    fn intent_event(&self, event_type: &str, intent: &str) -> ProcessorEvent {
        ProcessorEvent::intent(format!("evt_{}", Uuid::new_v4().simple()), event_type, intent)
    }

    /// Settle the intent at the processor and build its charge event
    fn charge_event(&self, event_type: &str, intent: &str) -> ProcessorEvent {
        let charge = self.backend.processor.settle_intent(intent).unwrap();
        ProcessorEvent::charge(
            format!("evt_{}", Uuid::new_v4().simple()),
            event_type,
            &charge,
            intent,
        )
    }

    /// Pay a payment through intent and charge confirmations
    fn pay(&self, payment: PaymentId) -> String {
        let intent = self.checkout(payment);
        self.backend.processor.settle_intent(&intent).unwrap();
        self.deliver(&self.intent_event("payment_intent.succeeded", &intent))
            .unwrap();
        self.deliver(&self.charge_event("charge.succeeded", &intent))
            .unwrap();
        intent
    }

    /// Book and fully pay the first payment
    fn paid(&self, listing: &str, start: NaiveDate, end: NaiveDate) -> BookingReceipt {
        let receipt = self.book(listing, start, end).unwrap();
        self.pay(receipt.payment_id);
        receipt
    }

    fn status(&self, id: ReservationId) -> ReservationStatus {
        self.engine.reservation(id).unwrap().status
    }

    fn payments(&self, id: ReservationId) -> Vec<Payment> {
        self.engine.payments_for_reservation(id).unwrap()
    }

    fn balance(&self) -> Decimal {
        self.engine.balance(OWNER).unwrap()
    }

    /// Harness whose processor can interleave a user action with a refund
    fn interleaving() -> (Self, Arc<InterleavingProcessor>) {
        let mut wrapper = None;
        let h = Self::with(|backend, mut collab| {
            let processor = Arc::new(InterleavingProcessor::new(backend.processor.clone()));
            collab.processor = processor.clone();
            wrapper = Some(processor);
            collab
        });
        let processor = wrapper.unwrap();
        assert!(processor.engine.set(h.engine.clone()).is_ok());
        (h, processor)
    }
}

// ---------------------------------------------------------------------------
// Pricing scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_daily_booking_price_and_day_limits() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 2, CommissionPolicy::None);

    let receipt = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    assert_eq!(receipt.price, money("300"));
    assert_eq!(receipt.status, ReservationStatus::Pending);

    let too_short = h.book("flat", ymd(2024, 3, 10), ymd(2024, 3, 10)).unwrap_err();
    assert!(matches!(too_short, BookingError::Validation { .. }));
    assert!(too_short.to_string().contains("at least 2 days"));

    let too_long = h.book("flat", ymd(2024, 4, 1), ymd(2024, 4, 15)).unwrap_err();
    assert!(too_long.to_string().contains("at most 14 days"));
}

#[test]
fn test_monthly_booking_normalizes_window() {
    let h = Harness::new();
    h.listing("house", RentPeriod::Monthly, "1000", 0, CommissionPolicy::None);

    let receipt = h.book("house", ymd(2024, 3, 15), ymd(2024, 5, 10)).unwrap();
    assert_eq!(receipt.start_date, ymd(2024, 3, 1));
    assert_eq!(receipt.end_date, ymd(2024, 5, 31));
    assert_eq!(receipt.price, money("3000"));

    let payments = h.payments(receipt.reservation_id);
    assert_eq!(payments.len(), 1);
    assert!(payments[0].is_first_payment);
    assert_eq!(payments[0].amount_gross, money("1000"));
    assert_eq!(payments[0].start_date, ymd(2024, 3, 1));
    assert_eq!(payments[0].end_date, ymd(2024, 3, 31));
}

#[test]
fn test_renter_pays_first_charge_is_grossed_up() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::RenterPays);

    let receipt = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 1)).unwrap();
    assert_eq!(receipt.price, money("100"));
    assert_eq!(receipt.first_charge, money("109.46"));

    let session = h.engine.begin_payment(receipt.payment_id, RENTER).unwrap();
    assert!(session.commission);
    assert_eq!(session.amount, money("109.46"));
    assert_eq!(session.amount_gross, money("100"));
}

#[test]
fn test_bad_identity_number_is_rejected() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let err = h
        .engine
        .create_reservation(&BookingRequest {
            listing_id: "flat".to_string(),
            requester: RENTER.to_string(),
            start_date: ymd(2024, 3, 1),
            end_date: ymd(2024, 3, 2),
            renter: Renter {
                identity_number: "1234".to_string(),
                ..Renter::default()
            },
        })
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation { .. }));
    assert!(h.engine.reserved_dates("flat").unwrap().is_empty());
}

#[test]
fn test_unknown_listing_is_not_found() {
    let h = Harness::new();
    assert!(matches!(
        h.book("missing", ymd(2024, 3, 1), ymd(2024, 3, 2)),
        Err(BookingError::NotFound { .. })
    ));
}

// ---------------------------------------------------------------------------
// Availability
// ---------------------------------------------------------------------------

#[test]
fn test_overlapping_booking_conflicts() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    let err = h.book("flat", ymd(2024, 3, 3), ymd(2024, 3, 5)).unwrap_err();
    assert!(matches!(err, BookingError::Conflict { .. }));
    assert!(err.to_string().contains("not available"));

    h.book("flat", ymd(2024, 3, 4), ymd(2024, 3, 5)).unwrap();
}

#[test]
fn test_concurrent_bookings_only_one_wins() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let handles: Vec<_> = (0..8u32)
        .map(|i| {
            let engine = h.engine.clone();
            std::thread::spawn(move || {
                engine.create_reservation(&BookingRequest {
                    listing_id: "flat".to_string(),
                    requester: format!("renter-{}", i),
                    start_date: ymd(2024, 3, 1 + i),
                    end_date: ymd(2024, 3, 9 + i),
                    renter: Renter {
                        identity_number: "12345678901".to_string(),
                        ..Renter::default()
                    },
                })
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, BookingError::Conflict { .. })));
}

#[test]
fn test_expired_pending_frees_the_dates() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let first = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    assert_eq!(h.engine.reserved_dates("flat").unwrap().len(), 3);

    h.clock.advance(Duration::hours(25));
    assert!(h.engine.reserved_dates("flat").unwrap().is_empty());
    let lapsed = h.engine.reservation(first.reservation_id).unwrap();
    assert_eq!(lapsed.status_label(h.clock.now()), "Expired");

    h.book_as("renter-2", "flat", ymd(2024, 3, 2), ymd(2024, 3, 4))
        .unwrap();
}

#[test]
fn test_late_payment_on_rebooked_dates_is_refunded() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let first = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    let intent = h.checkout(first.payment_id);

    h.clock.advance(Duration::hours(25));
    h.book_as("renter-2", "flat", ymd(2024, 3, 1), ymd(2024, 3, 3))
        .unwrap();

    h.backend.processor.settle_intent(&intent).unwrap();
    let ack = h
        .deliver(&h.intent_event("payment_intent.succeeded", &intent))
        .unwrap();
    assert_eq!(ack.outcome, TransitionOutcome::Applied);
    assert_eq!(h.status(first.reservation_id), ReservationStatus::Cancelled);

    // The money is returned once the charge is known
    h.deliver(&h.charge_event("charge.succeeded", &intent))
        .unwrap();
    let payment = &h.payments(first.reservation_id)[0];
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert!(payment.refund_ref.as_deref().unwrap().starts_with("re_"));
    assert_eq!(h.status(first.reservation_id), ReservationStatus::Cancelled);
}

#[test]
fn test_late_payment_promotes_when_dates_still_free() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let first = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    let intent = h.checkout(first.payment_id);

    h.clock.advance(Duration::hours(25));
    h.backend.processor.settle_intent(&intent).unwrap();
    h.deliver(&h.intent_event("payment_intent.succeeded", &intent))
        .unwrap();
    assert_eq!(h.status(first.reservation_id), ReservationStatus::Paid);
}

// ---------------------------------------------------------------------------
// Webhook ingestion
// ---------------------------------------------------------------------------

#[test]
fn test_intent_succeeded_marks_reservation_paid_once() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    let intent = h.checkout(receipt.payment_id);
    h.backend.processor.settle_intent(&intent).unwrap();

    let event = h.intent_event("payment_intent.succeeded", &intent);
    let ack = h.deliver(&event).unwrap();
    assert_eq!(ack.outcome, TransitionOutcome::Applied);
    assert_eq!(ack.event_id, event.id);
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Paid);
    assert_eq!(h.payments(receipt.reservation_id)[0].status, PaymentStatus::Succeeded);

    let replay = h.deliver(&event).unwrap();
    assert_eq!(replay.outcome, TransitionOutcome::Replayed);
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Paid);
    assert_eq!(h.payments(receipt.reservation_id)[0].status, PaymentStatus::Succeeded);
    assert_eq!(h.balance(), Decimal::ZERO);
}

#[test]
fn test_charge_succeeded_records_charge() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    let payment = &h.payments(receipt.reservation_id)[0];
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(payment.charge_ref.as_deref().unwrap().starts_with("ch_"));
    // The first payment settles on accept, not on completion
    assert_eq!(h.balance(), Decimal::ZERO);
}

#[test]
fn test_charge_before_intent_still_promotes() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    let intent = h.checkout(receipt.payment_id);

    let ack = h.deliver(&h.charge_event("charge.succeeded", &intent)).unwrap();
    assert_eq!(ack.outcome, TransitionOutcome::Applied);
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Paid);
    assert_eq!(h.payments(receipt.reservation_id)[0].status, PaymentStatus::Completed);

    let late = h
        .deliver(&h.intent_event("payment_intent.succeeded", &intent))
        .unwrap();
    assert_eq!(late.outcome, TransitionOutcome::Ignored);
    assert_eq!(h.payments(receipt.reservation_id)[0].status, PaymentStatus::Completed);
}

#[rstest]
#[case::intent_failed("payment_intent.payment_failed", PaymentStatus::Failed)]
#[case::intent_canceled("payment_intent.canceled", PaymentStatus::Cancelled)]
fn test_intent_failures(#[case] event_type: &str, #[case] expected: PaymentStatus) {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    let intent = h.checkout(receipt.payment_id);

    let ack = h.deliver(&h.intent_event(event_type, &intent)).unwrap();
    assert_eq!(ack.outcome, TransitionOutcome::Applied);
    assert_eq!(h.payments(receipt.reservation_id)[0].status, expected);
    // Failure never cancels the reservation
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Pending);
}

#[test]
fn test_stale_charge_failure_is_ignored() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    let payment = &h.payments(receipt.reservation_id)[0];
    let event = ProcessorEvent::charge(
        "evt_late",
        "charge.failed",
        payment.charge_ref.as_deref().unwrap(),
        payment.intent_ref.as_deref().unwrap(),
    );

    let ack = h.deliver(&event).unwrap();
    assert_eq!(ack.outcome, TransitionOutcome::Ignored);
    assert_eq!(h.payments(receipt.reservation_id)[0].status, PaymentStatus::Completed);
}

#[test]
fn test_processor_refund_event_is_idempotent() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    let intent = h.payments(receipt.reservation_id)[0].intent_ref.clone().unwrap();
    let event = h.charge_event("charge.refunded", &intent);

    assert_eq!(h.deliver(&event).unwrap().outcome, TransitionOutcome::Applied);
    assert_eq!(h.deliver(&event).unwrap().outcome, TransitionOutcome::Replayed);
    assert_eq!(h.payments(receipt.reservation_id)[0].status, PaymentStatus::Refunded);
}

#[test]
fn test_unhandled_event_type_is_acknowledged() {
    let h = Harness::new();
    let ack = h
        .deliver(&h.intent_event("payment_intent.created", "pi_unknown"))
        .unwrap();
    assert_eq!(ack.outcome, TransitionOutcome::Ignored);
    assert_eq!(ack.event_type, "payment_intent.created");
}

#[test]
fn test_unknown_intent_is_not_found() {
    let h = Harness::new();
    let err = h
        .deliver(&h.intent_event("payment_intent.succeeded", "pi_unknown"))
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound { .. }));
}

#[test]
fn test_signature_failures() {
    let h = Harness::new();
    let payload = h
        .intent_event("payment_intent.succeeded", "pi_unknown")
        .to_payload()
        .unwrap();
    let now = start_time().timestamp();

    let wrong_secret = sign_payload("whsec_other", now, &payload).unwrap();
    let stale = sign_payload(SECRET, now - 3600, &payload).unwrap();
    let good = sign_payload(SECRET, now, &payload).unwrap();
    let mut tampered = payload.clone();
    tampered.extend_from_slice(b" ");

    for (body, header) in [
        (&payload, wrong_secret.as_str()),
        (&payload, stale.as_str()),
        (&payload, "v1=deadbeef"),
        (&payload, ""),
        (&tampered, good.as_str()),
    ] {
        let err = h.engine.handle_processor_webhook(body, header).unwrap_err();
        assert!(matches!(err, BookingError::Signature { .. }), "{}", err);
    }
}

#[test]
fn test_rotated_secret_header_is_accepted() {
    let h = Harness::new();
    let payload = h
        .intent_event("customer.created", "pi_unknown")
        .to_payload()
        .unwrap();
    let now = start_time().timestamp();

    let good = sign_payload(SECRET, now, &payload).unwrap();
    let old = sign_payload("whsec_old", now, &payload).unwrap();
    let old_v1 = old.split_once(',').unwrap().1;
    let header = format!("{},{}", good, old_v1);

    assert!(h.engine.handle_processor_webhook(&payload, &header).is_ok());
}

#[test]
fn test_malformed_payload() {
    let h = Harness::new();
    let payload = b"{\"id\": 5}".to_vec();
    let header = sign_payload(SECRET, start_time().timestamp(), &payload).unwrap();

    let err = h.engine.handle_processor_webhook(&payload, &header).unwrap_err();
    assert!(matches!(err, BookingError::MalformedEvent { .. }));
}

// ---------------------------------------------------------------------------
// Accept
// ---------------------------------------------------------------------------

#[rstest]
#[case::renter_pays(CommissionPolicy::RenterPays, "1036.34", "1036.34")]
#[case::owner_pays(CommissionPolicy::OwnerPays, "1000", "963.66")]
#[case::no_commission(CommissionPolicy::None, "1000", "1000")]
fn test_accept_generates_installments_and_credits_owner(
    #[case] commission: CommissionPolicy,
    #[case] installment_amount: &str,
    #[case] credited: &str,
) {
    let h = Harness::new();
    h.listing("house", RentPeriod::Monthly, "1000", 0, commission);

    let receipt = h.paid("house", ymd(2024, 3, 15), ymd(2024, 5, 10));
    let outcome = h
        .engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap();

    assert_eq!(outcome.status, ReservationStatus::Accepted);
    assert_eq!(outcome.installments, 2);
    assert_eq!(outcome.credited, money(credited));
    assert_eq!(
        outcome.message,
        "reservation accepted successfully, payment plan created and balance given to the owner"
    );
    assert_eq!(h.balance(), money(credited));

    let payments = h.payments(receipt.reservation_id);
    assert_eq!(payments.len(), 3);
    assert_eq!(payments.iter().filter(|p| p.is_first_payment).count(), 1);

    let april = &payments[1];
    assert_eq!(april.status, PaymentStatus::Pending);
    assert_eq!(april.start_date, ymd(2024, 4, 1));
    assert_eq!(april.end_date, ymd(2024, 4, 30));
    assert_eq!(april.expire, Utc.with_ymd_and_hms(2024, 4, 15, 20, 59, 59).unwrap());
    assert_eq!(april.amount, money(installment_amount));
    assert_eq!(april.amount_gross, money("1000"));

    let may = &payments[2];
    assert_eq!(may.start_date, ymd(2024, 5, 1));
    assert_eq!(may.expire, Utc.with_ymd_and_hms(2024, 5, 15, 20, 59, 59).unwrap());
}

#[test]
fn test_daily_accept_credits_without_installments() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::RenterPays);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    let outcome = h
        .engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap();
    assert_eq!(outcome.installments, 0);
    assert_eq!(h.balance(), money("315.44"));
}

#[rstest]
#[case::renter_pays(CommissionPolicy::RenterPays)]
#[case::no_commission(CommissionPolicy::None)]
fn test_first_payment_credit_is_the_charged_amount(#[case] commission: CommissionPolicy) {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, commission);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    let first = h.payments(receipt.reservation_id)[0].clone();
    let outcome = h
        .engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap();
    assert_eq!(outcome.credited, first.amount);
    assert_eq!(h.balance(), first.amount);
}

#[test]
fn test_accept_twice_conflicts() {
    let h = Harness::new();
    h.listing("house", RentPeriod::Monthly, "1000", 0, CommissionPolicy::None);

    let receipt = h.paid("house", ymd(2024, 3, 1), ymd(2024, 5, 31));
    h.engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap();

    let err = h
        .engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap_err();
    assert!(matches!(err, BookingError::Conflict { .. }));
    assert!(err.to_string().contains("already accepted or rejected"));
    assert_eq!(h.payments(receipt.reservation_id).len(), 3);
    assert_eq!(h.balance(), money("1000"));
}

#[test]
fn test_accept_requires_paid_and_completed() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let pending = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    assert!(matches!(
        h.engine.accept_reservation(pending.reservation_id, OWNER),
        Err(BookingError::InvalidTransition { .. })
    ));

    let intent = h.checkout(pending.payment_id);
    h.backend.processor.settle_intent(&intent).unwrap();
    h.deliver(&h.intent_event("payment_intent.succeeded", &intent))
        .unwrap();
    assert_eq!(h.status(pending.reservation_id), ReservationStatus::Paid);

    // Intent confirmed but charge not settled yet
    assert!(matches!(
        h.engine.accept_reservation(pending.reservation_id, OWNER),
        Err(BookingError::Conflict { .. })
    ));
    assert_eq!(h.status(pending.reservation_id), ReservationStatus::Paid);
}

#[test]
fn test_only_owner_can_accept_or_reject() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    assert!(matches!(
        h.engine.accept_reservation(receipt.reservation_id, RENTER),
        Err(BookingError::NotFound { .. })
    ));
    assert!(matches!(
        h.engine.reject_reservation(receipt.reservation_id, RENTER),
        Err(BookingError::NotFound { .. })
    ));
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Paid);
}

#[test]
fn test_ledger_failure_rolls_back_accept() {
    let ledger = Arc::new(FailingLedger::default());
    let h = {
        let ledger = ledger.clone();
        Harness::with(move |_, mut collab| {
            collab.ledger = ledger;
            collab
        })
    };
    h.listing("house", RentPeriod::Monthly, "1000", 0, CommissionPolicy::None);
    let receipt = h.paid("house", ymd(2024, 3, 1), ymd(2024, 5, 31));

    ledger.fail.store(true, Ordering::SeqCst);
    let err = h
        .engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap_err();
    assert!(matches!(err, BookingError::Storage { .. }));
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Paid);
    assert_eq!(h.payments(receipt.reservation_id).len(), 1);
    assert_eq!(h.balance(), Decimal::ZERO);

    ledger.fail.store(false, Ordering::SeqCst);
    let outcome = h
        .engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap();
    assert_eq!(outcome.installments, 2);
    assert_eq!(h.balance(), money("1000"));
}

#[test]
fn test_installment_failure_rolls_back_accept() {
    let mut flaky = None;
    let h = Harness::with(|backend, mut collab| {
        let payments = Arc::new(FlakyPayments::new(backend.store.clone()));
        flaky = Some(payments.clone());
        collab.payments = payments;
        collab
    });
    let flaky = flaky.unwrap();
    h.listing("house", RentPeriod::Monthly, "1000", 0, CommissionPolicy::None);
    let receipt = h.paid("house", ymd(2024, 3, 1), ymd(2024, 6, 30));

    // The second of three installments fails to persist
    flaky.budget.store(1, Ordering::SeqCst);
    let err = h
        .engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Paid);
    assert_eq!(h.payments(receipt.reservation_id).len(), 1);
    assert_eq!(h.balance(), Decimal::ZERO);
}

// ---------------------------------------------------------------------------
// Installments
// ---------------------------------------------------------------------------

#[test]
fn test_installment_completion_credits_owner_once() {
    let h = Harness::new();
    h.listing("house", RentPeriod::Monthly, "1000", 0, CommissionPolicy::OwnerPays);

    let receipt = h.paid("house", ymd(2024, 3, 1), ymd(2024, 5, 31));
    h.engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap();
    assert_eq!(h.balance(), money("963.66"));

    let april = h.payments(receipt.reservation_id)[1].id;
    let intent = h.checkout(april);
    h.backend.processor.settle_intent(&intent).unwrap();
    let ack = h
        .deliver(&h.intent_event("payment_intent.succeeded", &intent))
        .unwrap();
    assert_eq!(ack.outcome, TransitionOutcome::Applied);
    assert_eq!(h.balance(), money("963.66"));

    let charge = h.charge_event("charge.succeeded", &intent);
    assert_eq!(h.deliver(&charge).unwrap().outcome, TransitionOutcome::Applied);
    assert_eq!(h.balance(), money("1927.32"));

    assert_eq!(h.deliver(&charge).unwrap().outcome, TransitionOutcome::Replayed);
    assert_eq!(h.balance(), money("1927.32"));
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Accepted);
}

#[test]
fn test_installment_ledger_failure_keeps_payment_retryable() {
    let ledger = Arc::new(FailingLedger::default());
    let h = {
        let ledger = ledger.clone();
        Harness::with(move |_, mut collab| {
            collab.ledger = ledger;
            collab
        })
    };
    h.listing("house", RentPeriod::Monthly, "1000", 0, CommissionPolicy::None);
    let receipt = h.paid("house", ymd(2024, 3, 1), ymd(2024, 4, 30));
    h.engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap();

    let april = h.payments(receipt.reservation_id)[1].id;
    let intent = h.checkout(april);
    h.backend.processor.settle_intent(&intent).unwrap();
    h.deliver(&h.intent_event("payment_intent.succeeded", &intent))
        .unwrap();

    let charge = h.charge_event("charge.succeeded", &intent);
    ledger.fail.store(true, Ordering::SeqCst);
    assert!(h.deliver(&charge).is_err());
    assert_eq!(h.payments(receipt.reservation_id)[1].status, PaymentStatus::Succeeded);

    ledger.fail.store(false, Ordering::SeqCst);
    assert_eq!(h.deliver(&charge).unwrap().outcome, TransitionOutcome::Applied);
    assert_eq!(h.balance(), money("2000"));
}

#[test]
fn test_installment_checkout_charges_list_price() {
    let h = Harness::new();
    h.listing("house", RentPeriod::Monthly, "1000", 0, CommissionPolicy::None);

    let receipt = h.paid("house", ymd(2024, 3, 1), ymd(2024, 4, 30));
    h.engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap();
    let april = h.payments(receipt.reservation_id)[1].id;

    let session = h.engine.begin_payment(april, RENTER).unwrap();
    assert!(!session.commission);
    assert_eq!(session.amount, money("1000"));
}

// ---------------------------------------------------------------------------
// Cancel and reject
// ---------------------------------------------------------------------------

#[test]
fn test_cancel_paid_reservation_refunds_first() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    let outcome = h
        .engine
        .cancel_reservation(receipt.reservation_id, RENTER)
        .unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.refunded);

    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Cancelled);
    let payment = &h.payments(receipt.reservation_id)[0];
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert!(payment.refund_ref.as_deref().unwrap().starts_with("re_"));
    assert!(h.engine.reserved_dates("flat").unwrap().is_empty());
}

#[test]
fn test_refund_failure_aborts_cancel() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    h.backend.processor.set_fail_refunds(true);

    let err = h
        .engine
        .cancel_reservation(receipt.reservation_id, RENTER)
        .unwrap_err();
    assert!(matches!(err, BookingError::Processor { .. }));
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Paid);
    assert_eq!(h.payments(receipt.reservation_id)[0].status, PaymentStatus::Completed);

    h.backend.processor.set_fail_refunds(false);
    assert!(h
        .engine
        .cancel_reservation(receipt.reservation_id, RENTER)
        .unwrap()
        .refunded);
}

#[test]
fn test_refund_timeout_is_retryable() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    h.backend.processor.set_timeouts(true);

    let err = h
        .engine
        .reject_reservation(receipt.reservation_id, OWNER)
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Paid);
}

#[test]
fn test_cancel_pending_leaves_payment_alone() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    let outcome = h
        .engine
        .cancel_reservation(receipt.reservation_id, RENTER)
        .unwrap();
    assert!(!outcome.refunded);
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Cancelled);
    assert_eq!(h.payments(receipt.reservation_id)[0].status, PaymentStatus::Pending);

    let err = h
        .engine
        .cancel_reservation(receipt.reservation_id, RENTER)
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
}

#[test]
fn test_cancel_rules() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let expired = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    let accepted = h.paid("flat", ymd(2024, 3, 10), ymd(2024, 3, 12));
    h.engine
        .accept_reservation(accepted.reservation_id, OWNER)
        .unwrap();

    assert!(matches!(
        h.engine.cancel_reservation(accepted.reservation_id, RENTER),
        Err(BookingError::InvalidTransition { .. })
    ));
    assert!(matches!(
        h.engine.cancel_reservation(expired.reservation_id, "someone-else"),
        Err(BookingError::NotFound { .. })
    ));

    h.clock.advance(Duration::hours(25));
    assert!(matches!(
        h.engine.cancel_reservation(expired.reservation_id, RENTER),
        Err(BookingError::Conflict { .. })
    ));
}

#[test]
fn test_reject_refunds_and_frees_dates() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    let outcome = h
        .engine
        .reject_reservation(receipt.reservation_id, OWNER)
        .unwrap();
    assert_eq!(outcome.status, ReservationStatus::Rejected);
    assert!(outcome.refunded);
    assert_eq!(h.payments(receipt.reservation_id)[0].status, PaymentStatus::Refunded);

    assert!(matches!(
        h.engine.reject_reservation(receipt.reservation_id, OWNER),
        Err(BookingError::InvalidTransition { .. })
    ));
    h.book_as("renter-2", "flat", ymd(2024, 3, 1), ymd(2024, 3, 3))
        .unwrap();
}

// ---------------------------------------------------------------------------
// Interleaved actions
// ---------------------------------------------------------------------------

#[rstest]
#[case::accept_during_cancel(Action::Cancel, Action::Accept, ReservationStatus::Cancelled)]
#[case::accept_during_reject(Action::Reject, Action::Accept, ReservationStatus::Rejected)]
#[case::cancel_during_reject(Action::Reject, Action::Cancel, ReservationStatus::Rejected)]
#[case::reject_during_cancel(Action::Cancel, Action::Reject, ReservationStatus::Cancelled)]
fn test_action_during_refund_conflicts(
    #[case] first: Action,
    #[case] second: Action,
    #[case] expected: ReservationStatus,
) {
    let (h, processor) = Harness::interleaving();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    processor.on_next_refund(second, receipt.reservation_id);
    first.run(&h.engine, receipt.reservation_id).unwrap();

    let interleaved = processor.interleaved();
    assert_eq!(interleaved.len(), 1);
    assert!(matches!(interleaved[0], Err(BookingError::Conflict { .. })));

    assert_eq!(h.status(receipt.reservation_id), expected);
    let payments = h.payments(receipt.reservation_id);
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Refunded);
    assert_eq!(h.balance(), Decimal::ZERO);

    // Once the refund is through the reservation is closed for good
    assert!(matches!(
        second.run(&h.engine, receipt.reservation_id),
        Err(BookingError::InvalidTransition { .. }) | Err(BookingError::Conflict { .. })
    ));
    assert_eq!(h.status(receipt.reservation_id), expected);
    assert_eq!(h.balance(), Decimal::ZERO);
}

#[test]
fn test_accept_after_processor_refund_conflicts() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.paid("flat", ymd(2024, 3, 1), ymd(2024, 3, 3));
    let intent = h.payments(receipt.reservation_id)[0].intent_ref.clone().unwrap();
    h.deliver(&h.charge_event("charge.refunded", &intent))
        .unwrap();

    let err = h
        .engine
        .accept_reservation(receipt.reservation_id, OWNER)
        .unwrap_err();
    assert!(matches!(err, BookingError::Conflict { .. }));
    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Paid);
    assert_eq!(h.balance(), Decimal::ZERO);
}

#[rstest]
fn test_payment_confirmed_after_pending_cancel_is_refunded(
    #[values(true, false)] intent_first: bool,
) {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    let intent = h.checkout(receipt.payment_id);
    h.engine
        .cancel_reservation(receipt.reservation_id, RENTER)
        .unwrap();

    if intent_first {
        h.backend.processor.settle_intent(&intent).unwrap();
        h.deliver(&h.intent_event("payment_intent.succeeded", &intent))
            .unwrap();
        let payment = &h.payments(receipt.reservation_id)[0];
        assert_eq!(payment.status, PaymentStatus::Succeeded);
        assert!(payment.refund_ref.is_none());
    }

    let charge = h.charge_event("charge.succeeded", &intent);
    h.deliver(&charge).unwrap();

    assert_eq!(h.status(receipt.reservation_id), ReservationStatus::Cancelled);
    let payment = &h.payments(receipt.reservation_id)[0];
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert!(payment.refund_ref.as_deref().unwrap().starts_with("re_"));
    assert_eq!(h.balance(), Decimal::ZERO);

    let replay = h.deliver(&charge).unwrap();
    assert_eq!(replay.outcome, TransitionOutcome::Ignored);
    assert_eq!(h.payments(receipt.reservation_id)[0].status, PaymentStatus::Refunded);
}

// ---------------------------------------------------------------------------
// Checkout, receipts and read models
// ---------------------------------------------------------------------------

#[test]
fn test_begin_payment_reuses_intent() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    let first = h.engine.begin_payment(receipt.payment_id, RENTER).unwrap();
    let second = h.engine.begin_payment(receipt.payment_id, RENTER).unwrap();
    assert_eq!(first, second);

    let (amount, description) = h.backend.processor.intent_details(&first.intent_ref).unwrap();
    assert_eq!(amount, money("300"));
    assert!(description.contains("Listing flat"));
    assert!(description.contains("01/03/2024 - 03/03/2024"));
    assert!(description.contains(&receipt.payment_id.to_string()));

    assert!(matches!(
        h.engine.begin_payment(receipt.payment_id, "renter-2"),
        Err(BookingError::NotFound { .. })
    ));
}

#[test]
fn test_begin_payment_after_processor_success_conflicts() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    let intent = h.checkout(receipt.payment_id);
    h.backend.processor.settle_intent(&intent).unwrap();

    let err = h
        .engine
        .begin_payment(receipt.payment_id, RENTER)
        .unwrap_err();
    assert!(err.to_string().contains("already succeeded"));
}

#[test]
fn test_begin_payment_after_expiry_conflicts() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    h.clock.advance(Duration::hours(25));
    assert!(matches!(
        h.engine.begin_payment(receipt.payment_id, RENTER),
        Err(BookingError::Conflict { .. })
    ));
}

#[test]
fn test_receipt_needs_completed_payment() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);

    let receipt = h.book("flat", ymd(2024, 3, 1), ymd(2024, 3, 3)).unwrap();
    assert!(matches!(
        h.engine.receipt(receipt.payment_id, RENTER),
        Err(BookingError::Conflict { .. })
    ));

    h.pay(receipt.payment_id);
    let charge = h.payments(receipt.reservation_id)[0].charge_ref.clone().unwrap();
    let url = h.engine.receipt(receipt.payment_id, RENTER).unwrap();
    assert_eq!(url, h.backend.processor.receipt_url(&charge).unwrap());
}

#[test]
fn test_read_models() {
    let h = Harness::new();
    h.listing("flat", RentPeriod::Daily, "100", 1, CommissionPolicy::None);
    h.listing("house", RentPeriod::Monthly, "1000", 0, CommissionPolicy::None);

    let later = h.book("flat", ymd(2024, 3, 10), ymd(2024, 3, 11)).unwrap();
    let earlier = h.book("house", ymd(2024, 3, 1), ymd(2024, 3, 31)).unwrap();
    h.book_as("renter-2", "flat", ymd(2024, 3, 1), ymd(2024, 3, 2))
        .unwrap();

    assert_eq!(
        h.engine.reserved_dates("flat").unwrap(),
        vec![ymd(2024, 3, 1), ymd(2024, 3, 2), ymd(2024, 3, 10), ymd(2024, 3, 11)]
    );

    assert_eq!(h.engine.reservations_for_listing("flat", OWNER).unwrap().len(), 2);
    assert!(matches!(
        h.engine.reservations_for_listing("flat", RENTER),
        Err(BookingError::NotFound { .. })
    ));

    let mine: Vec<PaymentId> = h
        .engine
        .payments_for_user(RENTER)
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(mine, vec![earlier.payment_id, later.payment_id]);
}
