//! Collaborator traits for storage, settlement, the payment processor and time
//!
//! This module defines the narrow contracts the booking core consumes. Each
//! entity gets its own repository trait so components depend only on the
//! capabilities they use. All traits are object safe and `Send + Sync`; the
//! engine holds them as `Arc<dyn Trait>` inside [`Collaborators`].
//!
//! Update methods take a closure that runs against a copy of the record while
//! the record is locked. The copy is committed only if the closure returns
//! `Ok`, so a failed closure leaves no partial state behind.

use crate::types::{
    BookingError, Listing, OwnerBalance, Payment, PaymentId, Reservation, ReservationId,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Closure applied to a locked reservation
pub type ReservationUpdate<'a> =
    &'a mut dyn FnMut(&mut Reservation) -> Result<(), BookingError>;

/// Closure applied to a locked payment
pub type PaymentUpdate<'a> = &'a mut dyn FnMut(&mut Payment) -> Result<(), BookingError>;

/// Read access to listing terms
pub trait ListingRepository: Send + Sync {
    /// Get a listing by ID
    ///
    /// # Errors
    ///
    /// Returns `BookingError::NotFound` if the listing does not exist.
    fn get_listing(&self, id: &str) -> Result<Listing, BookingError>;
}

/// Storage of reservations
pub trait ReservationRepository: Send + Sync {
    /// Persist a new Pending reservation together with its first payment
    ///
    /// Both records become visible together or not at all. The overlap check
    /// against active reservations of the same listing runs under the same
    /// per-listing lock as the insert.
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Conflict` if an active reservation overlaps the
    /// window, or if either identifier is already taken.
    fn create_with_first_payment(
        &self,
        reservation: Reservation,
        payment: Payment,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError>;

    /// Get a reservation by ID
    fn get_reservation(&self, id: ReservationId) -> Result<Reservation, BookingError>;

    /// Replace a stored reservation
    fn save_reservation(&self, reservation: Reservation) -> Result<(), BookingError>;

    /// Apply `f` to a reservation atomically and return the committed record
    fn update_reservation(
        &self,
        id: ReservationId,
        f: ReservationUpdate<'_>,
    ) -> Result<Reservation, BookingError>;

    /// Whether an active reservation on `listing` intersects `[start, end]`
    fn find_overlapping(
        &self,
        listing: &str,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
        exclude: Option<ReservationId>,
    ) -> Result<bool, BookingError>;

    /// Every reservation on a listing
    fn reservations_for_listing(&self, listing: &str) -> Result<Vec<Reservation>, BookingError>;

    /// Every reservation made by a renter
    fn reservations_for_creator(&self, creator: &str) -> Result<Vec<Reservation>, BookingError>;
}

/// Storage of payments
///
/// Processor references (intent, charge, refund) are globally unique: a save
/// or update that would attach a reference already owned by another payment
/// fails with `BookingError::Conflict`.
pub trait PaymentRepository: Send + Sync {
    /// Persist a new payment
    fn create_payment(&self, payment: Payment) -> Result<(), BookingError>;

    /// Get a payment by ID
    fn get_payment(&self, id: PaymentId) -> Result<Payment, BookingError>;

    /// Replace a stored payment
    fn save_payment(&self, payment: Payment) -> Result<(), BookingError>;

    /// Apply `f` to a payment atomically and return the committed record
    fn update_payment(&self, id: PaymentId, f: PaymentUpdate<'_>) -> Result<Payment, BookingError>;

    /// Resolve a payment by its processor intent reference
    fn find_by_intent_ref(&self, intent_ref: &str) -> Result<Option<Payment>, BookingError>;

    /// Resolve a payment by its processor charge reference
    fn find_by_charge_ref(&self, charge_ref: &str) -> Result<Option<Payment>, BookingError>;

    /// The first payment of a reservation
    fn first_payment(&self, reservation: ReservationId) -> Result<Payment, BookingError>;

    /// Every payment of a reservation, ordered by billing window
    fn payments_for_reservation(
        &self,
        reservation: ReservationId,
    ) -> Result<Vec<Payment>, BookingError>;

    /// Delete the payments of a reservation
    ///
    /// # Arguments
    ///
    /// * `reservation` - Reservation whose payments are removed
    /// * `exclude_first` - Keep the first payment
    ///
    /// # Returns
    ///
    /// The number of payments deleted.
    fn delete_payments(
        &self,
        reservation: ReservationId,
        exclude_first: bool,
    ) -> Result<usize, BookingError>;
}

/// Owner balances
pub trait BalanceLedger: Send + Sync {
    /// Atomically add `amount` to the owner's balance and return the new balance
    fn credit_balance(&self, owner: &str, amount: Decimal) -> Result<Decimal, BookingError>;

    /// Current balance of an owner (zero if never credited)
    fn balance(&self, owner: &str) -> Result<Decimal, BookingError>;

    /// Every balance, ordered by owner
    fn balances(&self) -> Result<Vec<OwnerBalance>, BookingError>;
}

/// Intent handed back by the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeIntent {
    pub intent_ref: String,
    pub client_secret: String,
}

/// Processor-side state of a payment intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    RequiresPayment,
    Processing,
    Succeeded,
    Canceled,
}

/// External payment processor
///
/// Implementations must bound every call with a timeout and report it as
/// `BookingError::ProcessorTimeout`.
pub trait PaymentProcessor: Send + Sync {
    /// Create a payment intent for `amount` in `currency`
    fn create_charge_intent(
        &self,
        customer_ref: &str,
        amount: Decimal,
        currency: &str,
        description: &str,
    ) -> Result<ChargeIntent, BookingError>;

    /// Processor-side status of an intent
    fn confirmation_status(&self, intent_ref: &str) -> Result<IntentStatus, BookingError>;

    /// Refund a settled charge and return the refund reference
    fn refund_charge(&self, charge_ref: &str) -> Result<String, BookingError>;

    /// Public receipt URL of a charge
    fn receipt_url(&self, charge_ref: &str) -> Result<String, BookingError>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Everything the booking core talks to
#[derive(Clone)]
pub struct Collaborators {
    pub listings: Arc<dyn ListingRepository>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub ledger: Arc<dyn BalanceLedger>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub clock: Arc<dyn Clock>,
}
