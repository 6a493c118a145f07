//! Request and result types of the booking operations

use super::listing::{ListingId, UserId};
use super::payment::PaymentId;
use super::reservation::{Renter, ReservationId, ReservationStatus};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// A renter asking to book a listing
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub listing_id: ListingId,
    pub requester: UserId,
    /// Requested first day, before period normalization
    pub start_date: NaiveDate,
    /// Requested last day, before period normalization
    pub end_date: NaiveDate,
    pub renter: Renter,
}

/// Result of a successful booking
#[derive(Debug, Clone, PartialEq)]
pub struct BookingReceipt {
    pub reservation_id: ReservationId,
    pub payment_id: PaymentId,
    /// Total price of the reservation window
    pub price: Decimal,
    /// What the renter is charged for the first payment
    pub first_charge: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub expire: DateTime<Utc>,
    pub status: ReservationStatus,
}

/// Result of a cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOutcome {
    pub reservation_id: ReservationId,
    pub cancelled: bool,
    /// True if this call issued a processor refund
    pub refunded: bool,
}

/// Result of an owner accepting a reservation
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptOutcome {
    pub reservation_id: ReservationId,
    pub status: ReservationStatus,
    /// Number of installment payments generated
    pub installments: usize,
    /// Amount credited to the owner for the first payment
    pub credited: Decimal,
    pub message: String,
}

/// Result of an owner rejecting a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectOutcome {
    pub reservation_id: ReservationId,
    pub status: ReservationStatus,
    /// True if this call issued a processor refund
    pub refunded: bool,
}
