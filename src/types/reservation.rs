//! Reservation types and the reservation status machine
//!
//! Transitions are closed over the `ReservationStatus` enum: every legal edge
//! is listed in [`ReservationStatus::can_transition_to`] and everything else
//! is rejected with `BookingError::InvalidTransition`.

use super::error::BookingError;
use super::listing::{CommissionPolicy, ListingId, RentPeriod, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reservation identifier
pub type ReservationId = Uuid;

/// Lifecycle of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Created, waiting for the first payment
    Pending,
    /// First payment confirmed by the processor
    Paid,
    /// Owner accepted; installments have been generated
    Accepted,
    /// Owner rejected
    Rejected,
    /// Renter cancelled
    Cancelled,
}

impl ReservationStatus {
    /// Whether `self -> next` is an edge of the reservation state machine
    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;

        match (self, next) {
            (Pending, Paid) | (Pending, Cancelled) => true,
            (Paid, Accepted) | (Paid, Rejected) | (Paid, Cancelled) => true,
            (Pending, _) | (Paid, _) => false,
            (Accepted, _) | (Rejected, _) | (Cancelled, _) => false,
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReservationStatus::Accepted | ReservationStatus::Rejected | ReservationStatus::Cancelled
        )
    }

    /// Numeric code used by the marketplace (1-based)
    pub fn code(self) -> u8 {
        match self {
            ReservationStatus::Pending => 1,
            ReservationStatus::Paid => 2,
            ReservationStatus::Accepted => 3,
            ReservationStatus::Rejected => 4,
            ReservationStatus::Cancelled => 5,
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReservationStatus::Pending => "Pending",
            ReservationStatus::Paid => "Paid",
            ReservationStatus::Accepted => "Accepted",
            ReservationStatus::Rejected => "Rejected",
            ReservationStatus::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Renter details captured when the reservation is created
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Renter {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    /// National identity number, exactly 11 digits
    pub identity_number: String,
}

impl Renter {
    /// Check the identity number shape
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Validation` unless the number is 11 ASCII digits.
    pub fn validate_identity(&self) -> Result<(), BookingError> {
        let number = self.identity_number.as_str();
        if number.len() == 11 && number.bytes().all(|b| b.is_ascii_digit()) {
            Ok(())
        } else {
            Err(BookingError::validation(
                "identity number must be exactly 11 digits",
            ))
        }
    }
}

/// A renter's claim on a listing for a date window
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: ReservationId,
    pub listing_id: ListingId,

    /// Listing owner at creation time; receives settlements
    pub owner_id: UserId,

    /// Renter who made the booking
    pub creator_id: UserId,

    /// First occupied day (normalized to the period boundary)
    pub start_date: NaiveDate,

    /// Last occupied day, inclusive (normalized to the period boundary)
    pub end_date: NaiveDate,

    /// Copied from the listing so later edits don't reprice
    pub rent_period: RentPeriod,

    /// Copied from the listing so settlement uses the terms the renter saw
    pub commission: CommissionPolicy,

    pub unit_price: Decimal,
    pub total_price: Decimal,

    /// Deadline for the first payment
    pub expire: DateTime<Utc>,

    pub status: ReservationStatus,
    pub renter: Renter,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// A Pending reservation whose payment deadline has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && now >= self.expire
    }

    /// Whether this reservation still blocks its date window
    ///
    /// Cancelled and Rejected reservations never block; Pending ones block
    /// only until their payment deadline.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ReservationStatus::Cancelled | ReservationStatus::Rejected => false,
            ReservationStatus::Pending => now < self.expire,
            ReservationStatus::Paid | ReservationStatus::Accepted => true,
        }
    }

    /// Status name shown to users, with `Expired` for lapsed Pending reservations
    pub fn status_label(&self, now: DateTime<Utc>) -> String {
        if self.is_expired(now) {
            "Expired".to_string()
        } else {
            self.status.to_string()
        }
    }

    /// Move to `next` if the state machine allows it
    ///
    /// # Errors
    ///
    /// Returns `BookingError::InvalidTransition` for an illegal edge.
    pub fn transition(&mut self, next: ReservationStatus) -> Result<(), BookingError> {
        if !self.status.can_transition_to(next) {
            return Err(BookingError::invalid_transition(
                "reservation",
                self.status,
                next,
            ));
        }
        self.status = next;
        Ok(())
    }
}
