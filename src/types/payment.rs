//! Payment types and the payment status machine
//!
//! A payment is one billable installment of a reservation. Its status moves
//! forward only; replaying a transition into the current status is reported
//! as a no-op so webhook redelivery stays idempotent.

use super::error::BookingError;
use super::reservation::ReservationId;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Payment identifier
pub type PaymentId = Uuid;

/// Lifecycle of a single payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Waiting for the renter to pay
    Pending,
    /// Processor confirmed the payment intent
    Succeeded,
    /// Processor confirmed the underlying charge settled
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    /// Whether `self -> next` is an edge of the payment state machine
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;

        match (self, next) {
            (Pending, Succeeded) | (Pending, Failed) | (Pending, Cancelled) => true,
            (Succeeded, Completed) | (Succeeded, Refunded) => true,
            (Completed, Refunded) => true,
            (Pending, _) | (Succeeded, _) | (Completed, _) => false,
            (Failed, _) | (Cancelled, _) | (Refunded, _) => false,
        }
    }

    /// Whether the processor has confirmed money for this payment
    pub fn is_collected(self) -> bool {
        matches!(self, PaymentStatus::Succeeded | PaymentStatus::Completed)
    }

    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded
        )
    }

    /// Numeric code used by the marketplace (1-based)
    pub fn code(self) -> u8 {
        match self {
            PaymentStatus::Pending => 1,
            PaymentStatus::Succeeded => 2,
            PaymentStatus::Completed => 3,
            PaymentStatus::Failed => 4,
            PaymentStatus::Cancelled => 5,
            PaymentStatus::Refunded => 6,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Succeeded => "Succeeded",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Cancelled => "Cancelled",
            PaymentStatus::Refunded => "Refunded",
        };
        f.write_str(name)
    }
}

/// One billable installment of a reservation
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: PaymentId,
    pub reservation_id: ReservationId,

    /// Amount charged to the renter (grossed up under `RenterPays`)
    pub amount: Decimal,

    /// List price of the billed window, before the renter-side commission
    pub amount_gross: Decimal,

    /// First day of the billed window
    pub start_date: NaiveDate,

    /// Last day of the billed window, inclusive
    pub end_date: NaiveDate,

    /// Payment deadline
    pub expire: DateTime<Utc>,

    pub status: PaymentStatus,

    /// Exactly one payment per reservation has this set
    pub is_first_payment: bool,

    /// Processor payment intent
    pub intent_ref: Option<String>,

    /// Client secret of the payment intent, handed back to the renter
    pub client_secret: Option<String>,

    /// Processor charge
    pub charge_ref: Option<String>,

    /// Processor refund
    pub refund_ref: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Create a Pending payment with no processor references
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reservation_id: ReservationId,
        amount: Decimal,
        amount_gross: Decimal,
        start_date: NaiveDate,
        end_date: NaiveDate,
        expire: DateTime<Utc>,
        is_first_payment: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reservation_id,
            amount,
            amount_gross,
            start_date,
            end_date,
            expire,
            status: PaymentStatus::Pending,
            is_first_payment,
            intent_ref: None,
            client_secret: None,
            charge_ref: None,
            refund_ref: None,
            created_at,
        }
    }

    /// Move to `next`
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if the status changed
    /// * `Ok(false)` if the payment was already in `next` (replay)
    ///
    /// # Errors
    ///
    /// Returns `BookingError::InvalidTransition` for an illegal edge.
    pub fn transition(&mut self, next: PaymentStatus) -> Result<bool, BookingError> {
        if self.status == next {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(BookingError::invalid_transition(
                "payment",
                self.status,
                next,
            ));
        }
        self.status = next;
        Ok(true)
    }
}

/// Checkout data handed to the renter to complete a payment
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSession {
    pub payment_id: PaymentId,
    pub intent_ref: String,
    pub client_secret: String,
    pub amount: Decimal,
    pub amount_gross: Decimal,
    /// True when the renter pays the processor fee on top of the list price
    pub commission: bool,
}
