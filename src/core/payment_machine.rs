//! Payment state machine
//!
//! Applies processor confirmations to payments and drives the side effects
//! they imply:
//!
//! - intent succeeded on a first payment promotes the reservation to Paid
//! - charge succeeded on an installment credits the owner, inside the same
//!   atomic update that moves the payment to Completed
//! - a first payment collected for a reservation that was cancelled or
//!   rejected in the meantime is refunded once its charge is known
//!
//! Every entry point is idempotent. Replaying a confirmation the payment has
//! already absorbed reports [`TransitionOutcome::Replayed`]; a confirmation the
//! payment has moved past (or never could take) reports
//! [`TransitionOutcome::Ignored`] and changes nothing.

use super::ledger::SettlementLedger;
use super::reservation_machine::ReservationMachine;
use super::traits::{Collaborators, IntentStatus};
use crate::types::{
    BookingError, EngineConfig, Payment, PaymentId, PaymentSession, PaymentStatus,
    ReservationStatus,
};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a processor confirmation did to its payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The payment moved to a new status
    Applied,
    /// The payment was already in the target status
    Replayed,
    /// The event is stale or not a legal edge; nothing changed
    Ignored,
}

impl fmt::Display for TransitionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionOutcome::Applied => "applied",
            TransitionOutcome::Replayed => "replayed",
            TransitionOutcome::Ignored => "ignored",
        };
        f.write_str(name)
    }
}

/// Payment lifecycle operations
#[derive(Clone)]
pub struct PaymentMachine {
    collab: Collaborators,
    config: Arc<EngineConfig>,
    reservations: ReservationMachine,
    settlement: SettlementLedger,
}

impl PaymentMachine {
    pub fn new(
        collab: Collaborators,
        config: Arc<EngineConfig>,
        reservations: ReservationMachine,
    ) -> Self {
        let settlement = SettlementLedger::new(Arc::clone(&collab.ledger), Arc::clone(&config));
        Self {
            collab,
            config,
            reservations,
            settlement,
        }
    }

    /// The processor confirmed an intent
    ///
    /// Moves the payment to Succeeded. For a first payment the reservation is
    /// promoted to Paid; that promotion is re-attempted on replay so a
    /// redelivered event repairs a promotion that failed earlier.
    ///
    /// # Errors
    ///
    /// Returns `BookingError::NotFound` if no payment owns `intent_ref`.
    pub fn intent_succeeded(&self, intent_ref: &str) -> Result<TransitionOutcome, BookingError> {
        let payment = self.resolve_intent(intent_ref)?;
        let outcome = self.apply(&payment, PaymentStatus::Succeeded)?;

        if payment.is_first_payment && outcome != TransitionOutcome::Ignored {
            self.reservations.promote_to_paid(payment.reservation_id)?;
        }
        Ok(outcome)
    }

    /// The processor reported the intent failed
    pub fn intent_failed(&self, intent_ref: &str) -> Result<TransitionOutcome, BookingError> {
        let payment = self.resolve_intent(intent_ref)?;
        self.apply(&payment, PaymentStatus::Failed)
    }

    /// The processor reported the intent was cancelled
    pub fn intent_cancelled(&self, intent_ref: &str) -> Result<TransitionOutcome, BookingError> {
        let payment = self.resolve_intent(intent_ref)?;
        self.apply(&payment, PaymentStatus::Cancelled)
    }

    /// The processor confirmed a charge settled
    ///
    /// Records the charge reference and moves the payment to Completed. If
    /// the charge confirmation overtook the intent confirmation, the intent
    /// step is applied first. Installments credit the owner inside the same
    /// update, so the credit happens exactly once per payment.
    ///
    /// # Arguments
    ///
    /// * `intent_ref` - Intent the charge belongs to, if the event carries it
    /// * `charge_ref` - The settled charge
    ///
    /// # Errors
    ///
    /// - `NotFound` if no payment owns the references
    /// - `Conflict` if the charge is already attached to another payment
    /// - ledger errors; the payment stays Succeeded and the event can be retried
    pub fn charge_succeeded(
        &self,
        intent_ref: Option<&str>,
        charge_ref: &str,
    ) -> Result<TransitionOutcome, BookingError> {
        let payment = self.resolve_charge(intent_ref, charge_ref)?;

        if let Some(owner) = self.collab.payments.find_by_charge_ref(charge_ref)? {
            if owner.id != payment.id {
                return Err(BookingError::conflict(format!(
                    "charge {} belongs to payment {}",
                    charge_ref, owner.id
                )));
            }
        }

        if payment.status == PaymentStatus::Pending {
            if let Some(intent_ref) = payment.intent_ref.as_deref() {
                debug!(payment = %payment.id, "charge confirmed before its intent");
                self.intent_succeeded(intent_ref)?;
            }
        }

        let reservation = self
            .collab
            .reservations
            .get_reservation(payment.reservation_id)?;

        let mut outcome = TransitionOutcome::Ignored;
        let mut credited = Decimal::ZERO;
        let mut from = payment.status;

        self.collab.payments.update_payment(payment.id, &mut |p| {
            from = p.status;
            if p.status == PaymentStatus::Completed {
                outcome = TransitionOutcome::Replayed;
                return Ok(());
            }
            if !p.status.can_transition_to(PaymentStatus::Completed) {
                outcome = TransitionOutcome::Ignored;
                return Ok(());
            }

            match p.charge_ref.as_deref() {
                None => p.charge_ref = Some(charge_ref.to_string()),
                Some(existing) if existing != charge_ref => {
                    return Err(BookingError::conflict(format!(
                        "payment {} already settled by charge {}",
                        p.id, existing
                    )));
                }
                Some(_) => {}
            }
            p.transition(PaymentStatus::Completed)?;

            if !p.is_first_payment {
                credited = self
                    .settlement
                    .settle(&reservation.owner_id, p, reservation.commission)?;
            }
            outcome = TransitionOutcome::Applied;
            Ok(())
        })?;

        match outcome {
            TransitionOutcome::Applied => info!(
                payment = %payment.id,
                charge = charge_ref,
                %credited,
                "payment completed"
            ),
            TransitionOutcome::Replayed => {
                debug!(payment = %payment.id, "charge confirmation replayed")
            }
            TransitionOutcome::Ignored => warn!(
                payment = %payment.id,
                status = %from,
                "stale charge confirmation ignored"
            ),
        }

        if payment.is_first_payment && outcome != TransitionOutcome::Ignored {
            self.reservations.refund_if_closed(payment.reservation_id)?;
        }
        Ok(outcome)
    }

    /// The processor reported the charge failed
    pub fn charge_failed(
        &self,
        intent_ref: Option<&str>,
        charge_ref: &str,
    ) -> Result<TransitionOutcome, BookingError> {
        let payment = self.resolve_charge(intent_ref, charge_ref)?;
        self.apply(&payment, PaymentStatus::Failed)
    }

    /// The processor reported the charge was refunded
    pub fn charge_refunded(
        &self,
        intent_ref: Option<&str>,
        charge_ref: &str,
    ) -> Result<TransitionOutcome, BookingError> {
        let payment = self.resolve_charge(intent_ref, charge_ref)?;
        self.apply(&payment, PaymentStatus::Refunded)
    }

    /// Start (or resume) checkout for a Pending payment
    ///
    /// The first call creates a processor intent and stores its references on
    /// the payment. Later calls hand back the stored session unless the
    /// processor already reports the intent as succeeded.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the payment does not exist or the requester did not
    ///   make the reservation
    /// - `Conflict` if the payment is not payable (already paid, expired,
    ///   reservation in the wrong status)
    /// - processor errors
    pub fn begin_payment(
        &self,
        payment_id: PaymentId,
        requester: &str,
    ) -> Result<PaymentSession, BookingError> {
        let payment = self.collab.payments.get_payment(payment_id)?;
        let reservation = self
            .collab
            .reservations
            .get_reservation(payment.reservation_id)?;
        if reservation.creator_id != requester {
            return Err(BookingError::not_found("payment", payment_id));
        }
        if payment.status != PaymentStatus::Pending {
            return Err(BookingError::conflict(format!(
                "payment is already {}",
                payment.status
            )));
        }

        let now = self.collab.clock.now();
        if payment.is_first_payment {
            if reservation.status != ReservationStatus::Pending {
                return Err(BookingError::conflict(format!(
                    "reservation is {}",
                    reservation.status
                )));
            }
            if reservation.is_expired(now) {
                return Err(BookingError::conflict("reservation has expired"));
            }
        } else if reservation.status != ReservationStatus::Accepted {
            return Err(BookingError::conflict(
                "installments can only be paid on an accepted reservation",
            ));
        }

        if let (Some(intent_ref), Some(client_secret)) =
            (payment.intent_ref.as_deref(), payment.client_secret.as_deref())
        {
            if self.collab.processor.confirmation_status(intent_ref)? == IntentStatus::Succeeded {
                return Err(BookingError::conflict("payment already succeeded"));
            }
            return Ok(session(&payment, intent_ref, client_secret));
        }

        let listing = self.collab.listings.get_listing(&reservation.listing_id)?;
        let description = format!(
            "{} | {} - {} | payment {}",
            listing.title,
            payment.start_date.format("%d/%m/%Y"),
            payment.end_date.format("%d/%m/%Y"),
            payment.id
        );
        let intent = self.collab.processor.create_charge_intent(
            requester,
            payment.amount,
            &self.config.currency,
            &description,
        )?;

        let updated = self.collab.payments.update_payment(payment.id, &mut |p| {
            if p.status != PaymentStatus::Pending || p.intent_ref.is_some() {
                return Err(BookingError::conflict("payment checkout already started"));
            }
            p.intent_ref = Some(intent.intent_ref.clone());
            p.client_secret = Some(intent.client_secret.clone());
            Ok(())
        })?;

        info!(payment = %payment.id, intent = %intent.intent_ref, amount = %payment.amount, "checkout started");
        Ok(session(&updated, &intent.intent_ref, &intent.client_secret))
    }

    /// Receipt URL of a completed payment
    ///
    /// # Errors
    ///
    /// - `NotFound` if the payment does not exist or the requester did not
    ///   make the reservation
    /// - `Conflict` if the payment has not completed
    pub fn receipt(&self, payment_id: PaymentId, requester: &str) -> Result<String, BookingError> {
        let payment = self.collab.payments.get_payment(payment_id)?;
        let reservation = self
            .collab
            .reservations
            .get_reservation(payment.reservation_id)?;
        if reservation.creator_id != requester {
            return Err(BookingError::not_found("payment", payment_id));
        }
        if payment.status != PaymentStatus::Completed {
            return Err(BookingError::conflict(format!(
                "payment is {}, no receipt available",
                payment.status
            )));
        }

        let charge_ref = payment
            .charge_ref
            .as_deref()
            .ok_or_else(|| BookingError::conflict("payment has no charge"))?;
        self.collab.processor.receipt_url(charge_ref)
    }

    fn resolve_intent(&self, intent_ref: &str) -> Result<Payment, BookingError> {
        self.collab
            .payments
            .find_by_intent_ref(intent_ref)?
            .ok_or_else(|| BookingError::not_found("payment intent", intent_ref))
    }

    fn resolve_charge(
        &self,
        intent_ref: Option<&str>,
        charge_ref: &str,
    ) -> Result<Payment, BookingError> {
        if let Some(intent_ref) = intent_ref {
            return self.resolve_intent(intent_ref);
        }
        self.collab
            .payments
            .find_by_charge_ref(charge_ref)?
            .ok_or_else(|| BookingError::not_found("charge", charge_ref))
    }

    /// Move a payment to `next` without side effects
    fn apply(
        &self,
        payment: &Payment,
        next: PaymentStatus,
    ) -> Result<TransitionOutcome, BookingError> {
        let mut outcome = TransitionOutcome::Ignored;
        let mut from = payment.status;

        self.collab.payments.update_payment(payment.id, &mut |p| {
            from = p.status;
            outcome = if p.status == next {
                TransitionOutcome::Replayed
            } else if p.status.can_transition_to(next) {
                p.transition(next)?;
                TransitionOutcome::Applied
            } else {
                TransitionOutcome::Ignored
            };
            Ok(())
        })?;

        match outcome {
            TransitionOutcome::Applied => {
                info!(payment = %payment.id, %from, to = %next, "payment status changed")
            }
            TransitionOutcome::Replayed => {
                debug!(payment = %payment.id, status = %next, "confirmation replayed")
            }
            TransitionOutcome::Ignored => warn!(
                payment = %payment.id,
                %from,
                to = %next,
                "stale processor event ignored"
            ),
        }
        Ok(outcome)
    }
}

fn session(payment: &Payment, intent_ref: &str, client_secret: &str) -> PaymentSession {
    PaymentSession {
        payment_id: payment.id,
        intent_ref: intent_ref.to_string(),
        client_secret: client_secret.to_string(),
        amount: payment.amount,
        amount_gross: payment.amount_gross,
        commission: payment.amount > payment.amount_gross,
    }
}
