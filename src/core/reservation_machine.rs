//! Reservation state machine
//!
//! Owns every reservation status change:
//!
//! ```text
//! Pending ──► Paid ──► Accepted
//!    │          ├────► Rejected
//!    └──────────┴────► Cancelled
//! ```
//!
//! `Pending -> Paid` is driven only by the payment state machine when the
//! first payment is confirmed. The other edges are user actions.
//!
//! # Failure domains
//!
//! - **Cancel / Reject** call the processor refund before flipping status. A
//!   failed refund leaves the reservation untouched.
//! - **Accept** claims `Paid -> Accepted` first so a second accept observes a
//!   conflict, then generates installments and credits the owner. If either
//!   step fails the installments are deleted and the status is restored to
//!   Paid before the error is returned.
//! - A first payment that is collected after its reservation closed (or
//!   after a lapsed hold lost its dates) is refunded as soon as the charge
//!   reference is known.
//!
//! Cancel, accept, reject and refund compensation hold a per-reservation
//! action lock for their whole duration. An action that finds the lock taken
//! fails with `Conflict` instead of waiting, so a refund in flight can never
//! be overtaken by an accept.

use super::availability::AvailabilityChecker;
use super::ledger::SettlementLedger;
use super::pricing::{self, charge_amount, installment_windows, round_money};
use super::traits::Collaborators;
use crate::types::{
    AcceptOutcome, BookingError, BookingReceipt, BookingRequest, CancelOutcome, EngineConfig,
    Payment, PaymentStatus, RejectOutcome, RentPeriod, Reservation, ReservationId,
    ReservationStatus,
};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, TryLockError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const ACCEPTED_MESSAGE: &str =
    "reservation accepted successfully, payment plan created and balance given to the owner";

/// Reservation lifecycle operations
#[derive(Clone)]
pub struct ReservationMachine {
    collab: Collaborators,
    config: Arc<EngineConfig>,
    availability: AvailabilityChecker,
    settlement: SettlementLedger,
    action_locks: Arc<DashMap<ReservationId, Arc<Mutex<()>>>>,
}

impl ReservationMachine {
    pub fn new(collab: Collaborators, config: Arc<EngineConfig>) -> Self {
        let availability = AvailabilityChecker::new(Arc::clone(&collab.reservations));
        let settlement = SettlementLedger::new(Arc::clone(&collab.ledger), Arc::clone(&config));
        Self {
            collab,
            config,
            availability,
            settlement,
            action_locks: Arc::new(DashMap::new()),
        }
    }

    /// Availability queries over the same storage
    pub fn availability(&self) -> &AvailabilityChecker {
        &self.availability
    }

    /// Book a listing
    ///
    /// Prices the request, checks availability and stores a Pending
    /// reservation with its Pending first payment as one unit.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed identity number or dates the rent
    ///   period does not allow
    /// - `NotFound` if the listing does not exist
    /// - `Conflict` if an active reservation overlaps the window
    pub fn create(&self, request: &BookingRequest) -> Result<BookingReceipt, BookingError> {
        request.renter.validate_identity()?;

        let listing = self.collab.listings.get_listing(&request.listing_id)?;
        let now = self.collab.clock.now();
        let quote = pricing::quote(
            &listing,
            request.start_date,
            request.end_date,
            now,
            &self.config,
        )?;

        self.availability.ensure_available(
            &listing.id,
            quote.start_date,
            quote.end_date,
            now,
            None,
        )?;

        let reservation = Reservation {
            id: Uuid::new_v4(),
            listing_id: listing.id.clone(),
            owner_id: listing.owner.clone(),
            creator_id: request.requester.clone(),
            start_date: quote.start_date,
            end_date: quote.end_date,
            rent_period: listing.rent_period,
            commission: listing.commission,
            unit_price: listing.unit_price,
            total_price: quote.total_price,
            expire: quote.expire,
            status: ReservationStatus::Pending,
            renter: request.renter.clone(),
            created_at: now,
        };
        let payment = Payment::new(
            reservation.id,
            quote.first_payment_amount,
            quote.first_payment_gross,
            quote.billing_start,
            quote.billing_end,
            quote.expire,
            true,
            now,
        );

        let receipt = BookingReceipt {
            reservation_id: reservation.id,
            payment_id: payment.id,
            price: quote.total_price,
            first_charge: payment.amount,
            start_date: reservation.start_date,
            end_date: reservation.end_date,
            expire: reservation.expire,
            status: reservation.status,
        };

        self.collab
            .reservations
            .create_with_first_payment(reservation, payment, now)?;

        info!(
            reservation = %receipt.reservation_id,
            listing = %listing.id,
            renter = %request.requester,
            start = %receipt.start_date,
            end = %receipt.end_date,
            price = %receipt.price,
            "reservation created"
        );
        Ok(receipt)
    }

    /// Renter cancels a Pending or Paid reservation
    ///
    /// A Paid reservation whose first payment was collected is refunded
    /// through the processor before the status flips.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the reservation does not exist or belongs to someone else
    /// - `InvalidTransition` if it is already Accepted, Rejected or Cancelled
    /// - `Conflict` if the payment deadline of a Pending reservation passed,
    ///   or the first payment is confirmed but its charge is not known yet
    /// - `Conflict` if another action on the reservation is in progress, or
    ///   its first payment was confirmed while cancelling
    /// - the processor error if the refund failed (status unchanged)
    pub fn cancel(
        &self,
        id: ReservationId,
        requester: &str,
    ) -> Result<CancelOutcome, BookingError> {
        self.exclusive(id, || self.cancel_locked(id, requester))
    }

    fn cancel_locked(
        &self,
        id: ReservationId,
        requester: &str,
    ) -> Result<CancelOutcome, BookingError> {
        let reservation = self.collab.reservations.get_reservation(id)?;
        if reservation.creator_id != requester {
            return Err(BookingError::not_found("reservation", id));
        }

        if !reservation
            .status
            .can_transition_to(ReservationStatus::Cancelled)
        {
            return Err(BookingError::invalid_transition(
                "reservation",
                reservation.status,
                ReservationStatus::Cancelled,
            ));
        }
        if reservation.is_expired(self.collab.clock.now()) {
            return Err(BookingError::conflict(
                "you can't cancel reservation because it's expired",
            ));
        }

        let refunded = if reservation.status == ReservationStatus::Paid {
            self.refund_first_payment(&reservation)?
        } else {
            false
        };

        // A Pending hold can still be promoted by its payment confirmation
        self.collab.reservations.update_reservation(id, &mut |r| {
            if r.status != reservation.status {
                return Err(BookingError::conflict(
                    "reservation changed while cancelling, try again",
                ));
            }
            r.transition(ReservationStatus::Cancelled)
        })?;

        info!(reservation = %id, refunded, "reservation cancelled");
        Ok(CancelOutcome {
            reservation_id: id,
            cancelled: true,
            refunded,
        })
    }

    /// Owner accepts a Paid reservation
    ///
    /// For monthly rentals this generates one Pending installment per
    /// remaining billing month, then credits the owner for the first payment.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the reservation does not exist or the requester is not the owner
    /// - `Conflict` if it was already accepted or rejected, or the first
    ///   payment has not completed
    /// - `InvalidTransition` for any other non-Paid status
    /// - `Conflict` if another action on the reservation is in progress
    /// - storage or ledger errors, after rolling back
    pub fn accept(
        &self,
        id: ReservationId,
        requester: &str,
    ) -> Result<AcceptOutcome, BookingError> {
        self.exclusive(id, || self.accept_locked(id, requester))
    }

    fn accept_locked(
        &self,
        id: ReservationId,
        requester: &str,
    ) -> Result<AcceptOutcome, BookingError> {
        let reservation = self.collab.reservations.get_reservation(id)?;
        if reservation.owner_id != requester {
            return Err(BookingError::not_found("reservation", id));
        }

        match reservation.status {
            ReservationStatus::Paid => {}
            ReservationStatus::Accepted | ReservationStatus::Rejected => {
                return Err(BookingError::conflict(
                    "reservation already accepted or rejected",
                ));
            }
            other => {
                return Err(BookingError::invalid_transition(
                    "reservation",
                    other,
                    ReservationStatus::Accepted,
                ));
            }
        }

        let first = self.collab.payments.first_payment(id)?;
        if first.status != PaymentStatus::Completed || first.refund_ref.is_some() {
            return Err(BookingError::conflict(format!(
                "first payment must be completed before accepting, it is {}",
                first.status
            )));
        }

        self.collab.reservations.update_reservation(id, &mut |r| {
            if matches!(
                r.status,
                ReservationStatus::Accepted | ReservationStatus::Rejected
            ) {
                return Err(BookingError::conflict(
                    "reservation already accepted or rejected",
                ));
            }
            r.transition(ReservationStatus::Accepted)
        })?;

        let installments = match self.generate_installments(&reservation, &first) {
            Ok(count) => count,
            Err(e) => {
                self.rollback_accept(id, &e);
                return Err(e);
            }
        };

        let credited =
            match self
                .settlement
                .settle(&reservation.owner_id, &first, reservation.commission)
            {
                Ok(amount) => amount,
                Err(e) => {
                    self.rollback_accept(id, &e);
                    return Err(e);
                }
            };

        info!(reservation = %id, installments, %credited, "reservation accepted");
        Ok(AcceptOutcome {
            reservation_id: id,
            status: ReservationStatus::Accepted,
            installments,
            credited,
            message: ACCEPTED_MESSAGE.to_string(),
        })
    }

    /// Owner rejects a Paid reservation; the first payment is refunded
    ///
    /// # Errors
    ///
    /// - `NotFound` if the reservation does not exist or the requester is not the owner
    /// - `InvalidTransition` unless the reservation is Paid
    /// - `Conflict` if another action on the reservation is in progress
    /// - the processor error if the refund failed (status unchanged)
    pub fn reject(
        &self,
        id: ReservationId,
        requester: &str,
    ) -> Result<RejectOutcome, BookingError> {
        self.exclusive(id, || self.reject_locked(id, requester))
    }

    fn reject_locked(
        &self,
        id: ReservationId,
        requester: &str,
    ) -> Result<RejectOutcome, BookingError> {
        let reservation = self.collab.reservations.get_reservation(id)?;
        if reservation.owner_id != requester {
            return Err(BookingError::not_found("reservation", id));
        }
        if reservation.status != ReservationStatus::Paid {
            return Err(BookingError::invalid_transition(
                "reservation",
                reservation.status,
                ReservationStatus::Rejected,
            ));
        }

        let refunded = self.refund_first_payment(&reservation)?;
        let updated = self
            .collab
            .reservations
            .update_reservation(id, &mut |r| r.transition(ReservationStatus::Rejected))?;

        info!(reservation = %id, refunded, "reservation rejected");
        Ok(RejectOutcome {
            reservation_id: id,
            status: updated.status,
            refunded,
        })
    }

    /// Flip a Pending reservation to Paid after its first payment succeeded
    ///
    /// Returns `true` if the status changed. A reservation that is already
    /// Paid or Accepted is left alone. A late payment on an expired
    /// reservation is honored only if no other active reservation took the
    /// window in the meantime; otherwise the hold is cancelled. A payment
    /// confirmed for a closed reservation is refunded.
    pub fn promote_to_paid(&self, id: ReservationId) -> Result<bool, BookingError> {
        let reservation = self.collab.reservations.get_reservation(id)?;
        let now = self.collab.clock.now();

        match reservation.status {
            ReservationStatus::Pending => {}
            ReservationStatus::Paid | ReservationStatus::Accepted => return Ok(false),
            ReservationStatus::Cancelled | ReservationStatus::Rejected => {
                warn!(
                    reservation = %id,
                    status = %reservation.status,
                    "first payment confirmed for a closed reservation"
                );
                self.refund_if_closed(id)?;
                return Ok(false);
            }
        }

        if reservation.is_expired(now)
            && self.collab.reservations.find_overlapping(
                &reservation.listing_id,
                reservation.start_date,
                reservation.end_date,
                now,
                Some(id),
            )?
        {
            warn!(
                reservation = %id,
                "late payment on an expired reservation whose dates were taken"
            );
            self.collab.reservations.update_reservation(id, &mut |r| {
                if r.status == ReservationStatus::Pending {
                    r.transition(ReservationStatus::Cancelled)?;
                }
                Ok(())
            })?;
            self.refund_if_closed(id)?;
            return Ok(false);
        }

        let mut moved = false;
        self.collab.reservations.update_reservation(id, &mut |r| {
            if r.status == ReservationStatus::Pending {
                r.transition(ReservationStatus::Paid)?;
                moved = true;
            }
            Ok(())
        })?;

        if moved {
            info!(reservation = %id, "reservation paid");
        }
        Ok(moved)
    }

    /// Refund the first payment of a cancelled or rejected reservation
    ///
    /// Returns `true` if a refund was issued by this call. A payment whose
    /// charge reference is not known yet is left for the charge confirmation
    /// to pick up.
    ///
    /// # Errors
    ///
    /// - `Conflict` if another action on the reservation is in progress
    /// - the processor error if the refund failed
    pub fn refund_if_closed(&self, id: ReservationId) -> Result<bool, BookingError> {
        self.exclusive(id, || {
            let reservation = self.collab.reservations.get_reservation(id)?;
            if !matches!(
                reservation.status,
                ReservationStatus::Cancelled | ReservationStatus::Rejected
            ) {
                return Ok(false);
            }

            let first = self.collab.payments.first_payment(id)?;
            if !first.status.is_collected() || first.refund_ref.is_some() {
                return Ok(false);
            }
            if first.charge_ref.is_none() {
                info!(
                    reservation = %id,
                    payment = %first.id,
                    "refund waits for the charge confirmation"
                );
                return Ok(false);
            }
            self.refund_first_payment(&reservation)
        })
    }

    /// Run `action` while holding the reservation's action lock
    fn exclusive<T>(
        &self,
        id: ReservationId,
        action: impl FnOnce() -> Result<T, BookingError>,
    ) -> Result<T, BookingError> {
        let lock = self
            .action_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!(reservation = %id, "reservation busy");
                return Err(BookingError::conflict(
                    "reservation is being updated, try again later",
                ));
            }
            Err(TryLockError::Poisoned(_)) => {
                return Err(BookingError::storage(
                    "reservation_action",
                    "reservation lock poisoned",
                ));
            }
        };
        action()
    }

    /// Refund a collected first payment
    ///
    /// Returns `true` if a refund was issued by this call.
    fn refund_first_payment(&self, reservation: &Reservation) -> Result<bool, BookingError> {
        let payment = self.collab.payments.first_payment(reservation.id)?;
        if !payment.status.is_collected() || payment.refund_ref.is_some() {
            return Ok(false);
        }

        let charge_ref = payment.charge_ref.clone().ok_or_else(|| {
            BookingError::conflict("first payment is still settling, try again later")
        })?;

        let refund_ref = self
            .collab
            .processor
            .refund_charge(&charge_ref)
            .map_err(|e| {
                error!(reservation = %reservation.id, payment = %payment.id, error = %e, "refund failed");
                e
            })?;

        self.collab.payments.update_payment(payment.id, &mut |p| {
            p.refund_ref = Some(refund_ref.clone());
            p.transition(PaymentStatus::Refunded)?;
            Ok(())
        })?;

        info!(
            reservation = %reservation.id,
            payment = %payment.id,
            refund = %refund_ref,
            "first payment refunded"
        );
        Ok(true)
    }

    /// Create the installment payments of a monthly reservation
    fn generate_installments(
        &self,
        reservation: &Reservation,
        first: &Payment,
    ) -> Result<usize, BookingError> {
        if reservation.rent_period != RentPeriod::Monthly {
            return Ok(0);
        }

        let windows = installment_windows(first.start_date, reservation.end_date, &self.config)?;
        let gross = round_money(reservation.unit_price);
        let amount = charge_amount(gross, reservation.commission, &self.config)?;
        let now = self.collab.clock.now();

        for window in &windows {
            let installment = Payment::new(
                reservation.id,
                amount,
                gross,
                window.start_date,
                window.end_date,
                window.expire,
                false,
                now,
            );
            debug!(
                reservation = %reservation.id,
                payment = %installment.id,
                start = %window.start_date,
                "installment created"
            );
            self.collab.payments.create_payment(installment)?;
        }

        Ok(windows.len())
    }

    /// Undo a partially applied accept
    fn rollback_accept(&self, id: ReservationId, cause: &BookingError) {
        warn!(reservation = %id, error = %cause, "accept failed, rolling back");

        match self.collab.payments.delete_payments(id, true) {
            Ok(deleted) => debug!(reservation = %id, deleted, "installments removed"),
            Err(e) => error!(reservation = %id, error = %e, "could not remove installments"),
        }

        // Accepted has no forward edge back to Paid. The action lock is held,
        // so no other user action can interleave with this write.
        let restored = self
            .collab
            .reservations
            .get_reservation(id)
            .and_then(|mut reservation| {
                if reservation.status != ReservationStatus::Accepted {
                    return Ok(());
                }
                reservation.status = ReservationStatus::Paid;
                self.collab.reservations.save_reservation(reservation)
            });
        if let Err(e) = restored {
            error!(reservation = %id, error = %e, "could not restore reservation status");
        }
    }
}
