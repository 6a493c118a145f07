//! Thread-safe in-memory storage
//!
//! `MemoryStore` implements the listing, reservation and payment repositories
//! on top of `DashMap`, which shards its locks so unrelated records can be
//! read and written concurrently.
//!
//! # Consistency
//!
//! - Reservation creation takes a per-listing mutex, re-checks overlap and
//!   inserts the reservation and its first payment before releasing it. Two
//!   concurrent bookings of the same window cannot both succeed.
//! - `update_*` runs the closure on a copy while holding the record's shard
//!   lock and commits only on success.
//! - Processor references are claimed in unique indexes; a reference already
//!   owned by another payment is a conflict.
//!
//! Update closures must not call back into the same map.

use super::availability::blocks;
use super::traits::{
    ListingRepository, PaymentRepository, PaymentUpdate, ReservationRepository,
    ReservationUpdate,
};
use crate::types::{
    BookingError, Listing, ListingId, Payment, PaymentId, Reservation, ReservationId,
};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// In-memory repositories
#[derive(Debug, Default)]
pub struct MemoryStore {
    listings: DashMap<ListingId, Listing>,
    reservations: DashMap<ReservationId, Reservation>,
    payments: DashMap<PaymentId, Payment>,
    intent_index: DashMap<String, PaymentId>,
    charge_index: DashMap<String, PaymentId>,
    refund_index: DashMap<String, PaymentId>,
    listing_locks: DashMap<ListingId, Arc<Mutex<()>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a listing
    pub fn insert_listing(&self, listing: Listing) {
        self.listings.insert(listing.id.clone(), listing);
    }

    /// Snapshot of every reservation, ordered by listing then start date
    pub fn all_reservations(&self) -> Vec<Reservation> {
        let mut all: Vec<Reservation> = self
            .reservations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| {
            (&a.listing_id, a.start_date, a.created_at).cmp(&(&b.listing_id, b.start_date, b.created_at))
        });
        all
    }

    /// Snapshot of every payment, ordered by reservation then billing window
    pub fn all_payments(&self) -> Vec<Payment> {
        let mut all: Vec<Payment> = self
            .payments
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|p| (p.reservation_id, p.start_date));
        all
    }

    fn listing_lock(&self, listing: &str) -> Arc<Mutex<()>> {
        self.listing_locks
            .entry(listing.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Claim every processor reference of `payment` in the unique indexes
    fn claim_references(&self, payment: &Payment) -> Result<(), BookingError> {
        claim(&self.intent_index, &payment.intent_ref, payment.id, "intent")?;
        claim(&self.charge_index, &payment.charge_ref, payment.id, "charge")?;
        claim(&self.refund_index, &payment.refund_ref, payment.id, "refund")?;
        Ok(())
    }

    fn release_references(&self, payment: &Payment) {
        for (index, reference) in [
            (&self.intent_index, &payment.intent_ref),
            (&self.charge_index, &payment.charge_ref),
            (&self.refund_index, &payment.refund_ref),
        ] {
            if let Some(reference) = reference {
                index.remove_if(reference, |_, owner| *owner == payment.id);
            }
        }
    }

    fn resolve(
        &self,
        index: &DashMap<String, PaymentId>,
        reference: &str,
    ) -> Option<Payment> {
        let id = index.get(reference).map(|entry| *entry.value())?;
        self.payments.get(&id).map(|entry| entry.value().clone())
    }
}

fn claim(
    index: &DashMap<String, PaymentId>,
    reference: &Option<String>,
    payment: PaymentId,
    kind: &str,
) -> Result<(), BookingError> {
    if let Some(reference) = reference {
        let owner = *index.entry(reference.clone()).or_insert(payment);
        if owner != payment {
            return Err(BookingError::conflict(format!(
                "{} reference {} already belongs to payment {}",
                kind, reference, owner
            )));
        }
    }
    Ok(())
}

impl ListingRepository for MemoryStore {
    fn get_listing(&self, id: &str) -> Result<Listing, BookingError> {
        self.listings
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BookingError::not_found("listing", id))
    }
}

impl ReservationRepository for MemoryStore {
    fn create_with_first_payment(
        &self,
        reservation: Reservation,
        payment: Payment,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if !payment.is_first_payment || payment.reservation_id != reservation.id {
            return Err(BookingError::validation(
                "first payment must belong to the new reservation",
            ));
        }

        let lock = self.listing_lock(&reservation.listing_id);
        let _guard = lock
            .lock()
            .map_err(|_| BookingError::storage("create_reservation", "listing lock poisoned"))?;

        let taken = self.reservations.iter().any(|entry| {
            let other = entry.value();
            other.listing_id == reservation.listing_id
                && blocks(other, reservation.start_date, reservation.end_date, now)
        });
        if taken {
            return Err(BookingError::conflict(
                "rental house is not available in the given date range",
            ));
        }

        if self.reservations.contains_key(&reservation.id) || self.payments.contains_key(&payment.id)
        {
            return Err(BookingError::conflict("identifier already in use"));
        }

        self.claim_references(&payment)?;
        debug!(reservation = %reservation.id, payment = %payment.id, "reservation stored");
        self.payments.insert(payment.id, payment);
        self.reservations.insert(reservation.id, reservation);
        Ok(())
    }

    fn get_reservation(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        self.reservations
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BookingError::not_found("reservation", id))
    }

    fn save_reservation(&self, reservation: Reservation) -> Result<(), BookingError> {
        if !self.reservations.contains_key(&reservation.id) {
            return Err(BookingError::not_found("reservation", reservation.id));
        }
        self.reservations.insert(reservation.id, reservation);
        Ok(())
    }

    fn update_reservation(
        &self,
        id: ReservationId,
        f: ReservationUpdate<'_>,
    ) -> Result<Reservation, BookingError> {
        let mut entry = self
            .reservations
            .get_mut(&id)
            .ok_or_else(|| BookingError::not_found("reservation", id))?;

        let mut updated = entry.value().clone();
        f(&mut updated)?;
        *entry.value_mut() = updated.clone();
        Ok(updated)
    }

    fn find_overlapping(
        &self,
        listing: &str,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
        exclude: Option<ReservationId>,
    ) -> Result<bool, BookingError> {
        Ok(self.reservations.iter().any(|entry| {
            let other = entry.value();
            other.listing_id == listing
                && Some(other.id) != exclude
                && blocks(other, start, end, now)
        }))
    }

    fn reservations_for_listing(&self, listing: &str) -> Result<Vec<Reservation>, BookingError> {
        let mut found: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|entry| entry.value().listing_id == listing)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|r| (r.start_date, r.created_at));
        Ok(found)
    }

    fn reservations_for_creator(&self, creator: &str) -> Result<Vec<Reservation>, BookingError> {
        let mut found: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|entry| entry.value().creator_id == creator)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|r| (r.start_date, r.created_at));
        Ok(found)
    }
}

impl PaymentRepository for MemoryStore {
    fn create_payment(&self, payment: Payment) -> Result<(), BookingError> {
        if payment.is_first_payment {
            return Err(BookingError::validation(
                "first payments are created with their reservation",
            ));
        }
        if !self.reservations.contains_key(&payment.reservation_id) {
            return Err(BookingError::not_found("reservation", payment.reservation_id));
        }
        if self.payments.contains_key(&payment.id) {
            return Err(BookingError::conflict("identifier already in use"));
        }

        self.claim_references(&payment)?;
        self.payments.insert(payment.id, payment);
        Ok(())
    }

    fn get_payment(&self, id: PaymentId) -> Result<Payment, BookingError> {
        self.payments
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BookingError::not_found("payment", id))
    }

    fn save_payment(&self, payment: Payment) -> Result<(), BookingError> {
        if !self.payments.contains_key(&payment.id) {
            return Err(BookingError::not_found("payment", payment.id));
        }
        self.claim_references(&payment)?;
        self.payments.insert(payment.id, payment);
        Ok(())
    }

    fn update_payment(&self, id: PaymentId, f: PaymentUpdate<'_>) -> Result<Payment, BookingError> {
        let mut entry = self
            .payments
            .get_mut(&id)
            .ok_or_else(|| BookingError::not_found("payment", id))?;

        let mut updated = entry.value().clone();
        f(&mut updated)?;
        self.claim_references(&updated)?;
        *entry.value_mut() = updated.clone();
        Ok(updated)
    }

    fn find_by_intent_ref(&self, intent_ref: &str) -> Result<Option<Payment>, BookingError> {
        Ok(self.resolve(&self.intent_index, intent_ref))
    }

    fn find_by_charge_ref(&self, charge_ref: &str) -> Result<Option<Payment>, BookingError> {
        Ok(self.resolve(&self.charge_index, charge_ref))
    }

    fn first_payment(&self, reservation: ReservationId) -> Result<Payment, BookingError> {
        self.payments
            .iter()
            .find(|entry| {
                let payment = entry.value();
                payment.reservation_id == reservation && payment.is_first_payment
            })
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BookingError::not_found("first payment of reservation", reservation))
    }

    fn payments_for_reservation(
        &self,
        reservation: ReservationId,
    ) -> Result<Vec<Payment>, BookingError> {
        let mut found: Vec<Payment> = self
            .payments
            .iter()
            .filter(|entry| entry.value().reservation_id == reservation)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|p| (p.start_date, !p.is_first_payment));
        Ok(found)
    }

    fn delete_payments(
        &self,
        reservation: ReservationId,
        exclude_first: bool,
    ) -> Result<usize, BookingError> {
        let doomed: Vec<PaymentId> = self
            .payments
            .iter()
            .filter(|entry| {
                let payment = entry.value();
                payment.reservation_id == reservation && !(exclude_first && payment.is_first_payment)
            })
            .map(|entry| *entry.key())
            .collect();

        let mut deleted = 0;
        for id in doomed {
            if let Some((_, payment)) = self.payments.remove(&id) {
                self.release_references(&payment);
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
