//! Booking engine
//!
//! This module provides the `BookingEngine` facade that callers (controllers,
//! the replay driver, tests) use. It wires the reservation and payment state
//! machines and webhook ingestion to one set of collaborators.
//!
//! The engine enforces the marketplace rules:
//! - only the renter who booked may cancel, pay or fetch receipts
//! - only the listing owner may accept, reject or list a listing's bookings
//! - every status change goes through the state machines

use super::clock::SystemClock;
use super::ledger::MemoryLedger;
use super::payment_machine::PaymentMachine;
use super::processor::SimulatedProcessor;
use super::reservation_machine::ReservationMachine;
use super::store::MemoryStore;
use super::traits::{Clock, Collaborators};
use super::webhook::{WebhookAck, WebhookIngestor};
use crate::types::{
    AcceptOutcome, BookingError, BookingReceipt, BookingRequest, CancelOutcome, EngineConfig,
    Payment, PaymentId, PaymentSession, RejectOutcome, Reservation, ReservationId,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Entry point of the reservation and payment lifecycle
///
/// Cheap to clone; clones share the same collaborators.
#[derive(Clone)]
pub struct BookingEngine {
    collab: Collaborators,
    config: Arc<EngineConfig>,
    reservations: ReservationMachine,
    payments: PaymentMachine,
    webhooks: WebhookIngestor,
}

impl BookingEngine {
    /// Create an engine over `collab`
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Validation` if the configuration is unusable.
    pub fn new(collab: Collaborators, config: Arc<EngineConfig>) -> Result<Self, BookingError> {
        config.validate()?;

        let reservations = ReservationMachine::new(collab.clone(), Arc::clone(&config));
        let payments =
            PaymentMachine::new(collab.clone(), Arc::clone(&config), reservations.clone());
        let webhooks = WebhookIngestor::new(payments.clone(), Arc::clone(&collab.clock), &config);

        Ok(Self {
            collab,
            config,
            reservations,
            payments,
            webhooks,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Book a listing; see [`ReservationMachine::create`]
    pub fn create_reservation(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingReceipt, BookingError> {
        self.reservations.create(request)
    }

    /// Renter cancels; see [`ReservationMachine::cancel`]
    pub fn cancel_reservation(
        &self,
        id: ReservationId,
        requester: &str,
    ) -> Result<CancelOutcome, BookingError> {
        self.reservations.cancel(id, requester)
    }

    /// Owner accepts; see [`ReservationMachine::accept`]
    pub fn accept_reservation(
        &self,
        id: ReservationId,
        requester: &str,
    ) -> Result<AcceptOutcome, BookingError> {
        self.reservations.accept(id, requester)
    }

    /// Owner rejects; see [`ReservationMachine::reject`]
    pub fn reject_reservation(
        &self,
        id: ReservationId,
        requester: &str,
    ) -> Result<RejectOutcome, BookingError> {
        self.reservations.reject(id, requester)
    }

    /// Ingest a signed processor event; see [`WebhookIngestor::handle`]
    pub fn handle_processor_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookAck, BookingError> {
        self.webhooks.handle(payload, signature_header)
    }

    /// Start checkout; see [`PaymentMachine::begin_payment`]
    pub fn begin_payment(
        &self,
        payment_id: PaymentId,
        requester: &str,
    ) -> Result<PaymentSession, BookingError> {
        self.payments.begin_payment(payment_id, requester)
    }

    /// Receipt URL of a completed payment
    pub fn receipt(&self, payment_id: PaymentId, requester: &str) -> Result<String, BookingError> {
        self.payments.receipt(payment_id, requester)
    }

    pub fn reservation(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        self.collab.reservations.get_reservation(id)
    }

    /// Payments of a reservation, ordered by billing window
    pub fn payments_for_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Vec<Payment>, BookingError> {
        self.collab.payments.payments_for_reservation(id)
    }

    /// Every reservation on a listing, for its owner
    ///
    /// # Errors
    ///
    /// Returns `BookingError::NotFound` if the listing does not exist or
    /// `requester` does not own it.
    pub fn reservations_for_listing(
        &self,
        listing: &str,
        requester: &str,
    ) -> Result<Vec<Reservation>, BookingError> {
        let terms = self.collab.listings.get_listing(listing)?;
        if terms.owner != requester {
            return Err(BookingError::not_found("listing", listing));
        }
        self.collab.reservations.reservations_for_listing(listing)
    }

    /// Every payment on reservations made by `user`, ordered by billing start
    pub fn payments_for_user(&self, user: &str) -> Result<Vec<Payment>, BookingError> {
        let mut payments = Vec::new();
        for reservation in self.collab.reservations.reservations_for_creator(user)? {
            payments.extend(
                self.collab
                    .payments
                    .payments_for_reservation(reservation.id)?,
            );
        }
        payments.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(payments)
    }

    /// Days of `listing` covered by active reservations
    pub fn reserved_dates(&self, listing: &str) -> Result<Vec<NaiveDate>, BookingError> {
        self.collab.listings.get_listing(listing)?;
        self.reservations
            .availability()
            .reserved_dates(listing, self.collab.clock.now())
    }

    /// Current balance of an owner
    pub fn balance(&self, owner: &str) -> Result<Decimal, BookingError> {
        self.collab.ledger.balance(owner)
    }
}

/// Process-local storage, ledger and processor
///
/// Engines built from the same backend share all state; each may bring its
/// own clock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<MemoryLedger>,
    pub processor: Arc<SimulatedProcessor>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collaborators over this backend, reading time from `clock`
    pub fn collaborators(&self, clock: Arc<dyn Clock>) -> Collaborators {
        Collaborators {
            listings: self.store.clone(),
            reservations: self.store.clone(),
            payments: self.store.clone(),
            ledger: self.ledger.clone(),
            processor: self.processor.clone(),
            clock,
        }
    }

    /// Engine over this backend using the wall clock
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Validation` if the configuration is unusable.
    pub fn engine(&self, config: EngineConfig) -> Result<BookingEngine, BookingError> {
        BookingEngine::new(self.collaborators(Arc::new(SystemClock)), Arc::new(config))
    }
}
