//! Command replay
//!
//! Drives the booking engine from a log of timestamped commands so the full
//! lifecycle can be exercised without a web layer.
//!
//! ```text
//! ReplayContext (shared)
//!     ├── InMemoryBackend   (store, ledger, simulated processor)
//!     ├── aliases           (caller alias -> reservation id)
//!     └── EngineConfig
//!
//! Replayer (one per partition)
//!     ├── ManualClock       (set to each command's timestamp)
//!     └── BookingEngine     (over the shared backend)
//! ```
//!
//! Webhook commands are turned into processor events: the simulated
//! processor settles the intent, the event payload is signed with the
//! configured secret and fed through webhook ingestion like a real delivery.

use super::clock::ManualClock;
use super::engine::{BookingEngine, InMemoryBackend};
use super::traits::{BalanceLedger, PaymentRepository, ReservationRepository};
use super::webhook::{sign_payload, EventKind, ProcessorEvent};
use crate::io::csv_format::{format_money, PaymentRow, ReservationRow};
use crate::types::{
    BookingError, BookingRequest, CommandKind, CommandRecord, EngineConfig, Listing,
    OwnerBalance, Payment, Renter, ReservationId,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// Final state after a replay
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    pub balances: Vec<OwnerBalance>,
    pub reservations: Vec<ReservationRow>,
    pub payments: Vec<PaymentRow>,
}

/// State shared by every replayer of one run
#[derive(Debug)]
pub struct ReplayContext {
    backend: InMemoryBackend,
    config: Arc<EngineConfig>,
    aliases: DashMap<String, ReservationId>,
    latest: Mutex<DateTime<Utc>>,
}

impl ReplayContext {
    /// Create an empty context
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Validation` if the configuration is unusable.
    pub fn new(config: EngineConfig) -> Result<Self, BookingError> {
        config.validate()?;
        Ok(Self {
            backend: InMemoryBackend::new(),
            config: Arc::new(config),
            aliases: DashMap::new(),
            latest: Mutex::new(DateTime::<Utc>::default()),
        })
    }

    pub fn backend(&self) -> &InMemoryBackend {
        &self.backend
    }

    /// Register listings; returns how many were loaded
    pub fn load_listings(&self, listings: Vec<Listing>) -> usize {
        let count = listings.len();
        for listing in listings {
            self.backend.store.insert_listing(listing);
        }
        count
    }

    /// A replayer with its own clock over the shared backend
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Validation` if the configuration is unusable.
    pub fn replayer(self: &Arc<Self>) -> Result<Replayer, BookingError> {
        let clock = Arc::new(ManualClock::new(self.latest()));
        let engine = BookingEngine::new(
            self.backend.collaborators(clock.clone()),
            Arc::clone(&self.config),
        )?;

        Ok(Replayer {
            context: Arc::clone(self),
            clock,
            engine,
        })
    }

    /// Reservation id behind a caller alias
    ///
    /// # Errors
    ///
    /// Returns `BookingError::NotFound` for an unknown alias.
    pub fn reservation_id(&self, alias: &str) -> Result<ReservationId, BookingError> {
        self.aliases
            .get(alias)
            .map(|entry| *entry.value())
            .ok_or_else(|| BookingError::not_found("reservation alias", alias))
    }

    fn latest(&self) -> DateTime<Utc> {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(&self, at: DateTime<Utc>) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if at > *latest {
            *latest = at;
        }
    }

    /// Snapshot balances, reservations and payments
    ///
    /// Reservation labels are computed at the latest command timestamp seen.
    pub fn report(&self) -> Result<ReplayReport, BookingError> {
        let now = self.latest();
        let store = &self.backend.store;

        let mut aliases: Vec<(String, ReservationId)> = self
            .aliases
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        aliases.sort();

        let mut report = ReplayReport {
            balances: self.backend.ledger.balances()?,
            ..ReplayReport::default()
        };

        for (alias, id) in aliases {
            let reservation = store.get_reservation(id)?;
            report.reservations.push(ReservationRow {
                reservation: alias.clone(),
                id: reservation.id.to_string(),
                listing: reservation.listing_id.clone(),
                renter: reservation.creator_id.clone(),
                period: reservation.rent_period.to_string(),
                start: reservation.start_date.to_string(),
                end: reservation.end_date.to_string(),
                total_price: format_money(reservation.total_price),
                status: reservation.status_label(now),
            });

            for (installment, payment) in store.payments_for_reservation(id)?.into_iter().enumerate() {
                report.payments.push(PaymentRow {
                    reservation: alias.clone(),
                    installment,
                    id: payment.id.to_string(),
                    start: payment.start_date.to_string(),
                    end: payment.end_date.to_string(),
                    amount: format_money(payment.amount),
                    amount_gross: format_money(payment.amount_gross),
                    status: payment.status.to_string(),
                    first: payment.is_first_payment,
                });
            }
        }

        Ok(report)
    }
}

/// Applies commands against the shared backend with a private clock
pub struct Replayer {
    context: Arc<ReplayContext>,
    clock: Arc<ManualClock>,
    engine: BookingEngine,
}

impl Replayer {
    pub fn engine(&self) -> &BookingEngine {
        &self.engine
    }

    /// Run one command at its own timestamp
    ///
    /// # Errors
    ///
    /// Returns whatever the engine returned for the command, or
    /// `BookingError::NotFound` for an unknown alias or installment.
    pub fn apply(&self, command: &CommandRecord) -> Result<(), BookingError> {
        self.clock.set(command.at);
        self.context.observe(command.at);

        match command.kind {
            CommandKind::Book => self.book(command),
            CommandKind::Pay => {
                let payment = self.payment(command)?;
                let session = self.engine.begin_payment(payment.id, &command.user)?;
                debug!(alias = %command.reservation, intent = %session.intent_ref, "checkout ready");
                Ok(())
            }
            CommandKind::Webhook => self.deliver(command),
            CommandKind::Accept => {
                let id = self.context.reservation_id(&command.reservation)?;
                self.engine.accept_reservation(id, &command.user).map(|_| ())
            }
            CommandKind::Reject => {
                let id = self.context.reservation_id(&command.reservation)?;
                self.engine.reject_reservation(id, &command.user).map(|_| ())
            }
            CommandKind::Cancel => {
                let id = self.context.reservation_id(&command.reservation)?;
                self.engine.cancel_reservation(id, &command.user).map(|_| ())
            }
        }
    }

    fn book(&self, command: &CommandRecord) -> Result<(), BookingError> {
        if self.context.aliases.contains_key(&command.reservation) {
            return Err(BookingError::conflict(format!(
                "reservation alias '{}' is already used",
                command.reservation
            )));
        }
        let (Some(start_date), Some(end_date)) = (command.start, command.end) else {
            return Err(BookingError::validation("book requires start and end"));
        };

        let request = BookingRequest {
            listing_id: command.listing.clone(),
            requester: command.user.clone(),
            start_date,
            end_date,
            renter: Renter {
                full_name: command.user.clone(),
                identity_number: command.identity.clone().unwrap_or_default(),
                ..Renter::default()
            },
        };

        let receipt = self.engine.create_reservation(&request)?;
        self.context
            .aliases
            .insert(command.reservation.clone(), receipt.reservation_id);
        Ok(())
    }

    fn payment(&self, command: &CommandRecord) -> Result<Payment, BookingError> {
        let id = self.context.reservation_id(&command.reservation)?;
        self.engine
            .payments_for_reservation(id)?
            .into_iter()
            .nth(command.installment)
            .ok_or_else(|| {
                BookingError::not_found(
                    "installment",
                    format!("{}#{}", command.reservation, command.installment),
                )
            })
    }

    fn deliver(&self, command: &CommandRecord) -> Result<(), BookingError> {
        let event_type = command
            .event
            .as_deref()
            .ok_or_else(|| BookingError::validation("webhook requires an event type"))?;
        let payment = self.payment(command)?;
        let intent_ref = payment.intent_ref.clone().ok_or_else(|| {
            BookingError::conflict(format!("payment {} has no checkout yet", payment.id))
        })?;

        let processor = &self.context.backend.processor;
        let event_id = format!("evt_{}", Uuid::new_v4().simple());
        let event = match EventKind::classify(event_type) {
            EventKind::IntentSucceeded => {
                processor.settle_intent(&intent_ref)?;
                ProcessorEvent::intent(event_id, event_type, &intent_ref)
            }
            EventKind::ChargeSucceeded | EventKind::ChargeRefunded => {
                let charge_ref = processor.settle_intent(&intent_ref)?;
                ProcessorEvent::charge(event_id, event_type, &charge_ref, &intent_ref)
            }
            EventKind::ChargeFailed => {
                let charge_ref = format!("ch_failed_{}", payment.id.simple());
                ProcessorEvent::charge(event_id, event_type, &charge_ref, &intent_ref)
            }
            _ => ProcessorEvent::intent(event_id, event_type, &intent_ref),
        };

        let payload = event.to_payload()?;
        let header = sign_payload(
            &self.context.config.webhook_secret,
            command.at.timestamp(),
            &payload,
        )?;
        let ack = self.engine.handle_processor_webhook(&payload, &header)?;
        debug!(alias = %command.reservation, event = %ack.event_id, outcome = %ack.outcome, "event delivered");
        Ok(())
    }
}
