//! Core business logic module
//!
//! This module contains the reservation and payment lifecycle:
//! - `traits` - Collaborator contracts (repositories, ledger, processor, clock)
//! - `pricing` - Pure price, window and deadline computation
//! - `availability` - Overlap checks against active reservations
//! - `reservation_machine` - Reservation status transitions
//! - `payment_machine` - Payment status transitions driven by the processor
//! - `ledger` - Owner settlement
//! - `webhook` - Signed processor event ingestion
//! - `engine` - Facade over all of the above
//! - `store`, `processor`, `clock` - In-memory collaborators
//! - `replay`, `batch_processor` - Command log replay

pub mod availability;
pub mod batch_processor;
pub mod clock;
pub mod engine;
pub mod ledger;
pub mod payment_machine;
pub mod pricing;
pub mod processor;
pub mod replay;
pub mod reservation_machine;
pub mod store;
pub mod traits;
pub mod webhook;

pub use availability::AvailabilityChecker;
pub use batch_processor::{BatchProcessor, ProcessingResult};
pub use clock::{ManualClock, SystemClock};
pub use engine::{BookingEngine, InMemoryBackend};
pub use ledger::{MemoryLedger, SettlementLedger};
pub use payment_machine::{PaymentMachine, TransitionOutcome};
pub use processor::SimulatedProcessor;
pub use replay::{ReplayContext, ReplayReport, Replayer};
pub use reservation_machine::ReservationMachine;
pub use store::MemoryStore;
pub use traits::{
    BalanceLedger, ChargeIntent, Clock, Collaborators, IntentStatus, ListingRepository,
    PaymentProcessor, PaymentRepository, ReservationRepository,
};
pub use webhook::{sign_payload, ProcessorEvent, WebhookAck, WebhookIngestor};
