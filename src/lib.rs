//! Rental Booking Engine Library
//! # Overview
//!
//! This library implements the reservation and payment lifecycle of a
//! rental-housing marketplace: pricing a booking request, holding the dates,
//! collecting the first payment through an external processor, generating
//! monthly installments on acceptance, settling owners and refunding on
//! cancellation.
//!
//! # Architecture
//!
//! - [`types`] - Domain types (Listing, Reservation, Payment, errors, config)
//! - [`core`] - Business logic components:
//!   - [`core::pricing`] - Price, billing window and payment deadline
//!   - [`core::availability`] - Overlap checks against active reservations
//!   - [`core::reservation_machine`] - Reservation status transitions
//!   - [`core::payment_machine`] - Payment status transitions
//!   - [`core::ledger`] - Owner settlement
//!   - [`core::webhook`] - Signed processor event ingestion
//!   - [`core::engine`] - The [`BookingEngine`] facade
//! - [`io`] - CSV input and reports for the replay driver
//! - [`strategy`] - Sync and async replay pipelines
//! - [`cli`] - CLI arguments parsing
//!
//! # Reservation States
//!
//! - **Pending**: dates held until the first payment deadline
//! - **Paid**: first payment confirmed by the processor
//! - **Accepted**: owner accepted; installments generated, owner credited
//! - **Rejected** / **Cancelled**: terminal; a collected first payment is refunded
//!
//! # Payment States
//!
//! - **Pending** → **Succeeded** (intent confirmed) → **Completed** (charge settled)
//! - **Failed**, **Cancelled** and **Refunded** are terminal

pub mod cli;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use core::{BookingEngine, InMemoryBackend, ManualClock, TransitionOutcome};
pub use io::write_balances_csv;
pub use types::{
    BookingError, BookingReceipt, BookingRequest, CommissionPolicy, EngineConfig, Listing,
    Payment, PaymentStatus, RentPeriod, Renter, Reservation, ReservationStatus,
};
