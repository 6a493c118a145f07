//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `listing`: Listing terms, rent periods and commission policies
//! - `reservation`: Reservations and their status machine
//! - `payment`: Payments, their status machine and checkout sessions
//! - `account`: Owner balances credited by settlement
//! - `booking`: Requests and outcomes of booking operations
//! - `command`: Replay command records
//! - `config`: Engine configuration
//! - `error`: Error types for the booking engine

pub mod account;
pub mod booking;
pub mod command;
pub mod config;
pub mod error;
pub mod listing;
pub mod payment;
pub mod reservation;

pub use account::OwnerBalance;
pub use booking::{AcceptOutcome, BookingReceipt, BookingRequest, CancelOutcome, RejectOutcome};
pub use command::{CommandKind, CommandRecord};
pub use config::EngineConfig;
pub use error::{BookingError, ErrorKind};
pub use listing::{CommissionPolicy, Listing, ListingId, RentPeriod, UserId};
pub use payment::{Payment, PaymentId, PaymentSession, PaymentStatus};
pub use reservation::{Renter, Reservation, ReservationId, ReservationStatus};
