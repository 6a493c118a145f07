//! Replay command types
//!
//! The replay driver feeds a log of timestamped commands through the booking
//! engine. Each record names the operation and the listing it touches; the
//! listing doubles as the partition key for concurrent replay.

use super::error::BookingError;
use super::listing::{ListingId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

/// Operation named by a command row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Create a reservation
    Book,
    /// Start checkout for one of the reservation's payments
    Pay,
    /// Deliver a signed processor event
    Webhook,
    /// Owner accepts
    Accept,
    /// Owner rejects
    Reject,
    /// Renter cancels
    Cancel,
}

impl FromStr for CommandKind {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "book" => Ok(CommandKind::Book),
            "pay" => Ok(CommandKind::Pay),
            "webhook" => Ok(CommandKind::Webhook),
            "accept" => Ok(CommandKind::Accept),
            "reject" => Ok(CommandKind::Reject),
            "cancel" => Ok(CommandKind::Cancel),
            _ => Err(BookingError::validation(format!("invalid command '{}'", s))),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::Book => "book",
            CommandKind::Pay => "pay",
            CommandKind::Webhook => "webhook",
            CommandKind::Accept => "accept",
            CommandKind::Reject => "reject",
            CommandKind::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// A validated command row
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
    /// Clock value while the command runs
    pub at: DateTime<Utc>,
    pub kind: CommandKind,
    pub listing: ListingId,
    /// Caller-chosen alias of the reservation
    pub reservation: String,
    /// Acting user (renter or owner)
    pub user: UserId,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub identity: Option<String>,
    /// Processor event type (webhook rows)
    pub event: Option<String>,
    /// Installment index, 0 being the first payment (pay and webhook rows)
    pub installment: usize,
}
