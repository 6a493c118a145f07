//! Error types for the rental booking engine
//!
//! This module defines every error that can surface from booking, payment,
//! settlement and webhook processing. Errors carry enough context to be shown
//! to the caller (client errors) or logged (server errors).
//!
//! # Error Categories
//!
//! - **Client errors**: bad dates or amounts, conflicting reservations,
//!   illegal status transitions, unknown entities, bad webhook signatures
//! - **Server errors**: processor failures and timeouts, storage failures,
//!   arithmetic overflow, file I/O and CSV parsing in the replay driver

use rust_decimal::Decimal;
use thiserror::Error;

/// Which side of the boundary an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was wrong; retrying it unchanged will fail again
    Client,
    /// Something behind the engine failed; no partial state was left visible
    Server,
}

/// Main error type for the booking engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookingError {
    /// Input shape or range is invalid (dates, day counts, identity number)
    #[error("Validation error: {message}")]
    Validation {
        /// Human readable reason
        message: String,
    },

    /// The request collides with existing state (overlap, double accept)
    #[error("Conflict: {message}")]
    Conflict {
        /// Human readable reason
        message: String,
    },

    /// A status change that the state machine does not allow
    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        /// "reservation" or "payment"
        entity: &'static str,
        /// Current status name
        from: String,
        /// Requested status name
        to: String,
    },

    /// Unknown reservation, listing or payment
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The payment processor rejected or failed a call
    #[error("Payment processor error during {operation}: {message}")]
    Processor {
        /// Processor operation that failed
        operation: String,
        /// Processor supplied reason
        message: String,
    },

    /// The payment processor did not answer in time
    #[error("Payment processor timed out during {operation}")]
    ProcessorTimeout {
        /// Processor operation that timed out
        operation: String,
    },

    /// Persistent storage failed
    #[error("Storage error during {operation}: {message}")]
    Storage {
        /// Storage operation that failed
        operation: String,
        /// Underlying reason
        message: String,
    },

    /// Webhook payload signature could not be verified
    #[error("Webhook signature verification failed: {message}")]
    Signature {
        /// Why verification failed
        message: String,
    },

    /// Webhook payload is not a well formed processor event
    #[error("Malformed processor event: {message}")]
    MalformedEvent {
        /// Parse failure description
        message: String,
    },

    /// Balance arithmetic would overflow
    #[error("Arithmetic overflow crediting {amount} to owner {owner}")]
    ArithmeticOverflow {
        /// Owner whose balance was being credited
        owner: String,
        /// Amount that could not be added
        amount: Decimal,
    },

    /// I/O error in the replay driver
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error in the replay driver
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl BookingError {
    /// Classify the error for the caller
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation { .. }
            | BookingError::Conflict { .. }
            | BookingError::InvalidTransition { .. }
            | BookingError::NotFound { .. }
            | BookingError::Signature { .. }
            | BookingError::MalformedEvent { .. }
            | BookingError::Parse { .. } => ErrorKind::Client,
            BookingError::Processor { .. }
            | BookingError::ProcessorTimeout { .. }
            | BookingError::Storage { .. }
            | BookingError::ArithmeticOverflow { .. }
            | BookingError::Io { .. } => ErrorKind::Server,
        }
    }

    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::ProcessorTimeout { .. } | BookingError::Storage { .. }
        )
    }

    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        BookingError::Validation {
            message: message.into(),
        }
    }

    /// Create a Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        BookingError::Conflict {
            message: message.into(),
        }
    }

    /// Create an InvalidTransition error
    pub fn invalid_transition(
        entity: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        BookingError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BookingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a Processor error
    pub fn processor(operation: &str, message: impl Into<String>) -> Self {
        BookingError::Processor {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Create a ProcessorTimeout error
    pub fn processor_timeout(operation: &str) -> Self {
        BookingError::ProcessorTimeout {
            operation: operation.to_string(),
        }
    }

    /// Create a Storage error
    pub fn storage(operation: &str, message: impl Into<String>) -> Self {
        BookingError::Storage {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Create a Signature error
    pub fn signature(message: impl Into<String>) -> Self {
        BookingError::Signature {
            message: message.into(),
        }
    }

    /// Create a MalformedEvent error
    pub fn malformed_event(message: impl Into<String>) -> Self {
        BookingError::MalformedEvent {
            message: message.into(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(owner: &str, amount: Decimal) -> Self {
        BookingError::ArithmeticOverflow {
            owner: owner.to_string(),
            amount,
        }
    }
}

impl From<std::io::Error> for BookingError {
    fn from(error: std::io::Error) -> Self {
        BookingError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for BookingError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        BookingError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(error: serde_json::Error) -> Self {
        BookingError::malformed_event(error.to_string())
    }
}
