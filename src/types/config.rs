//! Engine configuration
//!
//! Fee constants, the reference timezone used for calendar math and the
//! webhook secret all live here so the pure pricing code can be driven by
//! injected values.

use super::error::BookingError;
use chrono::FixedOffset;
use rust_decimal::Decimal;

/// Tunables for pricing, deadlines and webhook verification
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Fixed processor fee per charge, in currency units
    pub fixed_fee: Decimal,

    /// Percentage processor fee per charge (2.9 means 2.9%)
    pub fee_percent: Decimal,

    /// ISO currency code sent to the processor
    pub currency: String,

    /// Offset of the reference timezone from UTC, in hours
    pub utc_offset_hours: i32,

    /// Longest daily rental, in days
    pub max_daily_days: i64,

    /// Time a renter has to pay the first payment
    pub payment_window_hours: i64,

    /// Day of the billing month on which installments fall due
    pub installment_due_day: u32,

    /// Shared secret for processor webhook signatures
    pub webhook_secret: String,

    /// Maximum age of a signed webhook timestamp
    pub webhook_tolerance_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fixed_fee: Decimal::new(629, 2),
            fee_percent: Decimal::new(29, 1),
            currency: "try".to_string(),
            utc_offset_hours: 3,
            max_daily_days: 14,
            payment_window_hours: 24,
            installment_due_day: 15,
            webhook_secret: String::new(),
            webhook_tolerance_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Fixed offset of the reference timezone
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Validation` if the offset is outside ±23 hours.
    pub fn timezone(&self) -> Result<FixedOffset, BookingError> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            BookingError::validation(format!(
                "utc offset of {} hours is out of range",
                self.utc_offset_hours
            ))
        })
    }

    /// Check that every value can be used by the pricing and billing code
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Validation` describing the first bad value.
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.fixed_fee < Decimal::ZERO {
            return Err(BookingError::validation("fixed fee must not be negative"));
        }
        if self.fee_percent < Decimal::ZERO || self.fee_percent >= Decimal::ONE_HUNDRED {
            return Err(BookingError::validation(
                "fee percent must be in the range [0, 100)",
            ));
        }
        if self.max_daily_days < 1 {
            return Err(BookingError::validation("max daily days must be at least 1"));
        }
        if self.payment_window_hours < 1 {
            return Err(BookingError::validation(
                "payment window must be at least one hour",
            ));
        }
        if !(1..=28).contains(&self.installment_due_day) {
            return Err(BookingError::validation(
                "installment due day must be between 1 and 28",
            ));
        }
        if self.webhook_tolerance_secs < 0 {
            return Err(BookingError::validation(
                "webhook tolerance must not be negative",
            ));
        }
        self.timezone().map(|_| ())
    }
}
