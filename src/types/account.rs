//! Owner balance types
//!
//! The settlement ledger keeps one `OwnerBalance` per listing owner. Balances
//! only ever grow through `credit`; payouts are handled outside this crate.

use super::error::BookingError;
use super::listing::UserId;
use rust_decimal::Decimal;

/// Settled funds of a listing owner
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerBalance {
    /// The owner this balance belongs to
    pub owner: UserId,

    /// Funds credited by completed settlements
    pub balance: Decimal,
}

impl OwnerBalance {
    /// Create an empty balance
    ///
    /// # Arguments
    ///
    /// * `owner` - The owner this balance belongs to
    pub fn new(owner: UserId) -> Self {
        OwnerBalance {
            owner,
            balance: Decimal::ZERO,
        }
    }

    /// Add settled funds to the balance
    ///
    /// # Arguments
    ///
    /// * `amount` - The amount to credit (must be positive)
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the credit succeeded
    /// * `Err(BookingError::Validation)` if the amount is not positive
    /// * `Err(BookingError::ArithmeticOverflow)` if the balance would overflow
    pub fn credit(&mut self, amount: Decimal) -> Result<(), BookingError> {
        if amount <= Decimal::ZERO {
            return Err(BookingError::validation(format!(
                "credit amount must be positive, got {}",
                amount
            )));
        }

        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| BookingError::arithmetic_overflow(&self.owner, amount))?;

        Ok(())
    }
}
