//! Settlement ledger
//!
//! Credits listing owners when a payment is confirmed collected. The amount
//! depends on the commission policy captured on the reservation:
//!
//! - `RenterPays` / `None`: the owner receives the full charged amount
//! - `OwnerPays`: the owner receives the list price minus the processor fee
//!
//! The ledger itself carries no idempotency key. Callers invoke it from inside
//! the status transition that triggers settlement, and that transition can
//! only happen once per payment.

use super::pricing::processor_fee;
use super::traits::BalanceLedger;
use crate::types::{BookingError, CommissionPolicy, EngineConfig, OwnerBalance, Payment};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Amount owed to the owner for `payment` under `policy`
///
/// # Errors
///
/// Propagates fee computation errors.
pub fn settlement_amount(
    payment: &Payment,
    policy: CommissionPolicy,
    config: &EngineConfig,
) -> Result<Decimal, BookingError> {
    match policy {
        CommissionPolicy::OwnerPays => {
            let fee = processor_fee(payment.amount_gross, config)?;
            Ok(payment.amount_gross - fee)
        }
        CommissionPolicy::RenterPays | CommissionPolicy::None => Ok(payment.amount),
    }
}

/// Applies settlement rules on top of a [`BalanceLedger`]
#[derive(Clone)]
pub struct SettlementLedger {
    ledger: Arc<dyn BalanceLedger>,
    config: Arc<EngineConfig>,
}

impl SettlementLedger {
    pub fn new(ledger: Arc<dyn BalanceLedger>, config: Arc<EngineConfig>) -> Self {
        Self { ledger, config }
    }

    /// Credit the owner for a collected payment
    ///
    /// # Arguments
    ///
    /// * `owner` - Listing owner
    /// * `payment` - The payment being settled
    /// * `policy` - Commission policy of the reservation
    ///
    /// # Returns
    ///
    /// The amount credited. Nothing is credited when the settlement amount is
    /// not positive (a fee larger than the price).
    ///
    /// # Errors
    ///
    /// Returns the ledger's error; the caller must treat the triggering
    /// transition as failed.
    pub fn settle(
        &self,
        owner: &str,
        payment: &Payment,
        policy: CommissionPolicy,
    ) -> Result<Decimal, BookingError> {
        let amount = settlement_amount(payment, policy, &self.config)?;
        if amount <= Decimal::ZERO {
            info!(owner, payment = %payment.id, %amount, "nothing to settle");
            return Ok(Decimal::ZERO);
        }

        let balance = self.ledger.credit_balance(owner, amount)?;
        info!(owner, payment = %payment.id, %amount, %balance, "owner credited");
        Ok(amount)
    }
}

/// Thread-safe in-memory balance store
#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: DashMap<String, OwnerBalance>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BalanceLedger for MemoryLedger {
    fn credit_balance(&self, owner: &str, amount: Decimal) -> Result<Decimal, BookingError> {
        let mut entry = self
            .balances
            .entry(owner.to_string())
            .or_insert_with(|| OwnerBalance::new(owner.to_string()));
        entry.credit(amount)?;
        Ok(entry.balance)
    }

    fn balance(&self, owner: &str) -> Result<Decimal, BookingError> {
        Ok(self
            .balances
            .get(owner)
            .map(|entry| entry.balance)
            .unwrap_or(Decimal::ZERO))
    }

    fn balances(&self) -> Result<Vec<OwnerBalance>, BookingError> {
        let mut all: Vec<OwnerBalance> = self
            .balances
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.owner.cmp(&b.owner));
        Ok(all)
    }
}
