//! Simulated payment processor
//!
//! An in-memory stand-in for the external processor, used by the replay
//! driver and the tests. It issues `pi_` intent, `ch_` charge and `re_` refund
//! references and can be told to fail refunds or time out, so the
//! compensation paths of the booking core can be exercised.

use super::traits::{ChargeIntent, IntentStatus, PaymentProcessor};
use crate::types::BookingError;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct SimulatedIntent {
    amount: Decimal,
    currency: String,
    description: String,
    status: IntentStatus,
    charge_ref: Option<String>,
}

#[derive(Debug, Clone)]
struct SimulatedCharge {
    refund_ref: Option<String>,
}

/// In-memory processor
#[derive(Debug, Default)]
pub struct SimulatedProcessor {
    intents: DashMap<String, SimulatedIntent>,
    charges: DashMap<String, SimulatedCharge>,
    fail_refunds: AtomicBool,
    timeouts: AtomicBool,
}

fn reference(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

impl SimulatedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every refund fail with a processor error
    pub fn set_fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    /// Make every call time out
    pub fn set_timeouts(&self, timeout: bool) {
        self.timeouts.store(timeout, Ordering::SeqCst);
    }

    fn check_timeout(&self, operation: &str) -> Result<(), BookingError> {
        if self.timeouts.load(Ordering::SeqCst) {
            return Err(BookingError::processor_timeout(operation));
        }
        Ok(())
    }

    /// Settle an intent the way the renter's card payment would
    ///
    /// Marks the intent succeeded and returns the reference of its charge,
    /// creating the charge on the first call.
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Processor` for an unknown or cancelled intent.
    pub fn settle_intent(&self, intent_ref: &str) -> Result<String, BookingError> {
        let mut intent = self
            .intents
            .get_mut(intent_ref)
            .ok_or_else(|| BookingError::processor("settle_intent", format!("no such intent {}", intent_ref)))?;

        if intent.status == IntentStatus::Canceled {
            return Err(BookingError::processor(
                "settle_intent",
                format!("intent {} was canceled", intent_ref),
            ));
        }
        if let Some(charge_ref) = &intent.charge_ref {
            return Ok(charge_ref.clone());
        }

        let charge_ref = reference("ch");
        self.charges
            .insert(charge_ref.clone(), SimulatedCharge { refund_ref: None });
        intent.status = IntentStatus::Succeeded;
        intent.charge_ref = Some(charge_ref.clone());
        debug!(intent = intent_ref, charge = %charge_ref, amount = %intent.amount, currency = %intent.currency, "intent settled");
        Ok(charge_ref)
    }

    /// Amount and description of an intent, if it exists
    pub fn intent_details(&self, intent_ref: &str) -> Option<(Decimal, String)> {
        self.intents
            .get(intent_ref)
            .map(|intent| (intent.amount, intent.description.clone()))
    }
}

impl PaymentProcessor for SimulatedProcessor {
    fn create_charge_intent(
        &self,
        customer_ref: &str,
        amount: Decimal,
        currency: &str,
        description: &str,
    ) -> Result<ChargeIntent, BookingError> {
        self.check_timeout("create_charge_intent")?;
        if amount <= Decimal::ZERO {
            return Err(BookingError::processor(
                "create_charge_intent",
                "amount must be positive",
            ));
        }

        let intent_ref = reference("pi");
        let client_secret = format!("{}_secret_{}", intent_ref, Uuid::new_v4().simple());
        self.intents.insert(
            intent_ref.clone(),
            SimulatedIntent {
                amount,
                currency: currency.to_string(),
                description: description.to_string(),
                status: IntentStatus::RequiresPayment,
                charge_ref: None,
            },
        );
        debug!(customer = customer_ref, intent = %intent_ref, %amount, "intent created");

        Ok(ChargeIntent {
            intent_ref,
            client_secret,
        })
    }

    fn confirmation_status(&self, intent_ref: &str) -> Result<IntentStatus, BookingError> {
        self.check_timeout("confirmation_status")?;
        self.intents
            .get(intent_ref)
            .map(|intent| intent.status)
            .ok_or_else(|| {
                BookingError::processor("confirmation_status", format!("no such intent {}", intent_ref))
            })
    }

    fn refund_charge(&self, charge_ref: &str) -> Result<String, BookingError> {
        self.check_timeout("refund_charge")?;
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(BookingError::processor("refund_charge", "refund failed"));
        }

        let mut charge = self.charges.get_mut(charge_ref).ok_or_else(|| {
            BookingError::processor("refund_charge", format!("no such charge {}", charge_ref))
        })?;
        if charge.refund_ref.is_some() {
            return Err(BookingError::processor(
                "refund_charge",
                format!("charge {} has already been refunded", charge_ref),
            ));
        }

        let refund_ref = reference("re");
        charge.refund_ref = Some(refund_ref.clone());
        Ok(refund_ref)
    }

    fn receipt_url(&self, charge_ref: &str) -> Result<String, BookingError> {
        self.check_timeout("receipt_url")?;
        if !self.charges.contains_key(charge_ref) {
            return Err(BookingError::processor(
                "receipt_url",
                format!("no such charge {}", charge_ref),
            ));
        }
        Ok(format!("https://pay.example.test/receipts/{}", charge_ref))
    }
}
