//! Webhook ingestion
//!
//! Verifies signed processor events and routes them into the payment state
//! machine. The signature header has the form `t=<unix seconds>,v1=<hex>`,
//! where the hex digest is HMAC-SHA256 over `"{t}.{payload}"` keyed with the
//! shared webhook secret. Several `v1` entries may be present (secret
//! rotation); one match is enough.
//!
//! Each event is handled independently. Unknown event types are acknowledged
//! as ignored so the processor does not keep redelivering them. Signature and
//! lookup failures are returned to the caller, which logs them and moves on.

use super::payment_machine::{PaymentMachine, TransitionOutcome};
use super::traits::Clock;
use crate::types::{BookingError, EngineConfig};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Envelope of a processor event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct IntentObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChargeObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
}

impl ProcessorEvent {
    /// A `payment_intent.*` event
    pub fn intent(id: impl Into<String>, event_type: impl Into<String>, intent_ref: &str) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            data: EventData {
                object: json!({ "object": "payment_intent", "id": intent_ref }),
            },
        }
    }

    /// A `charge.*` event
    pub fn charge(
        id: impl Into<String>,
        event_type: impl Into<String>,
        charge_ref: &str,
        intent_ref: &str,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            data: EventData {
                object: json!({
                    "object": "charge",
                    "id": charge_ref,
                    "payment_intent": intent_ref,
                }),
            },
        }
    }

    /// Serialized payload, as the processor would post it
    ///
    /// # Errors
    ///
    /// Returns `BookingError::MalformedEvent` if serialization fails.
    pub fn to_payload(&self) -> Result<Vec<u8>, BookingError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn object<T: DeserializeOwned>(&self) -> Result<T, BookingError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            BookingError::malformed_event(format!("{} object: {}", self.event_type, e))
        })
    }
}

/// Event types the engine reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    IntentSucceeded,
    IntentFailed,
    IntentCanceled,
    ChargeSucceeded,
    ChargeFailed,
    ChargeRefunded,
    Unhandled,
}

impl EventKind {
    /// Classify an event type such as `payment_intent.succeeded`
    pub fn classify(event_type: &str) -> Self {
        match event_type.split_once('.') {
            Some(("payment_intent", sub)) => match sub {
                "succeeded" => EventKind::IntentSucceeded,
                "payment_failed" | "failed" => EventKind::IntentFailed,
                "canceled" => EventKind::IntentCanceled,
                _ => EventKind::Unhandled,
            },
            Some(("charge", sub)) => match sub {
                "succeeded" => EventKind::ChargeSucceeded,
                "failed" => EventKind::ChargeFailed,
                "refunded" => EventKind::ChargeRefunded,
                _ => EventKind::Unhandled,
            },
            _ => EventKind::Unhandled,
        }
    }
}

/// Acknowledgement returned for an ingested event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAck {
    pub event_id: String,
    pub event_type: String,
    pub outcome: TransitionOutcome,
}

fn keyed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, BookingError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BookingError::signature(format!("invalid secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Build the signature header for `payload`
///
/// # Arguments
///
/// * `secret` - Shared webhook secret
/// * `timestamp` - Unix seconds the signature is issued at
/// * `payload` - Raw event body
///
/// # Returns
///
/// A header value of the form `t=<timestamp>,v1=<hex digest>`.
///
/// # Errors
///
/// Returns `BookingError::Signature` if the secret cannot key the MAC.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, BookingError> {
    let digest = keyed_mac(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
}

/// Verifies, parses and dispatches processor events
#[derive(Clone)]
pub struct WebhookIngestor {
    payments: PaymentMachine,
    clock: Arc<dyn Clock>,
    secret: String,
    tolerance_secs: i64,
}

impl WebhookIngestor {
    pub fn new(payments: PaymentMachine, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            payments,
            clock,
            secret: config.webhook_secret.clone(),
            tolerance_secs: config.webhook_tolerance_secs,
        }
    }

    /// Ingest one signed event
    ///
    /// # Arguments
    ///
    /// * `payload` - Raw request body
    /// * `signature_header` - Value of the processor's signature header
    ///
    /// # Returns
    ///
    /// The acknowledgement, including whether the event changed anything.
    ///
    /// # Errors
    ///
    /// - `Signature` if the header is missing, stale or does not match
    /// - `MalformedEvent` if the body is not a processor event
    /// - `NotFound` if no payment owns the referenced intent or charge
    /// - any error from the payment state machine
    pub fn handle(&self, payload: &[u8], signature_header: &str) -> Result<WebhookAck, BookingError> {
        if let Err(e) = self.verify(payload, signature_header) {
            warn!(error = %e, "webhook rejected");
            return Err(e);
        }

        let event: ProcessorEvent = serde_json::from_slice(payload)?;
        let outcome = self.dispatch(&event).map_err(|e| {
            warn!(event = %event.id, event_type = %event.event_type, error = %e, "webhook not applied");
            e
        })?;

        info!(event = %event.id, event_type = %event.event_type, %outcome, "webhook processed");
        Ok(WebhookAck {
            event_id: event.id,
            event_type: event.event_type,
            outcome,
        })
    }

    /// Check the signature header against `payload`
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Signature` describing the first failure.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), BookingError> {
        if self.secret.is_empty() {
            return Err(BookingError::signature("webhook secret is not configured"));
        }

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| BookingError::signature("missing or invalid timestamp"))?;
        if signatures.is_empty() {
            return Err(BookingError::signature("no v1 signature in header"));
        }

        let age = self.clock.now().timestamp() - timestamp;
        if age.abs() > self.tolerance_secs {
            return Err(BookingError::signature(format!(
                "timestamp is {}s away from now, tolerance is {}s",
                age, self.tolerance_secs
            )));
        }

        for signature in signatures {
            let Ok(expected) = hex::decode(signature) else {
                continue;
            };
            if keyed_mac(&self.secret, timestamp, payload)?
                .verify_slice(&expected)
                .is_ok()
            {
                return Ok(());
            }
        }
        Err(BookingError::signature("no signature matches the payload"))
    }

    fn dispatch(&self, event: &ProcessorEvent) -> Result<TransitionOutcome, BookingError> {
        let kind = EventKind::classify(&event.event_type);
        match kind {
            EventKind::IntentSucceeded | EventKind::IntentFailed | EventKind::IntentCanceled => {
                let intent: IntentObject = event.object()?;
                match kind {
                    EventKind::IntentSucceeded => self.payments.intent_succeeded(&intent.id),
                    EventKind::IntentFailed => self.payments.intent_failed(&intent.id),
                    _ => self.payments.intent_cancelled(&intent.id),
                }
            }
            EventKind::ChargeSucceeded | EventKind::ChargeFailed | EventKind::ChargeRefunded => {
                let charge: ChargeObject = event.object()?;
                let intent_ref = charge.payment_intent.as_deref().filter(|s| !s.is_empty());
                match kind {
                    EventKind::ChargeSucceeded => {
                        self.payments.charge_succeeded(intent_ref, &charge.id)
                    }
                    EventKind::ChargeFailed => self.payments.charge_failed(intent_ref, &charge.id),
                    _ => self.payments.charge_refunded(intent_ref, &charge.id),
                }
            }
            EventKind::Unhandled => {
                debug!(event = %event.id, event_type = %event.event_type, "unhandled event type");
                Ok(TransitionOutcome::Ignored)
            }
        }
    }
}
