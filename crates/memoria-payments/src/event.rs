//! Webhook Event Decoding
//!
//! Decodes the provider's event envelope into the variants this backend acts
//! on. Anything other than a completed checkout decodes to `Other` and is
//! acknowledged without side effects.

use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{PaymentError, Result};

/// Event type that drives reconciliation
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<String>,

    #[serde(rename = "type")]
    event_type: String,

    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

/// The checkout session carried by a completed-checkout event
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CompletedSession {
    /// Checkout session id
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,

    /// Charged amount in minor units
    #[serde(default)]
    pub amount_total: Option<i64>,

    #[serde(default)]
    pub payment_status: Option<String>,
}

impl CompletedSession {
    /// Non-blank session id
    pub fn session_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// Non-blank metadata value
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()?
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Checkout completed - reconcile memory and purchase
    CheckoutSessionCompleted {
        event_id: Option<String>,
        session: CompletedSession,
    },

    /// Unhandled event type
    Other {
        event_id: Option<String>,
        event_type: String,
    },
}

impl WebhookEvent {
    /// Decode a raw event body
    pub fn decode(payload: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(payload)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        if envelope.event_type != CHECKOUT_SESSION_COMPLETED {
            return Ok(WebhookEvent::Other {
                event_id: envelope.id,
                event_type: envelope.event_type,
            });
        }

        let object = envelope
            .data
            .ok_or_else(|| PaymentError::WebhookParse("missing data.object".into()))?
            .object;
        let session: CompletedSession = serde_json::from_value(object)
            .map_err(|e| PaymentError::WebhookParse(format!("invalid checkout session: {e}")))?;

        Ok(WebhookEvent::CheckoutSessionCompleted {
            event_id: envelope.id,
            session,
        })
    }

    pub fn event_type(&self) -> &str {
        match self {
            WebhookEvent::CheckoutSessionCompleted { .. } => CHECKOUT_SESSION_COMPLETED,
            WebhookEvent::Other { event_type, .. } => event_type.as_str(),
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            WebhookEvent::CheckoutSessionCompleted { event_id, .. }
            | WebhookEvent::Other { event_id, .. } => event_id.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_completed_checkout() {
        let payload = r#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "sess_1",
                "object": "checkout.session",
                "amount_total": 1990,
                "payment_status": "paid",
                "metadata": {"user_id": "u1", "memory_id": "m1", "memory_title": "Our trip"}
            }}
        }"#;

        let event = WebhookEvent::decode(payload).unwrap();
        assert_eq!(event.event_type(), CHECKOUT_SESSION_COMPLETED);
        assert_eq!(event.event_id(), Some("evt_1"));

        let WebhookEvent::CheckoutSessionCompleted { session, .. } = event else {
            panic!("expected completed checkout");
        };
        assert_eq!(session.session_id(), Some("sess_1"));
        assert_eq!(session.amount_total, Some(1990));
        assert_eq!(session.metadata_value("memory_id"), Some("m1"));
    }

    #[test]
    fn test_other_events_are_ignored() {
        let event = WebhookEvent::decode(r#"{"id":"evt_2","type":"invoice.paid","data":{"object":{}}}"#).unwrap();
        assert_eq!(
            event,
            WebhookEvent::Other {
                event_id: Some("evt_2".into()),
                event_type: "invoice.paid".into(),
            }
        );
    }

    #[test]
    fn test_null_and_blank_metadata() {
        let event = WebhookEvent::decode(
            r#"{"type":"checkout.session.completed","data":{"object":{"id":"sess_1","metadata":null}}}"#,
        )
        .unwrap();
        let WebhookEvent::CheckoutSessionCompleted { session, .. } = event else {
            panic!("expected completed checkout");
        };
        assert_eq!(session.metadata_value("user_id"), None);

        let event = WebhookEvent::decode(
            r#"{"type":"checkout.session.completed","data":{"object":{"id":"sess_1","metadata":{"user_id":"  "}}}}"#,
        )
        .unwrap();
        let WebhookEvent::CheckoutSessionCompleted { session, .. } = event else {
            panic!("expected completed checkout");
        };
        assert_eq!(session.metadata_value("user_id"), None);
    }

    #[test]
    fn test_missing_session_id_still_decodes() {
        let event = WebhookEvent::decode(
            r#"{"type":"checkout.session.completed","data":{"object":{"metadata":{"user_id":"u1","memory_id":"m1"}}}}"#,
        )
        .unwrap();
        let WebhookEvent::CheckoutSessionCompleted { session, .. } = event else {
            panic!("expected completed checkout");
        };
        assert_eq!(session.session_id(), None);
        assert_eq!(session.metadata_value("memory_id"), Some("m1"));
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(WebhookEvent::decode("not json").is_err());
        assert!(WebhookEvent::decode(r#"{"id":"evt_1"}"#).is_err());
        assert!(WebhookEvent::decode(r#"{"type":"checkout.session.completed"}"#).is_err());
        assert!(WebhookEvent::decode(
            r#"{"type":"checkout.session.completed","data":{"object":{"id":7}}}"#
        )
        .is_err());
    }
}
