//! Stripe Webhook Handling
//!
//! The only place that marks a memory paid or a purchase `paid`.
//!
//! Deliveries are at-least-once and may race each other, so every mutation is
//! a conditional write and a repeated event leaves state unchanged. Once an
//! authenticated event has been decoded the delivery is always acknowledged:
//! store failures are logged with enough context for manual reconciliation
//! instead of being surfaced to the provider, which would otherwise keep
//! retrying.

use serde::Serialize;
use std::sync::Arc;

use memoria_core::{
    ConditionalUpdate, DEFAULT_MEMORY_TITLE, MEMORY_PRICE_CENTS, NewPurchase, PurchaseStatus,
    ReconciliationStore, StoreError,
};

use crate::error::{PaymentError, Result};
use crate::event::{CompletedSession, WebhookEvent};
use crate::signature::{DEFAULT_TOLERANCE_SECS, verify_signature};

/// Signature verification settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Shared signing secret; `None` accepts unverified bodies
    pub signing_secret: Option<String>,

    /// Insecure mode: parse the body anyway when verification fails
    pub allow_unsigned: bool,

    pub tolerance_secs: i64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            allow_unsigned: false,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }
}

impl WebhookConfig {
    /// Signed deliveries only
    pub fn signed(secret: impl Into<String>) -> Self {
        Self {
            signing_secret: Some(secret.into()),
            ..Default::default()
        }
    }

    /// Read `STRIPE_WEBHOOK_SECRET` and `WEBHOOK_ALLOW_UNSIGNED`
    pub fn from_env() -> Self {
        let signing_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let allow_unsigned = std::env::var("WEBHOOK_ALLOW_UNSIGNED")
            .is_ok_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        Self {
            signing_secret,
            allow_unsigned,
            ..Default::default()
        }
    }
}

/// What happened to one record during reconciliation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Row moved to paid by this delivery
    Updated,
    /// Row was already paid (duplicate delivery)
    AlreadyPaid,
    /// No matching row
    Missing,
    /// Purchase row absent; a paid recovery row was inserted
    Recovered,
    /// Store error, logged and suppressed
    Failed,
}

/// Acknowledgement body returned to the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookReceipt {
    pub received: bool,

    pub event_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<StepOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase: Option<StepOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl WebhookReceipt {
    fn acknowledged(event: &WebhookEvent) -> Self {
        Self {
            received: true,
            event_type: event.event_type().to_string(),
            event_id: event.event_id().map(str::to_string),
            memory: None,
            purchase: None,
            note: None,
        }
    }
}

/// Identifiers a completed checkout must carry to be reconciled
struct Target<'a> {
    event_id: &'a str,
    session_id: &'a str,
    user_id: &'a str,
    memory_id: &'a str,
}

/// Webhook handler
pub struct WebhookHandler {
    store: Arc<dyn ReconciliationStore>,
    config: WebhookConfig,
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn ReconciliationStore>, config: WebhookConfig) -> Self {
        if config.allow_unsigned {
            tracing::warn!("Webhook insecure mode enabled: unverifiable deliveries will be trusted");
        }
        if config.signing_secret.is_none() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set: webhook deliveries are not verified");
        }
        Self { store, config }
    }

    /// Verify the delivery (when a secret is configured) and decode it
    pub fn authenticate(&self, payload: &str, signature: Option<&str>) -> Result<WebhookEvent> {
        let Some(secret) = self.config.signing_secret.as_deref() else {
            tracing::warn!("Accepting unverified webhook (no signing secret configured)");
            return WebhookEvent::decode(payload);
        };

        let verified = signature
            .ok_or_else(|| PaymentError::Signature("missing stripe-signature header".into()))
            .and_then(|sig| {
                verify_signature(payload.as_bytes(), sig, secret, self.config.tolerance_secs)
            });

        match verified {
            Ok(()) => WebhookEvent::decode(payload),
            Err(e) if self.config.allow_unsigned => {
                tracing::warn!(error = %e, "Signature verification failed; insecure mode accepting body");
                WebhookEvent::decode(payload)
            }
            Err(e) => Err(e),
        }
    }

    /// Authenticate, decode and reconcile one delivery
    pub async fn receive(&self, payload: &str, signature: Option<&str>) -> Result<WebhookReceipt> {
        let event = self.authenticate(payload, signature)?;
        Ok(self.handle(&event).await)
    }

    /// Process a webhook event
    pub async fn handle(&self, event: &WebhookEvent) -> WebhookReceipt {
        tracing::info!(
            event_type = event.event_type(),
            event_id = event.event_id().unwrap_or("-"),
            "Processing Stripe webhook"
        );

        let mut receipt = WebhookReceipt::acknowledged(event);

        match event {
            WebhookEvent::CheckoutSessionCompleted { session, .. } => {
                let event_id = event.event_id().unwrap_or("-");
                tracing::debug!(
                    event_id,
                    payment_status = session.payment_status.as_deref().unwrap_or("-"),
                    amount_total = ?session.amount_total,
                    "Completed checkout session"
                );

                let Some(session_id) = session.session_id() else {
                    tracing::error!(
                        event_id,
                        metadata = ?session.metadata,
                        "Completed checkout lacks a session id; acknowledged without changes"
                    );
                    receipt.note = Some("missing session id".into());
                    return receipt;
                };

                let (Some(user_id), Some(memory_id)) =
                    (session.metadata_value("user_id"), session.metadata_value("memory_id"))
                else {
                    tracing::error!(
                        event_id,
                        session_id,
                        metadata = ?session.metadata,
                        "Completed checkout lacks user_id/memory_id metadata; acknowledged without changes"
                    );
                    receipt.note = Some("missing metadata".into());
                    return receipt;
                };

                let target = Target {
                    event_id,
                    session_id,
                    user_id,
                    memory_id,
                };
                receipt.memory = Some(self.reconcile_memory(&target).await);
                receipt.purchase = Some(self.reconcile_purchase(&target, session).await);
            }

            WebhookEvent::Other { event_type, .. } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
            }
        }

        receipt
    }

    async fn reconcile_memory(&self, t: &Target<'_>) -> StepOutcome {
        match self.store.mark_memory_paid(t.memory_id, t.user_id).await {
            Ok(ConditionalUpdate::Applied) => {
                tracing::info!(memory_id = t.memory_id, session_id = t.session_id, "Memory marked paid");
                StepOutcome::Updated
            }
            Ok(ConditionalUpdate::Unchanged) => {
                tracing::info!(memory_id = t.memory_id, event_id = t.event_id, "Memory already paid; duplicate delivery");
                StepOutcome::AlreadyPaid
            }
            Ok(ConditionalUpdate::Missing) => {
                tracing::error!(
                    event_id = t.event_id,
                    session_id = t.session_id,
                    memory_id = t.memory_id,
                    user_id = t.user_id,
                    "No memory with this id owned by this user"
                );
                StepOutcome::Missing
            }
            Err(e) => {
                tracing::error!(
                    event_id = t.event_id,
                    session_id = t.session_id,
                    memory_id = t.memory_id,
                    error = %e,
                    "Failed to mark memory paid"
                );
                StepOutcome::Failed
            }
        }
    }

    async fn reconcile_purchase(&self, t: &Target<'_>, session: &CompletedSession) -> StepOutcome {
        match self.mark_purchase_paid(t).await {
            Some(outcome) => outcome,
            None => self.insert_recovery_purchase(t, session).await,
        }
    }

    /// `None` when there is no row for the session
    async fn mark_purchase_paid(&self, t: &Target<'_>) -> Option<StepOutcome> {
        match self.store.mark_purchase_paid(t.session_id).await {
            Ok(ConditionalUpdate::Applied) => {
                tracing::info!(session_id = t.session_id, "Purchase marked paid");
                Some(StepOutcome::Updated)
            }
            Ok(ConditionalUpdate::Unchanged) => {
                tracing::info!(session_id = t.session_id, event_id = t.event_id, "Purchase already paid; duplicate delivery");
                Some(StepOutcome::AlreadyPaid)
            }
            Ok(ConditionalUpdate::Missing) => None,
            Err(e) => {
                tracing::error!(
                    event_id = t.event_id,
                    session_id = t.session_id,
                    memory_id = t.memory_id,
                    error = %e,
                    "Failed to mark purchase paid"
                );
                Some(StepOutcome::Failed)
            }
        }
    }

    /// The checkout-time write never landed; record the payment directly
    async fn insert_recovery_purchase(&self, t: &Target<'_>, session: &CompletedSession) -> StepOutcome {
        let recovery = NewPurchase {
            user_id: t.user_id.to_string(),
            memory_title: session
                .metadata_value("memory_title")
                .unwrap_or(DEFAULT_MEMORY_TITLE)
                .to_string(),
            memory_id: Some(t.memory_id.to_string()),
            stripe_session_id: t.session_id.to_string(),
            amount: session.amount_total.unwrap_or(MEMORY_PRICE_CENTS),
            status: PurchaseStatus::Paid,
        };

        match self.store.insert_purchase(recovery).await {
            Ok(purchase) => {
                tracing::warn!(
                    event_id = t.event_id,
                    session_id = t.session_id,
                    purchase_id = %purchase.id,
                    "No purchase row for session; inserted paid recovery row"
                );
                StepOutcome::Recovered
            }
            // A concurrent delivery (or the compensation worker) got there first.
            Err(StoreError::Conflict(_)) => match self.mark_purchase_paid(t).await {
                Some(outcome) => outcome,
                None => StepOutcome::Failed,
            },
            Err(e) => {
                tracing::error!(
                    event_id = t.event_id,
                    session_id = t.session_id,
                    memory_id = t.memory_id,
                    error = %e,
                    "Failed to insert recovery purchase"
                );
                StepOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::{Memory, MemoryStore, NewMemory};

    use crate::signature::sign_payload;

    const SECRET: &str = "whsec_test";

    fn completed_event(session_id: &str, metadata: serde_json::Value) -> String {
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": session_id,
                "object": "checkout.session",
                "amount_total": 1990,
                "metadata": metadata,
            }}
        })
        .to_string()
    }

    fn event_for(memory: &Memory, session_id: &str) -> String {
        completed_event(
            session_id,
            serde_json::json!({
                "user_id": memory.user_id,
                "memory_id": memory.id,
                "memory_title": memory.title,
            }),
        )
    }

    fn signed(payload: &str) -> String {
        sign_payload(payload.as_bytes(), SECRET, chrono::Utc::now().timestamp()).unwrap()
    }

    async fn setup() -> (Arc<MemoryStore>, WebhookHandler, Memory) {
        let store = Arc::new(MemoryStore::new());
        let memory = store
            .insert_memory(NewMemory {
                user_id: "u1".into(),
                title: "Our trip".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let handler = WebhookHandler::new(store.clone(), WebhookConfig::signed(SECRET));
        (store, handler, memory)
    }

    #[tokio::test]
    async fn test_completed_checkout_marks_both_records_paid() {
        let (store, handler, memory) = setup().await;
        store
            .insert_purchase(NewPurchase::pending("u1", memory.id.clone(), "Our trip", "sess_1"))
            .await
            .unwrap();

        let payload = event_for(&memory, "sess_1");
        let receipt = handler.receive(&payload, Some(&signed(&payload))).await.unwrap();

        assert!(receipt.received);
        assert_eq!(receipt.memory, Some(StepOutcome::Updated));
        assert_eq!(receipt.purchase, Some(StepOutcome::Updated));
        assert!(store.get_memory(&memory.id).await.unwrap().unwrap().is_paid);
        let purchase = store.find_purchase_by_session("sess_1").await.unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Paid);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let (store, handler, memory) = setup().await;
        store
            .insert_purchase(NewPurchase::pending("u1", memory.id.clone(), "Our trip", "sess_1"))
            .await
            .unwrap();

        let payload = event_for(&memory, "sess_1");
        handler.receive(&payload, Some(&signed(&payload))).await.unwrap();
        let second = handler.receive(&payload, Some(&signed(&payload))).await.unwrap();

        assert_eq!(second.memory, Some(StepOutcome::AlreadyPaid));
        assert_eq!(second.purchase, Some(StepOutcome::AlreadyPaid));
        assert_eq!(store.purchase_count().await, 1);
        assert!(store.get_memory(&memory.id).await.unwrap().unwrap().is_paid);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_create_one_row() {
        let (store, handler, memory) = setup().await;
        let payload = event_for(&memory, "sess_1");
        let event = handler.authenticate(&payload, Some(&signed(&payload))).unwrap();

        let (a, b) = tokio::join!(handler.handle(&event), handler.handle(&event));

        assert_eq!(store.purchase_count().await, 1);
        let outcomes = [a.purchase.unwrap(), b.purchase.unwrap()];
        assert!(outcomes.contains(&StepOutcome::Recovered));
        assert!(outcomes.contains(&StepOutcome::AlreadyPaid));
    }

    #[tokio::test]
    async fn test_missing_purchase_row_is_recovered() {
        let (store, handler, memory) = setup().await;

        let payload = event_for(&memory, "sess_9");
        let receipt = handler.receive(&payload, Some(&signed(&payload))).await.unwrap();

        assert_eq!(receipt.purchase, Some(StepOutcome::Recovered));
        let purchase = store.find_purchase_by_session("sess_9").await.unwrap().unwrap();
        assert_eq!(purchase.stripe_session_id, "sess_9");
        assert_eq!(purchase.status, PurchaseStatus::Paid);
        assert_eq!(purchase.memory_title, "Our trip");
        assert_eq!(purchase.amount, 1990);
        assert_eq!(purchase.memory_id.as_deref(), Some(memory.id.as_str()));
    }

    #[tokio::test]
    async fn test_recovery_uses_defaults_without_title_or_amount() {
        let (store, handler, memory) = setup().await;
        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": {"object": {"id": "sess_2", "metadata": {"user_id": "u1", "memory_id": memory.id}}}
        })
        .to_string();

        handler.receive(&payload, Some(&signed(&payload))).await.unwrap();

        let purchase = store.find_purchase_by_session("sess_2").await.unwrap().unwrap();
        assert_eq!(purchase.memory_title, DEFAULT_MEMORY_TITLE);
        assert_eq!(purchase.amount, MEMORY_PRICE_CENTS);
    }

    #[tokio::test]
    async fn test_missing_metadata_mutates_nothing() {
        let (store, handler, memory) = setup().await;
        store
            .insert_purchase(NewPurchase::pending("u1", memory.id.clone(), "Our trip", "sess_1"))
            .await
            .unwrap();

        for metadata in [
            serde_json::json!({"memory_id": memory.id}),
            serde_json::json!({"user_id": "u1"}),
            serde_json::Value::Null,
        ] {
            let payload = completed_event("sess_1", metadata);
            let receipt = handler.receive(&payload, Some(&signed(&payload))).await.unwrap();
            assert!(receipt.received);
            assert_eq!(receipt.note.as_deref(), Some("missing metadata"));
            assert_eq!(receipt.memory, None);
        }

        assert!(!store.get_memory(&memory.id).await.unwrap().unwrap().is_paid);
        let purchase = store.find_purchase_by_session("sess_1").await.unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_session_id_is_acknowledged() {
        let (store, handler, memory) = setup().await;
        let payload = serde_json::json!({
            "id": "evt_3",
            "type": "checkout.session.completed",
            "data": {"object": {"metadata": {"user_id": "u1", "memory_id": memory.id}}}
        })
        .to_string();

        let receipt = handler.receive(&payload, Some(&signed(&payload))).await.unwrap();

        assert!(receipt.received);
        assert_eq!(receipt.note.as_deref(), Some("missing session id"));
        assert_eq!(receipt.memory, None);
        assert_eq!(receipt.purchase, None);
        assert!(!store.get_memory(&memory.id).await.unwrap().unwrap().is_paid);
        assert_eq!(store.purchase_count().await, 0);
    }

    #[tokio::test]
    async fn test_foreign_user_cannot_pay_memory() {
        let (store, handler, memory) = setup().await;
        let payload = completed_event(
            "sess_1",
            serde_json::json!({"user_id": "intruder", "memory_id": memory.id}),
        );

        let receipt = handler.receive(&payload, Some(&signed(&payload))).await.unwrap();

        assert_eq!(receipt.memory, Some(StepOutcome::Missing));
        assert!(!store.get_memory(&memory.id).await.unwrap().unwrap().is_paid);
    }

    #[tokio::test]
    async fn test_other_events_are_acknowledged() {
        let (store, handler, _) = setup().await;
        let payload = r#"{"id":"evt_5","type":"payment_intent.created","data":{"object":{}}}"#;

        let receipt = handler.receive(payload, Some(&signed(payload))).await.unwrap();

        assert_eq!(receipt.event_type, "payment_intent.created");
        assert_eq!(receipt.purchase, None);
        assert_eq!(store.purchase_count().await, 0);
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected() {
        let (store, handler, memory) = setup().await;
        let payload = event_for(&memory, "sess_1");

        let err = handler.receive(&payload, Some("t=1,v1=00")).await.unwrap_err();
        assert!(matches!(err, PaymentError::Signature(_)));

        let err = handler.receive(&payload, None).await.unwrap_err();
        assert!(matches!(err, PaymentError::Signature(_)));

        assert!(!store.get_memory(&memory.id).await.unwrap().unwrap().is_paid);
        assert_eq!(store.purchase_count().await, 0);
    }

    #[tokio::test]
    async fn test_insecure_mode_trusts_unsigned_body() {
        let (store, _, memory) = setup().await;
        let handler = WebhookHandler::new(
            store.clone(),
            WebhookConfig {
                allow_unsigned: true,
                ..WebhookConfig::signed(SECRET)
            },
        );

        let payload = event_for(&memory, "sess_1");
        let receipt = handler.receive(&payload, Some("t=1,v1=00")).await.unwrap();

        assert_eq!(receipt.memory, Some(StepOutcome::Updated));
        assert!(store.get_memory(&memory.id).await.unwrap().unwrap().is_paid);
    }

    #[tokio::test]
    async fn test_unparsable_body_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let handler = WebhookHandler::new(store, WebhookConfig::default());

        let err = handler.receive("{not json", None).await.unwrap_err();
        assert!(matches!(err, PaymentError::WebhookParse(_)));
    }

    #[tokio::test]
    async fn test_no_secret_accepts_unverified_body() {
        let (store, _, memory) = setup().await;
        let handler = WebhookHandler::new(store.clone(), WebhookConfig::default());

        let payload = event_for(&memory, "sess_1");
        let receipt = handler.receive(&payload, None).await.unwrap();

        assert_eq!(receipt.purchase, Some(StepOutcome::Recovered));
    }

    #[test]
    fn test_receipt_wire_format() {
        let receipt = WebhookReceipt {
            received: true,
            event_type: "checkout.session.completed".into(),
            event_id: Some("evt_1".into()),
            memory: Some(StepOutcome::AlreadyPaid),
            purchase: Some(StepOutcome::Recovered),
            note: None,
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["received"], true);
        assert_eq!(json["eventType"], "checkout.session.completed");
        assert_eq!(json["memory"], "already_paid");
        assert_eq!(json["purchase"], "recovered");
        assert!(json.get("note").is_none());
    }
}
