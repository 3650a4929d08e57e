//! Checkout Session Initiator
//!
//! Turns "pay for this memory" into a hosted checkout URL and a pending
//! purchase row the webhook can later reconcile against.

use std::collections::BTreeMap;
use std::sync::Arc;

use memoria_core::{AuthProvider, AuthUser, MEMORY_PRICE_CENTS, ReconciliationStore, bearer_token};
use serde::{Deserialize, Serialize};

use crate::compensation::{CompensationQueue, PendingPurchaseWrite, record_pending_purchase};
use crate::error::{PaymentError, Result};
use crate::provider::{CheckoutSessionRequest, PaymentProvider};
use crate::retry::RetryPolicy;

/// Body of `POST create-payment`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    #[serde(default)]
    pub memory_id: Option<String>,

    #[serde(default)]
    pub memory_title: Option<String>,
}

/// Response of `POST create-payment`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    /// Hosted checkout URL to redirect to
    pub url: String,

    pub session_id: String,
}

/// Pricing and redirect settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutConfig {
    pub unit_amount: i64,
    pub currency: String,
    pub product_description: String,
    /// Redirect origin used when the request carries no `Origin` header
    pub fallback_origin: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            unit_amount: MEMORY_PRICE_CENTS,
            currency: "brl".into(),
            product_description: "Salvar permanentemente sua memória afetiva".into(),
            fallback_origin: "http://localhost:5173".into(),
        }
    }
}

impl CheckoutConfig {
    /// Read `PUBLIC_SITE_URL`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(origin) = std::env::var("PUBLIC_SITE_URL") {
            if !origin.trim().is_empty() {
                config.fallback_origin = origin.trim().to_string();
            }
        }
        config
    }
}

/// Resolve an `Authorization` header value to a user
pub async fn authenticate(auth: &dyn AuthProvider, authorization: Option<&str>) -> Result<AuthUser> {
    let token = authorization
        .and_then(bearer_token)
        .ok_or_else(|| PaymentError::Unauthorized("missing bearer token".into()))?;

    match auth.user_from_token(token).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(PaymentError::Unauthorized("invalid or expired session".into())),
        Err(e) => {
            tracing::error!(error = %e, "Auth provider failed to resolve token");
            Err(PaymentError::Server(e.to_string()))
        }
    }
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    field
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PaymentError::Validation(format!("{name} is required")))
}

/// Checkout initiator
pub struct CheckoutInitiator {
    provider: Arc<dyn PaymentProvider>,
    store: Arc<dyn ReconciliationStore>,
    config: CheckoutConfig,
    retry: RetryPolicy,
    compensation: Option<CompensationQueue>,
}

impl CheckoutInitiator {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: Arc<dyn ReconciliationStore>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            retry: RetryPolicy::default(),
            compensation: None,
        }
    }

    /// Override the provider retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Queue failed purchase writes for background retry
    pub fn with_compensation(mut self, queue: CompensationQueue) -> Self {
        self.compensation = Some(queue);
        self
    }

    fn origin<'a>(&'a self, origin: Option<&'a str>) -> &'a str {
        origin
            .map(str::trim)
            .filter(|o| !o.is_empty() && *o != "null")
            .unwrap_or(self.config.fallback_origin.as_str())
            .trim_end_matches('/')
    }

    /// Where the provider sends the user after paying
    pub fn success_url(&self, origin: Option<&str>, memory_id: &str) -> String {
        format!(
            "{}/dashboard?success=true&memory_id={memory_id}",
            self.origin(origin)
        )
    }

    /// Where the provider sends the user after backing out
    pub fn cancel_url(&self, origin: Option<&str>) -> String {
        format!("{}/create-memory?step=6&canceled=true", self.origin(origin))
    }

    /// Create a checkout session for `user` and record the pending purchase
    pub async fn initiate(
        &self,
        user: &AuthUser,
        request: CreatePaymentRequest,
        origin: Option<&str>,
    ) -> Result<CreatePaymentResponse> {
        let memory_id = required(request.memory_id, "memoryId")?;
        let memory_title = required(request.memory_title, "memoryTitle")?;

        let memory = self
            .store
            .get_memory(&memory_id)
            .await?
            .filter(|m| m.is_owned_by(&user.id))
            .ok_or_else(|| PaymentError::NotFound(format!("memory {memory_id} not found")))?;

        if memory.is_paid {
            return Err(PaymentError::AlreadyPaid(memory_id));
        }

        let session_request = CheckoutSessionRequest {
            product_name: memory_title.clone(),
            product_description: self.config.product_description.clone(),
            unit_amount: self.config.unit_amount,
            currency: self.config.currency.clone(),
            success_url: self.success_url(origin, &memory_id),
            cancel_url: self.cancel_url(origin),
            metadata: BTreeMap::from([
                ("user_id".to_string(), user.id.clone()),
                ("memory_id".to_string(), memory_id.clone()),
                ("memory_title".to_string(), memory_title.clone()),
            ]),
        };

        let session = self
            .retry
            .run("create checkout session", || {
                self.provider.create_checkout_session(&session_request)
            })
            .await?;

        tracing::info!(
            provider = self.provider.name(),
            session_id = %session.id,
            user_id = %user.id,
            memory_id = %memory_id,
            "Created checkout session"
        );

        let write = PendingPurchaseWrite::new(session.id.clone(), user.id.clone(), memory_id, memory_title);

        match record_pending_purchase(self.store.as_ref(), &write).await {
            Ok(purchase) => tracing::info!(
                purchase_id = %purchase.id,
                session_id = %session.id,
                "Recorded pending purchase"
            ),
            Err(e) => {
                tracing::error!(
                    session_id = %write.session_id,
                    user_id = %write.user_id,
                    memory_id = %write.memory_id,
                    error = %e,
                    "Failed to record pending purchase after creating checkout session"
                );
                match &self.compensation {
                    Some(queue) => {
                        queue.enqueue(write);
                    }
                    None => tracing::warn!(
                        session_id = %session.id,
                        "No compensation queue configured; relying on webhook recovery insert"
                    ),
                }
            }
        }

        Ok(CreatePaymentResponse {
            url: session.url,
            session_id: session.id,
        })
    }
}
