//! # memoria-payments
//!
//! Checkout initiation and webhook reconciliation for Memórias Afetivas.
//!
//! ## Payment Flow
//!
//! A memory is saved unpaid, paid for on the provider's hosted checkout page,
//! and flipped to paid only when the signed webhook arrives.
//!
//! ```text
//! ┌─────────────┐  create-payment  ┌──────────────────┐  redirect  ┌─────────────┐
//! │   Wizard    │─────────────────▶│ CheckoutInitiator│───────────▶│   Stripe    │
//! │  (step 6)   │                  │ purchase=pending │            │  Checkout   │
//! └─────────────┘                  └──────────────────┘            └──────┬──────┘
//!                                                                         │
//!        ┌────────────────────────────────────────────────────────────────┘
//!        │ checkout.session.completed (signed)
//!        ▼
//! ┌──────────────────┐   conditional writes   ┌───────────────────────────┐
//! │  WebhookHandler  │───────────────────────▶│ memory.is_paid = true     │
//! │ verify + decode  │                        │ purchase.status = paid    │
//! └──────────────────┘                        └───────────────────────────┘
//! ```
//!
//! If the pending purchase row cannot be written after the session exists,
//! the write goes to the [`CompensationQueue`]; if it never lands, the webhook
//! inserts a paid recovery row keyed by the session id.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use memoria_payments::{CheckoutConfig, CheckoutInitiator, StripeProvider};
//!
//! let initiator = CheckoutInitiator::new(
//!     Arc::new(StripeProvider::from_env()?),
//!     store.clone(),
//!     CheckoutConfig::from_env(),
//! );
//!
//! let response = initiator.initiate(&user, request, origin).await?;
//! // Redirect browser to: response.url
//! ```

mod checkout;
mod compensation;
mod error;
mod event;
mod provider;
mod retry;
mod signature;
mod webhook;

pub use checkout::{
    CheckoutConfig, CheckoutInitiator, CreatePaymentRequest, CreatePaymentResponse, authenticate,
};
pub use compensation::{
    CompensationQueue, CompensationWorker, PendingPurchaseWrite, record_pending_purchase,
};
pub use error::{PaymentError, Result};
pub use event::{CHECKOUT_SESSION_COMPLETED, CompletedSession, WebhookEvent};
pub use provider::{
    CheckoutSessionRequest, MockPaymentProvider, PaymentProvider, ProviderSession, StripeProvider,
};
pub use retry::RetryPolicy;
pub use signature::{DEFAULT_TOLERANCE_SECS, sign_payload, verify_signature, verify_signature_at};
pub use webhook::{StepOutcome, WebhookConfig, WebhookHandler, WebhookReceipt};
