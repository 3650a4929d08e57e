//! Payment Provider Integration
//!
//! Abstraction over the hosted checkout provider.

mod mock;
mod stripe_checkout;

pub use mock::MockPaymentProvider;
pub use stripe_checkout::StripeProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Everything the provider needs to open a one-off hosted checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    /// Line item name shown on the hosted page
    pub product_name: String,

    pub product_description: String,

    /// Minor currency units
    pub unit_amount: i64,

    /// ISO currency code, lowercase
    pub currency: String,

    pub success_url: String,

    pub cancel_url: String,

    /// Opaque metadata echoed back on the webhook event
    pub metadata: BTreeMap<String, String>,
}

/// A created checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    /// Provider session id
    pub id: String,

    /// URL to redirect the user to
    pub url: String,
}

/// Payment provider trait (Strategy pattern)
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<ProviderSession>;

    /// Provider name
    fn name(&self) -> &str;
}
