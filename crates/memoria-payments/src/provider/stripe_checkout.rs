//! Stripe Checkout Integration
//!
//! Implements the "Stripe Checkout (Hosted)" approach: one-off payment for a
//! single line item, card only.

use async_trait::async_trait;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, CreateCheckoutSessionPaymentMethodTypes,
    Currency, StripeError,
};

use super::{CheckoutSessionRequest, PaymentProvider, ProviderSession};
use crate::error::{PaymentError, Result};

/// Stripe client wrapper
pub struct StripeProvider {
    client: Client,
}

impl StripeProvider {
    /// Create a new Stripe provider
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;

        Ok(Self::new(&secret_key))
    }

    fn currency(code: &str) -> Result<Currency> {
        match code.to_ascii_lowercase().as_str() {
            "brl" => Ok(Currency::BRL),
            "usd" => Ok(Currency::USD),
            "eur" => Ok(Currency::EUR),
            _ => Err(PaymentError::Config(format!("unsupported currency: {code}"))),
        }
    }
}

/// 4xx responses other than 429 will not succeed on retry
fn classify(err: StripeError) -> PaymentError {
    match &err {
        StripeError::Stripe(request)
            if (400..500).contains(&request.http_status) && request.http_status != 429 =>
        {
            PaymentError::UpstreamRejected(err.to_string())
        }
        _ => PaymentError::Upstream(err.to_string()),
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<ProviderSession> {
        let currency = Self::currency(&request.currency)?;

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.metadata = Some(
            request
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency,
                unit_amount: Some(request.unit_amount),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.product_name.clone(),
                    description: Some(request.product_description.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = CheckoutSession::create(&self.client, params)
            .await
            .map_err(classify)?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::Upstream("No checkout URL returned".into()))?;

        Ok(ProviderSession {
            id: session.id.to_string(),
            url,
        })
    }

    fn name(&self) -> &str {
        "stripe"
    }
}
