//! Mock Payment Provider
//!
//! For testing and local development. Returns scripted session ids and can
//! be told to fail a number of calls first.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use super::{CheckoutSessionRequest, PaymentProvider, ProviderSession};
use crate::error::{PaymentError, Result};

#[derive(Default)]
struct MockState {
    session_ids: VecDeque<String>,
    failures_remaining: u32,
    requests: Vec<CheckoutSessionRequest>,
}

/// Mock provider recording every request it receives
#[derive(Default)]
pub struct MockPaymentProvider {
    state: Mutex<MockState>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out these session ids in order, then random ones
    pub fn with_session_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Mutex::new(MockState {
                session_ids: ids.into_iter().map(Into::into).collect(),
                ..Default::default()
            }),
        }
    }

    /// Fail the next `count` calls with a retryable error
    pub async fn fail_next(&self, count: u32) {
        self.state.lock().await.failures_remaining = count;
    }

    /// Requests received so far (including failed attempts)
    pub async fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.state.lock().await.requests.clone()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<ProviderSession> {
        let mut state = self.state.lock().await;
        state.requests.push(request.clone());

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(PaymentError::Upstream("mock provider unavailable".into()));
        }

        let id = state
            .session_ids
            .pop_front()
            .unwrap_or_else(|| format!("cs_test_{}", uuid::Uuid::new_v4().simple()));

        Ok(ProviderSession {
            url: format!("https://checkout.stripe.com/c/pay/{id}"),
            id,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
