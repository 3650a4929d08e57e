//! Application State

use std::sync::Arc;

use memoria_core::{AuthProvider, ReconciliationStore};
use memoria_payments::{CheckoutInitiator, WebhookHandler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Memories, purchases and roles
    pub store: Arc<dyn ReconciliationStore>,

    /// Bearer token resolution and user lookup
    pub auth: Arc<dyn AuthProvider>,

    /// Checkout initiator (None if the payment provider is not configured)
    pub checkout: Option<Arc<CheckoutInitiator>>,

    pub webhook: Arc<WebhookHandler>,

    /// "supabase" or "memory", reported by the health check
    pub store_backend: &'static str,
}
