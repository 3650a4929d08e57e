//! Server Configuration

use memoria_payments::{CheckoutConfig, RetryPolicy, WebhookConfig};
use memoria_runtime::SupabaseConfig;

/// Everything `main` reads from the environment
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub checkout: CheckoutConfig,
    pub retry: RetryPolicy,
    pub webhook: WebhookConfig,

    /// Hosted backend; `None` runs on the in-memory store
    pub supabase: Option<SupabaseConfig>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            checkout: CheckoutConfig::from_env(),
            retry: RetryPolicy::from_env(),
            webhook: WebhookConfig::from_env(),
            supabase: SupabaseConfig::from_env(),
        }
    }
}
