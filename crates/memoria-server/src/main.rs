//! Memórias Afetivas HTTP Server
//!
//! Axum server exposing checkout creation, the Stripe webhook and the
//! admin-role grant on top of either Supabase or the in-memory store.

mod config;
mod handlers;
mod router;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memoria_core::{AuthProvider, MemoryAuth, MemoryStore, ReconciliationStore};
use memoria_payments::{
    CheckoutInitiator, CompensationQueue, CompensationWorker, StripeProvider, WebhookHandler,
};
use memoria_runtime::{SupabaseAuth, SupabaseStore};

use crate::config::ServerConfig;
use crate::router::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    // Initialize store and auth
    let (store, auth, store_backend): (Arc<dyn ReconciliationStore>, Arc<dyn AuthProvider>, &'static str) =
        match config.supabase.clone() {
            Some(supabase) => {
                tracing::info!("✓ Supabase configured at {}", supabase.url);
                let store: Arc<dyn ReconciliationStore> =
                    Arc::new(SupabaseStore::from_config(supabase.clone())?);
                let auth: Arc<dyn AuthProvider> = Arc::new(SupabaseAuth::from_config(supabase)?);
                (store, auth, "supabase")
            }
            None => {
                tracing::warn!("⚠ Supabase not configured - using in-memory store");
                tracing::warn!("  Set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY in .env");
                let store: Arc<dyn ReconciliationStore> = Arc::new(MemoryStore::new());
                let auth: Arc<dyn AuthProvider> = Arc::new(MemoryAuth::new());
                (store, auth, "memory")
            }
        };

    // Initialize payments
    let checkout = match StripeProvider::from_env() {
        Ok(provider) => {
            tracing::info!("✓ Stripe configured");
            let (queue, rx) = CompensationQueue::channel();
            CompensationWorker::new(store.clone(), rx, config.retry.clone()).spawn();

            Some(Arc::new(
                CheckoutInitiator::new(Arc::new(provider), store.clone(), config.checkout.clone())
                    .with_retry(config.retry.clone())
                    .with_compensation(queue),
            ))
        }
        Err(e) => {
            tracing::warn!("⚠ Stripe not configured - payments disabled ({})", e);
            tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
            None
        }
    };

    let webhook = Arc::new(WebhookHandler::new(store.clone(), config.webhook.clone()));

    // Build application state
    let state = AppState {
        store,
        auth,
        checkout,
        webhook,
        store_backend,
    };

    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 memoria server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  POST /create-payment  - Create Stripe checkout for a memory");
    tracing::info!("  POST /webhook-stripe  - Stripe webhook receiver");
    tracing::info!("  POST /add-admin       - Grant admin role by email");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
