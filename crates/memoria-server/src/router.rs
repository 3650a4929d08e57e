//! Router Assembly

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{add_admin, create_payment, health_check, stripe_webhook};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // Browser clients call from the site origin; the webhook has no origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/create-payment", post(create_payment))
        .route("/webhook-stripe", post(stripe_webhook))
        .route("/add-admin", post(add_admin))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
