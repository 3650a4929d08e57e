//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

use memoria_core::{Role, StoreError};
use memoria_payments::{
    CreatePaymentRequest, CreatePaymentResponse, PaymentError, WebhookReceipt, authenticate,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub store_backend: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddAdminRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddAdminResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

/// Map a payment error to its HTTP status and `{ error, code }` body
pub fn payment_error(err: &PaymentError) -> ApiError {
    let status = match err {
        PaymentError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        PaymentError::Validation(_)
        | PaymentError::Signature(_)
        | PaymentError::WebhookParse(_) => StatusCode::BAD_REQUEST,
        PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
        PaymentError::AlreadyPaid(_) => StatusCode::CONFLICT,
        PaymentError::Persistence(_) | PaymentError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PaymentError::Upstream(_) | PaymentError::UpstreamRejected(_) => StatusCode::BAD_GATEWAY,
        PaymentError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    api_error(status, err.user_message(), err.code())
}

fn store_failure(err: &StoreError) -> ApiError {
    tracing::error!(error = %err, "Failed to update administrators");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to add administrator",
        "SERVER_ERROR",
    )
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.checkout.is_some(),
        store_backend: state.store_backend,
    })
}

/// Create a hosted checkout session for one of the caller's memories
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CreatePaymentResponse>, ApiError> {
    let checkout = state.checkout.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    let user = authenticate(state.auth.as_ref(), header_str(&headers, "authorization"))
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Rejected unauthenticated checkout");
            payment_error(&e)
        })?;

    let request: CreatePaymentRequest = if body.is_empty() {
        CreatePaymentRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            payment_error(&PaymentError::Validation(format!("invalid request body: {e}")))
        })?
    };

    let response = checkout
        .initiate(&user, request, header_str(&headers, "origin"))
        .await
        .map_err(|e| {
            if e.is_retryable() || matches!(e, PaymentError::Server(_) | PaymentError::Config(_)) {
                tracing::error!(user_id = %user.id, error = %e, "Checkout failed");
            } else {
                tracing::info!(user_id = %user.id, error = %e, "Checkout rejected");
            }
            payment_error(&e)
        })?;

    Ok(Json(response))
}

/// Stripe webhook receiver
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookReceipt>, ApiError> {
    let signature = header_str(&headers, "stripe-signature");

    let receipt = state.webhook.receive(&body, signature).await.map_err(|e| {
        tracing::warn!(error = %e, "Rejected webhook delivery");
        payment_error(&e)
    })?;

    Ok(Json(receipt))
}

/// Grant the admin role to the user with the given email
///
/// The first administrator can be granted by any signed-in user; after that
/// only administrators may add more.
pub async fn add_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AddAdminResponse>, ApiError> {
    let caller = authenticate(state.auth.as_ref(), header_str(&headers, "authorization"))
        .await
        .map_err(|e| payment_error(&e))?;

    let request: AddAdminRequest = serde_json::from_slice(&body).unwrap_or_default();
    let email = request
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Email is required", "VALIDATION_ERROR"))?;

    let admins = state
        .store
        .count_role(Role::Admin)
        .await
        .map_err(|e| store_failure(&e))?;
    if admins > 0
        && !state
            .store
            .has_role(&caller.id, Role::Admin)
            .await
            .map_err(|e| store_failure(&e))?
    {
        tracing::warn!(user_id = %caller.id, "Non-admin attempted to add an administrator");
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "Only administrators can add new administrators",
            "FORBIDDEN",
        ));
    }

    let target = state
        .auth
        .find_user_by_email(&email)
        .await
        .map_err(|e| store_failure(&e))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "User not found", "NOT_FOUND"))?;

    if state
        .store
        .has_role(&target.id, Role::Admin)
        .await
        .map_err(|e| store_failure(&e))?
    {
        return Ok(Json(AddAdminResponse {
            success: None,
            message: "User is already an administrator".into(),
        }));
    }

    state
        .store
        .grant_role(&target.id, Role::Admin)
        .await
        .map_err(|e| store_failure(&e))?;

    tracing::info!(granted_by = %caller.id, user_id = %target.id, "Granted admin role");

    Ok(Json(AddAdminResponse {
        success: Some(true),
        message: "User added as administrator".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_failures_carry_their_cause() {
        let (status, Json(body)) = payment_error(&PaymentError::Persistence("connection refused".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "PERSISTENCE_ERROR");
        assert!(body.error.contains("connection refused"));

        let (status, Json(body)) = payment_error(&PaymentError::Upstream("stripe timed out".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.error.contains("stripe timed out"));

        let (status, Json(body)) = payment_error(&PaymentError::Server("auth service returned 503".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "SERVER_ERROR");
        assert!(body.error.contains("auth service returned 503"));
    }

    #[test]
    fn test_client_errors_keep_friendly_messages() {
        let (status, Json(body)) = payment_error(&PaymentError::Validation("memoryId is required".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "memoryId is required");

        let (status, Json(body)) = payment_error(&PaymentError::Unauthorized("missing bearer token".into()));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.code, "UNAUTHORIZED");
    }
}
