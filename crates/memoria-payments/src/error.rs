//! Payment Error Types

use memoria_core::StoreError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Missing or invalid caller credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Required request field missing or blank
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced memory or purchase absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Memory has already been paid for
    #[error("Already paid: {0}")]
    AlreadyPaid(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    Signature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Data store operation failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Payment provider call failed (transport, timeout, 5xx, rate limit)
    #[error("Payment provider error: {0}")]
    Upstream(String),

    /// Payment provider refused the request (4xx other than rate limit)
    #[error("Payment provider rejected request: {0}")]
    UpstreamRejected(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else
    #[error("Server error: {0}")]
    Server(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Upstream(_) | PaymentError::Persistence(_))
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Unauthorized(_) => "UNAUTHORIZED",
            PaymentError::Validation(_) => "VALIDATION_ERROR",
            PaymentError::NotFound(_) => "NOT_FOUND",
            PaymentError::AlreadyPaid(_) => "ALREADY_PAID",
            PaymentError::Signature(_) => "INVALID_SIGNATURE",
            PaymentError::WebhookParse(_) => "INVALID_PAYLOAD",
            PaymentError::Persistence(_) => "PERSISTENCE_ERROR",
            PaymentError::Upstream(_) | PaymentError::UpstreamRejected(_) => "UPSTREAM_ERROR",
            PaymentError::Config(_) => "PAYMENTS_DISABLED",
            PaymentError::Server(_) => "SERVER_ERROR",
        }
    }

    /// Message for the `error` field of API responses
    ///
    /// Unexpected and provider failures carry the underlying cause.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Unauthorized(_) => "You need to be signed in to do this.".into(),
            PaymentError::Validation(msg) | PaymentError::NotFound(msg) => msg.clone(),
            PaymentError::AlreadyPaid(_) => "This memory has already been paid for.".into(),
            PaymentError::Signature(_) => "Invalid webhook signature.".into(),
            PaymentError::WebhookParse(_) => "Invalid webhook payload.".into(),
            PaymentError::Config(_) => "Payments are not configured.".into(),
            PaymentError::Persistence(_)
            | PaymentError::Upstream(_)
            | PaymentError::UpstreamRejected(_)
            | PaymentError::Server(_) => self.to_string(),
        }
    }
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => PaymentError::NotFound(what),
            // A rejected service key is not going to heal on retry
            other @ (StoreError::Config(_) | StoreError::InvalidDraft(_)) => {
                PaymentError::Server(other.to_string())
            }
            other => PaymentError::Persistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_persistence() {
        let err: PaymentError = StoreError::Backend("connection reset".into()).into();
        assert!(matches!(err, PaymentError::Persistence(_)));
        assert!(err.is_retryable());

        let err: PaymentError = StoreError::NotFound("memory m1".into()).into();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_store_config_errors_are_server_errors() {
        let err: PaymentError = StoreError::Config("service key rejected (401)".into()).into();
        assert_eq!(err.code(), "SERVER_ERROR");
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("service key rejected"));
    }

    #[test]
    fn test_user_message_keeps_underlying_cause() {
        let err = PaymentError::Persistence("connection refused".into());
        assert_eq!(err.user_message(), "Persistence error: connection refused");

        let err = PaymentError::Upstream("stripe timed out".into());
        assert!(err.user_message().contains("stripe timed out"));

        let err = PaymentError::Unauthorized("token expired".into());
        assert_eq!(err.user_message(), "You need to be signed in to do this.");
    }

    #[test]
    fn test_rejected_requests_are_not_retried() {
        assert!(PaymentError::Upstream("503".into()).is_retryable());
        assert!(!PaymentError::UpstreamRejected("invalid currency".into()).is_retryable());
    }
}
