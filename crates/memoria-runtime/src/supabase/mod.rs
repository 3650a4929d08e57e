//! Supabase Integration
//!
//! Shared configuration and HTTP plumbing for the PostgREST store and the
//! GoTrue auth provider.

mod auth;
mod store;

pub use auth::SupabaseAuth;
pub use store::SupabaseStore;

use std::time::Duration;

use memoria_core::{Result, StoreError};
use reqwest::{Method, RequestBuilder, StatusCode};

/// Supabase project configuration
#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,

    /// Service-role key; bypasses row level security
    pub service_key: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            timeout_secs: 10,
        }
    }

    /// `None` unless both `SUPABASE_URL` and `SUPABASE_SERVICE_ROLE_KEY` are set
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("SUPABASE_URL").ok().filter(|v| !v.trim().is_empty())?;
        let key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        let timeout_secs = std::env::var("SUPABASE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Some(Self {
            timeout_secs,
            ..Self::new(url.trim(), key.trim())
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.url)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path.trim_start_matches('/'))
    }
}

/// Thin `reqwest` wrapper that stamps the project credentials on each call
#[derive(Clone, Debug)]
struct SupabaseClient {
    http: reqwest::Client,
    config: SupabaseConfig,
}

impl SupabaseClient {
    fn new(config: SupabaseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Request authorized as the service role
    fn service(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    /// Request authorized as the end user holding `token`
    fn user(&self, method: Method, url: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.config.service_key)
            .bearer_auth(token)
    }
}

/// PostgREST equality filter value
fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// Map a non-success response to a store error
fn status_error(status: StatusCode, body: &str) -> StoreError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    match status {
        StatusCode::CONFLICT => StoreError::Conflict(detail),
        StatusCode::NOT_FOUND => StoreError::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Config(format!("service key rejected ({detail})"))
        }
        _ => StoreError::Backend(detail),
    }
}

fn transport_error(err: &reqwest::Error) -> StoreError {
    StoreError::Backend(format!("request failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let config = SupabaseConfig::new("https://xyz.supabase.co/", "service");
        assert_eq!(config.rest_url("purchases"), "https://xyz.supabase.co/rest/v1/purchases");
        assert_eq!(config.auth_url("/user"), "https://xyz.supabase.co/auth/v1/user");
        assert_eq!(config.auth_url("admin/users"), "https://xyz.supabase.co/auth/v1/admin/users");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::CONFLICT, "duplicate key"),
            StoreError::Conflict(_)
        ));
        assert!(matches!(status_error(StatusCode::UNAUTHORIZED, ""), StoreError::Config(_)));
        let err = status_error(StatusCode::BAD_GATEWAY, "");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_eq_filter() {
        assert_eq!(eq("sess_1"), "eq.sess_1");
    }
}
