//! Authentication Provider Abstraction
//!
//! Sign-in and sign-up live in the hosted auth service. The backend only
//! needs to resolve a bearer token to a user and to look users up by email.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;

/// An authenticated user as reported by the auth provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,
}

/// Application roles stored in `user_roles`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// Auth provider trait (Strategy pattern)
///
/// `Ok(None)` means "no such user / token not valid"; `Err` means the
/// provider itself could not answer.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve a bearer token to its user
    async fn user_from_token(&self, token: &str) -> Result<Option<AuthUser>>;

    /// Look up a user by email address
    async fn find_user_by_email(&self, email: &str) -> Result<Option<AuthUser>>;
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

/// In-memory auth provider (for development and tests)
#[derive(Default)]
pub struct MemoryAuth {
    by_token: RwLock<HashMap<String, AuthUser>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user reachable through `token`
    pub async fn register(&self, token: impl Into<String>, user: AuthUser) {
        self.by_token.write().await.insert(token.into(), user);
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn user_from_token(&self, token: &str) -> Result<Option<AuthUser>> {
        Ok(self.by_token.read().await.get(token).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<AuthUser>> {
        let users = self.by_token.read().await;
        Ok(users
            .values()
            .find(|u| {
                u.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .cloned())
    }
}
