//! GoTrue-backed `AuthProvider`

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;

use memoria_core::{AuthProvider, AuthUser, Result, StoreError};

use super::{SupabaseClient, SupabaseConfig, status_error};

/// Page size for the admin user listing
const USERS_PER_PAGE: usize = 200;

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserRecord> for AuthUser {
    fn from(u: UserRecord) -> Self {
        AuthUser {
            id: u.id,
            email: u.email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserPage {
    #[serde(default)]
    users: Vec<UserRecord>,
}

fn auth_error(err: &reqwest::Error) -> StoreError {
    StoreError::Auth(format!("auth request failed: {err}"))
}

/// Supabase auth provider
#[derive(Clone, Debug)]
pub struct SupabaseAuth {
    client: SupabaseClient,
}

impl SupabaseAuth {
    pub fn from_config(config: SupabaseConfig) -> Result<Self> {
        Ok(Self {
            client: SupabaseClient::new(config)?,
        })
    }

    async fn users_page(&self, page: usize) -> Result<Vec<UserRecord>> {
        let url = self.client.config.auth_url("admin/users");
        let response = self
            .client
            .service(Method::GET, &url)
            .query(&[("page", page), ("per_page", USERS_PER_PAGE)])
            .send()
            .await
            .map_err(|e| auth_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Auth(status_error(status, &body).to_string()));
        }
        let page: UserPage = response
            .json()
            .await
            .map_err(|e| StoreError::Auth(format!("invalid user listing: {e}")))?;
        Ok(page.users)
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn user_from_token(&self, token: &str) -> Result<Option<AuthUser>> {
        let url = self.client.config.auth_url("user");
        let response = self
            .client
            .user(Method::GET, &url, token)
            .send()
            .await
            .map_err(|e| auth_error(&e))?;

        match response.status() {
            status if status.is_success() => {
                let user: UserRecord = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Auth(format!("invalid user payload: {e}")))?;
                Ok(Some(user.into()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Auth(status_error(status, &body).to_string()))
            }
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<AuthUser>> {
        let wanted = email.trim();
        let mut page = 1;
        loop {
            let users = self.users_page(page).await?;
            let exhausted = users.len() < USERS_PER_PAGE;

            if let Some(user) = users.into_iter().find(|u| {
                u.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(wanted))
            }) {
                return Ok(Some(user.into()));
            }
            if exhausted {
                return Ok(None);
            }
            page += 1;
        }
    }
}
