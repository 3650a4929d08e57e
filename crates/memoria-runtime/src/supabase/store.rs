//! PostgREST-backed `ReconciliationStore`
//!
//! Conditional transitions are single `PATCH` requests filtered on the
//! current state (`is_paid=eq.false`, `status=neq.paid`) with
//! `Prefer: return=representation`; an empty representation means the filter
//! matched nothing, and a follow-up read tells "already done" from "absent".

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Method, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::json;

use memoria_core::{
    ConditionalUpdate, Memory, NewMemory, NewPurchase, Purchase, PurchaseStatus,
    ReconciliationStore, Result, Role, StoreError,
};

use super::{SupabaseClient, SupabaseConfig, eq, status_error, transport_error};

const MEMORY_SELECT: &str =
    "id,user_id,title,text,date,emoji,spotify_link,is_paid,created_at,memory_photos(photo_url,position)";

const RETURN_REPRESENTATION: &str = "return=representation";

/// `memories` row with embedded `memory_photos`
#[derive(Debug, Deserialize)]
struct MemoryRow {
    id: String,
    user_id: String,
    title: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    emoji: Option<String>,
    #[serde(default)]
    spotify_link: Option<String>,
    #[serde(default)]
    is_paid: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    memory_photos: Vec<PhotoRow>,
}

#[derive(Debug, Deserialize)]
struct PhotoRow {
    photo_url: String,
    #[serde(default)]
    position: i32,
}

impl MemoryRow {
    fn into_memory(mut self) -> Memory {
        self.memory_photos.sort_by_key(|p| p.position);
        Memory {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            text: self.text.unwrap_or_default(),
            date: self.date,
            emoji: self.emoji.unwrap_or_default(),
            spotify_link: self.spotify_link.unwrap_or_default(),
            photos: self.memory_photos.into_iter().map(|p| p.photo_url).collect(),
            is_paid: self.is_paid,
            created_at: self.created_at,
        }
    }
}

#[derive(Serialize)]
struct MemoryInsert<'a> {
    id: &'a str,
    user_id: &'a str,
    title: &'a str,
    text: &'a str,
    date: Option<NaiveDate>,
    emoji: &'a str,
    spotify_link: &'a str,
    is_paid: bool,
    created_at: DateTime<Utc>,
}

impl<'a> From<&'a Memory> for MemoryInsert<'a> {
    fn from(m: &'a Memory) -> Self {
        Self {
            id: &m.id,
            user_id: &m.user_id,
            title: &m.title,
            text: &m.text,
            date: m.date,
            emoji: &m.emoji,
            spotify_link: &m.spotify_link,
            is_paid: m.is_paid,
            created_at: m.created_at,
        }
    }
}

#[derive(Serialize)]
struct PhotoInsert<'a> {
    memory_id: &'a str,
    photo_url: &'a str,
    position: usize,
}

/// Send and decode a JSON array response
async fn send_rows<T: DeserializeOwned>(request: RequestBuilder) -> Result<Vec<T>> {
    let response = request.send().await.map_err(|e| transport_error(&e))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    response
        .json::<Vec<T>>()
        .await
        .map_err(|e| StoreError::Backend(format!("invalid response body: {e}")))
}

/// Send a request whose body is not needed
async fn send_empty(request: RequestBuilder) -> Result<()> {
    let response = request.send().await.map_err(|e| transport_error(&e))?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

/// Supabase PostgREST store
#[derive(Clone, Debug)]
pub struct SupabaseStore {
    client: SupabaseClient,
}

impl SupabaseStore {
    pub fn from_config(config: SupabaseConfig) -> Result<Self> {
        Ok(Self {
            client: SupabaseClient::new(config)?,
        })
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.client.service(method, &self.client.config.rest_url(table))
    }

    /// Undo a memory insert whose photos could not be stored
    async fn delete_memory_row(&self, id: &str) {
        let id = eq(id);
        let deleted = send_empty(
            self.table(Method::DELETE, "memories")
                .query(&[("id", id.as_str())]),
        )
        .await;
        if let Err(e) = deleted {
            tracing::error!(filter = %id, error = %e, "Orphaned memory row left behind");
        }
    }
}

#[async_trait]
impl ReconciliationStore for SupabaseStore {
    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let id = eq(id);
        let rows: Vec<MemoryRow> = send_rows(
            self.table(Method::GET, "memories")
                .query(&[("select", MEMORY_SELECT), ("id", id.as_str()), ("limit", "1")]),
        )
        .await?;
        Ok(rows.into_iter().next().map(MemoryRow::into_memory))
    }

    async fn insert_memory(&self, memory: NewMemory) -> Result<Memory> {
        let memory = Memory::from_new(memory);
        send_empty(
            self.table(Method::POST, "memories")
                .header("Prefer", "return=minimal")
                .json(&MemoryInsert::from(&memory)),
        )
        .await?;

        if !memory.photos.is_empty() {
            let photos: Vec<PhotoInsert<'_>> = memory
                .photos
                .iter()
                .enumerate()
                .map(|(position, url)| PhotoInsert {
                    memory_id: &memory.id,
                    photo_url: url,
                    position,
                })
                .collect();
            if let Err(e) = send_empty(
                self.table(Method::POST, "memory_photos")
                    .header("Prefer", "return=minimal")
                    .json(&photos),
            )
            .await
            {
                tracing::error!(memory_id = %memory.id, error = %e, "Photo insert failed; removing memory row");
                self.delete_memory_row(&memory.id).await;
                return Err(e);
            }
        }

        tracing::debug!(memory_id = %memory.id, photos = memory.photos.len(), "Inserted memory");
        Ok(memory)
    }

    async fn mark_memory_paid(&self, id: &str, user_id: &str) -> Result<ConditionalUpdate> {
        let id = eq(id);
        let user_id = eq(user_id);
        let changed: Vec<IgnoredAny> = send_rows(
            self.table(Method::PATCH, "memories")
                .query(&[
                    ("id", id.as_str()),
                    ("user_id", user_id.as_str()),
                    ("is_paid", "eq.false"),
                    ("select", "id"),
                ])
                .header("Prefer", RETURN_REPRESENTATION)
                .json(&json!({ "is_paid": true })),
        )
        .await?;
        if !changed.is_empty() {
            return Ok(ConditionalUpdate::Applied);
        }

        let existing: Vec<IgnoredAny> = send_rows(self.table(Method::GET, "memories").query(&[
            ("id", id.as_str()),
            ("user_id", user_id.as_str()),
            ("select", "id"),
        ]))
        .await?;
        Ok(if existing.is_empty() {
            ConditionalUpdate::Missing
        } else {
            ConditionalUpdate::Unchanged
        })
    }

    async fn find_purchase_by_session(&self, session_id: &str) -> Result<Option<Purchase>> {
        let session_id = eq(session_id);
        let rows: Vec<Purchase> = send_rows(self.table(Method::GET, "purchases").query(&[
            ("select", "*"),
            ("stripe_session_id", session_id.as_str()),
            ("limit", "1"),
        ]))
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_open_purchase(&self, user_id: &str, memory_title: &str) -> Result<Option<Purchase>> {
        let user_id = eq(user_id);
        let memory_title = eq(memory_title);
        let rows: Vec<Purchase> = send_rows(self.table(Method::GET, "purchases").query(&[
            ("select", "*"),
            ("user_id", user_id.as_str()),
            ("memory_title", memory_title.as_str()),
            ("status", "neq.paid"),
            ("order", "created_at.desc"),
            ("limit", "1"),
        ]))
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_purchase(&self, purchase: NewPurchase) -> Result<Purchase> {
        let purchase = Purchase::from_new(purchase);
        let rows: Vec<Purchase> = send_rows(
            self.table(Method::POST, "purchases")
                .header("Prefer", RETURN_REPRESENTATION)
                .json(&purchase),
        )
        .await?;
        Ok(rows.into_iter().next().unwrap_or(purchase))
    }

    async fn repoint_purchase(&self, purchase_id: &str, session_id: &str) -> Result<Purchase> {
        let id = eq(purchase_id);
        let rows: Vec<Purchase> = send_rows(
            self.table(Method::PATCH, "purchases")
                .query(&[("id", id.as_str()), ("select", "*")])
                .header("Prefer", RETURN_REPRESENTATION)
                .json(&json!({
                    "stripe_session_id": session_id,
                    "status": PurchaseStatus::Pending,
                    "updated_at": Utc::now(),
                })),
        )
        .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("purchase {purchase_id}")))
    }

    async fn mark_purchase_paid(&self, session_id: &str) -> Result<ConditionalUpdate> {
        let filter = eq(session_id);
        let changed: Vec<IgnoredAny> = send_rows(
            self.table(Method::PATCH, "purchases")
                .query(&[
                    ("stripe_session_id", filter.as_str()),
                    ("status", "neq.paid"),
                    ("select", "id"),
                ])
                .header("Prefer", RETURN_REPRESENTATION)
                .json(&json!({ "status": PurchaseStatus::Paid, "updated_at": Utc::now() })),
        )
        .await?;
        if !changed.is_empty() {
            return Ok(ConditionalUpdate::Applied);
        }

        Ok(match self.find_purchase_by_session(session_id).await? {
            Some(_) => ConditionalUpdate::Unchanged,
            None => ConditionalUpdate::Missing,
        })
    }

    async fn has_role(&self, user_id: &str, role: Role) -> Result<bool> {
        let user_id = eq(user_id);
        let role = eq(role.as_str());
        let rows: Vec<IgnoredAny> = send_rows(self.table(Method::GET, "user_roles").query(&[
            ("select", "user_id"),
            ("user_id", user_id.as_str()),
            ("role", role.as_str()),
            ("limit", "1"),
        ]))
        .await?;
        Ok(!rows.is_empty())
    }

    async fn count_role(&self, role: Role) -> Result<usize> {
        let role = eq(role.as_str());
        let rows: Vec<IgnoredAny> = send_rows(
            self.table(Method::GET, "user_roles")
                .query(&[("select", "user_id"), ("role", role.as_str())]),
        )
        .await?;
        Ok(rows.len())
    }

    async fn grant_role(&self, user_id: &str, role: Role) -> Result<()> {
        send_empty(
            self.table(Method::POST, "user_roles")
                .query(&[("on_conflict", "user_id,role")])
                .header("Prefer", "resolution=ignore-duplicates,return=minimal")
                .json(&json!({ "user_id": user_id, "role": role })),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_memory_row_orders_photos() {
        let row: MemoryRow = serde_json::from_value(json!({
            "id": "m1",
            "user_id": "u1",
            "title": "Our trip",
            "text": null,
            "date": "2024-02-10",
            "is_paid": false,
            "created_at": "2024-02-10T12:00:00.123456+00:00",
            "memory_photos": [
                {"photo_url": "b.jpg", "position": 1},
                {"photo_url": "a.jpg", "position": 0}
            ]
        }))
        .unwrap();

        let memory = row.into_memory();
        assert_eq!(memory.photos, vec!["a.jpg", "b.jpg"]);
        assert_eq!(memory.text, "");
        assert_eq!(memory.date, NaiveDate::from_ymd_opt(2024, 2, 10));
    }

    #[test]
    fn test_memory_insert_omits_photos() {
        let memory = Memory::from_new(NewMemory {
            user_id: "u1".into(),
            title: "Our trip".into(),
            photos: vec!["a.jpg".into()],
            ..Default::default()
        });
        let body = serde_json::to_value(MemoryInsert::from(&memory)).unwrap();
        assert_eq!(body["is_paid"], false);
        assert!(body.get("photos").is_none());
    }

    /// PostgREST stand-in: PATCH matches nothing, GET finds the row only for `sess_paid`
    async fn stub_store() -> SupabaseStore {
        async fn patch() -> Json<Vec<serde_json::Value>> {
            Json(Vec::new())
        }
        async fn list(Query(q): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
            if q.get("stripe_session_id").map(String::as_str) == Some("eq.sess_paid") {
                Json(json!([{
                    "id": "p1",
                    "user_id": "u1",
                    "memory_title": "Our trip",
                    "stripe_session_id": "sess_paid",
                    "amount": 1990,
                    "status": "paid",
                    "created_at": "2024-02-10T12:00:00+00:00",
                    "updated_at": "2024-02-10T12:00:00+00:00"
                }]))
            } else {
                Json(json!([]))
            }
        }

        let app = Router::new().route("/rest/v1/purchases", get(list).patch(patch));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        SupabaseStore::from_config(SupabaseConfig::new(format!("http://{addr}"), "service")).unwrap()
    }

    #[tokio::test]
    async fn test_failed_photo_insert_removes_memory_row() {
        type Log = Arc<Mutex<Vec<String>>>;

        async fn insert_memory(State(log): State<Log>) -> StatusCode {
            log.lock().unwrap().push("insert memory".into());
            StatusCode::CREATED
        }
        async fn insert_photos() -> StatusCode {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        async fn delete_memory(
            State(log): State<Log>,
            Query(q): Query<HashMap<String, String>>,
        ) -> StatusCode {
            log.lock().unwrap().push(format!("delete {}", q["id"]));
            StatusCode::NO_CONTENT
        }

        let log: Log = Arc::default();
        let app = Router::new()
            .route("/rest/v1/memories", post(insert_memory).delete(delete_memory))
            .route("/rest/v1/memory_photos", post(insert_photos))
            .with_state(log.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        let store =
            SupabaseStore::from_config(SupabaseConfig::new(format!("http://{addr}"), "service")).unwrap();

        let result = store
            .insert_memory(NewMemory {
                user_id: "u1".into(),
                title: "Our trip".into(),
                photos: vec!["a.jpg".into()],
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(StoreError::Backend(_))));
        let log = log.lock().unwrap().clone();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], "insert memory");
        assert!(log[1].starts_with("delete eq."));
    }

    #[tokio::test]
    async fn test_mark_purchase_paid_distinguishes_unchanged_from_missing() {
        let store = stub_store().await;

        assert_eq!(
            store.mark_purchase_paid("sess_paid").await.unwrap(),
            ConditionalUpdate::Unchanged
        );
        assert_eq!(
            store.mark_purchase_paid("sess_unknown").await.unwrap(),
            ConditionalUpdate::Missing
        );

        let purchase = store.find_purchase_by_session("sess_paid").await.unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Paid);
        assert_eq!(purchase.memory_id, None);
    }
}
