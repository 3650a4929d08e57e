//! Reconciliation Store
//!
//! The `memories`, `memory_photos`, `purchases` and `user_roles` tables as
//! seen by the checkout initiator and the webhook handler.
//!
//! State transitions that the webhook drives are exposed as single
//! conditional writes ("update ... where status != target") so duplicate
//! deliveries racing each other cannot both observe a change.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::auth::Role;
use crate::error::{Result, StoreError};
use crate::memory::{Memory, NewMemory};
use crate::purchase::{NewPurchase, Purchase, PurchaseStatus};

/// Outcome of a conditional write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionalUpdate {
    /// The row matched and was changed
    Applied,
    /// The row exists but was already in the target state
    Unchanged,
    /// No row matched the key
    Missing,
}

/// Data store trait (Strategy pattern)
///
/// Implemented by the in-memory store below and by the hosted REST store.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Fetch a memory with its photos
    async fn get_memory(&self, id: &str) -> Result<Option<Memory>>;

    /// Insert an unpaid memory, assigning its id
    async fn insert_memory(&self, memory: NewMemory) -> Result<Memory>;

    /// Set `is_paid = true` where `id` and `user_id` match and it is not yet paid
    async fn mark_memory_paid(&self, id: &str, user_id: &str) -> Result<ConditionalUpdate>;

    /// Fetch the purchase for a checkout session
    async fn find_purchase_by_session(&self, session_id: &str) -> Result<Option<Purchase>>;

    /// Most recent purchase for `(user_id, memory_title)` that is not yet paid
    async fn find_open_purchase(&self, user_id: &str, memory_title: &str) -> Result<Option<Purchase>>;

    /// Insert a purchase; `Conflict` if the session id is taken
    async fn insert_purchase(&self, purchase: NewPurchase) -> Result<Purchase>;

    /// Point an existing purchase at a new checkout session and reset it to pending
    async fn repoint_purchase(&self, purchase_id: &str, session_id: &str) -> Result<Purchase>;

    /// Set `status = paid` where the session id matches and it is not yet paid
    async fn mark_purchase_paid(&self, session_id: &str) -> Result<ConditionalUpdate>;

    /// Whether the user holds `role`
    async fn has_role(&self, user_id: &str, role: Role) -> Result<bool>;

    /// Number of users holding `role`
    async fn count_role(&self, role: Role) -> Result<usize>;

    /// Grant `role` to the user (no-op when already granted)
    async fn grant_role(&self, user_id: &str, role: Role) -> Result<()>;
}

#[derive(Default)]
struct Tables {
    memories: HashMap<String, Memory>,
    purchases: HashMap<String, Purchase>,
    roles: HashSet<(String, Role)>,
}

/// In-memory store (for development and tests)
///
/// A single lock guards all tables, so every conditional write is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every purchase row
    pub async fn all_purchases(&self) -> Vec<Purchase> {
        self.tables.read().await.purchases.values().cloned().collect()
    }

    /// Number of purchase rows
    pub async fn purchase_count(&self) -> usize {
        self.tables.read().await.purchases.len()
    }
}

#[async_trait]
impl ReconciliationStore for MemoryStore {
    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        Ok(self.tables.read().await.memories.get(id).cloned())
    }

    async fn insert_memory(&self, memory: NewMemory) -> Result<Memory> {
        let memory = Memory::from_new(memory);
        let mut tables = self.tables.write().await;
        tables.memories.insert(memory.id.clone(), memory.clone());
        Ok(memory)
    }

    async fn mark_memory_paid(&self, id: &str, user_id: &str) -> Result<ConditionalUpdate> {
        let mut tables = self.tables.write().await;
        match tables.memories.get_mut(id) {
            Some(memory) if memory.user_id == user_id => {
                if memory.is_paid {
                    Ok(ConditionalUpdate::Unchanged)
                } else {
                    memory.is_paid = true;
                    Ok(ConditionalUpdate::Applied)
                }
            }
            _ => Ok(ConditionalUpdate::Missing),
        }
    }

    async fn find_purchase_by_session(&self, session_id: &str) -> Result<Option<Purchase>> {
        let tables = self.tables.read().await;
        Ok(tables
            .purchases
            .values()
            .find(|p| p.stripe_session_id == session_id)
            .cloned())
    }

    async fn find_open_purchase(&self, user_id: &str, memory_title: &str) -> Result<Option<Purchase>> {
        let tables = self.tables.read().await;
        Ok(tables
            .purchases
            .values()
            .filter(|p| p.user_id == user_id && p.memory_title == memory_title && !p.status.is_paid())
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn insert_purchase(&self, purchase: NewPurchase) -> Result<Purchase> {
        let mut tables = self.tables.write().await;
        if tables
            .purchases
            .values()
            .any(|p| p.stripe_session_id == purchase.stripe_session_id)
        {
            return Err(StoreError::Conflict(format!(
                "purchase for session {} already exists",
                purchase.stripe_session_id
            )));
        }

        let purchase = Purchase::from_new(purchase);
        tables.purchases.insert(purchase.id.clone(), purchase.clone());
        Ok(purchase)
    }

    async fn repoint_purchase(&self, purchase_id: &str, session_id: &str) -> Result<Purchase> {
        let mut tables = self.tables.write().await;
        if tables
            .purchases
            .values()
            .any(|p| p.stripe_session_id == session_id && p.id != purchase_id)
        {
            return Err(StoreError::Conflict(format!(
                "purchase for session {session_id} already exists"
            )));
        }

        let purchase = tables
            .purchases
            .get_mut(purchase_id)
            .ok_or_else(|| StoreError::NotFound(format!("purchase {purchase_id}")))?;
        purchase.stripe_session_id = session_id.to_string();
        purchase.status = PurchaseStatus::Pending;
        purchase.touch();
        Ok(purchase.clone())
    }

    async fn mark_purchase_paid(&self, session_id: &str) -> Result<ConditionalUpdate> {
        let mut tables = self.tables.write().await;
        let Some(purchase) = tables
            .purchases
            .values_mut()
            .find(|p| p.stripe_session_id == session_id)
        else {
            return Ok(ConditionalUpdate::Missing);
        };

        if purchase.status.is_paid() {
            return Ok(ConditionalUpdate::Unchanged);
        }
        purchase.status = PurchaseStatus::Paid;
        purchase.touch();
        Ok(ConditionalUpdate::Applied)
    }

    async fn has_role(&self, user_id: &str, role: Role) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.roles.contains(&(user_id.to_string(), role)))
    }

    async fn count_role(&self, role: Role) -> Result<usize> {
        let tables = self.tables.read().await;
        Ok(tables.roles.iter().filter(|(_, r)| *r == role).count())
    }

    async fn grant_role(&self, user_id: &str, role: Role) -> Result<()> {
        self.tables.write().await.roles.insert((user_id.to_string(), role));
        Ok(())
    }
}
