//! Purchase Records
//!
//! One row per checkout attempt that has not been superseded. A row starts
//! `pending` and is moved to `paid` only by a confirmed webhook delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed price of saving a memory, in centavos (R$ 19,90)
pub const MEMORY_PRICE_CENTS: i64 = 1990;

/// Title used when the provider event carries none
pub const DEFAULT_MEMORY_TITLE: &str = "Memória Afetiva";

/// Purchase lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Paid,
    /// Reserved for a future cancel event; never set by this backend
    Canceled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Paid => "paid",
            PurchaseStatus::Canceled => "canceled",
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, PurchaseStatus::Paid)
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `purchases` row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,

    pub user_id: String,

    /// Denormalized title; the checkout reuse lookup keys on it
    pub memory_title: String,

    /// Memory the purchase pays for, when known
    #[serde(default)]
    pub memory_id: Option<String>,

    /// Provider checkout session id, unique across rows
    pub stripe_session_id: String,

    /// Minor currency units
    pub amount: i64,

    pub status: PurchaseStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Purchase {
    /// Materialize a row from an insert payload
    pub fn from_new(new: NewPurchase) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id,
            memory_title: new.memory_title,
            memory_id: new.memory_id,
            stripe_session_id: new.stripe_session_id,
            amount: new.amount,
            status: new.status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Insert payload for a purchase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchase {
    pub user_id: String,
    pub memory_title: String,
    pub memory_id: Option<String>,
    pub stripe_session_id: String,
    pub amount: i64,
    pub status: PurchaseStatus,
}

impl NewPurchase {
    /// A fresh pending row for a checkout attempt
    pub fn pending(
        user_id: impl Into<String>,
        memory_id: impl Into<String>,
        memory_title: impl Into<String>,
        stripe_session_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            memory_title: memory_title.into(),
            memory_id: Some(memory_id.into()),
            stripe_session_id: stripe_session_id.into(),
            amount: MEMORY_PRICE_CENTS,
            status: PurchaseStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&PurchaseStatus::Paid).unwrap(), "\"paid\"");
        let status: PurchaseStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(status, PurchaseStatus::Pending);
        assert_eq!(PurchaseStatus::Canceled.to_string(), "canceled");
    }

    #[test]
    fn test_pending_purchase_defaults() {
        let purchase = Purchase::from_new(NewPurchase::pending("u1", "m1", "Our trip", "sess_1"));
        assert_eq!(purchase.amount, 1990);
        assert_eq!(purchase.status, PurchaseStatus::Pending);
        assert_eq!(purchase.memory_id.as_deref(), Some("m1"));
        assert!(!purchase.status.is_paid());
    }
}
