//! Compensation Queue
//!
//! When the provider has created a checkout session but the pending purchase
//! row could not be written, the write is queued here and retried in the
//! background so the webhook finds a row to reconcile against.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use memoria_core::{NewPurchase, Purchase, ReconciliationStore, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{PaymentError, Result};
use crate::retry::RetryPolicy;

/// A pending-purchase write that still has to reach the store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPurchaseWrite {
    pub session_id: String,
    pub user_id: String,
    pub memory_id: String,
    pub memory_title: String,

    /// When the checkout session behind this write was created
    pub requested_at: DateTime<Utc>,
}

impl PendingPurchaseWrite {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        memory_id: impl Into<String>,
        memory_title: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            memory_id: memory_id.into(),
            memory_title: memory_title.into(),
            requested_at: Utc::now(),
        }
    }
}

/// Reuse the open purchase for `(user, title)` or insert a new pending row
///
/// Shared by the checkout initiator and the compensation worker. An open row
/// touched after the write was requested belongs to a later checkout and is
/// left alone; the write then gets a row of its own.
pub async fn record_pending_purchase(
    store: &dyn ReconciliationStore,
    write: &PendingPurchaseWrite,
) -> memoria_core::Result<Purchase> {
    let reusable = store
        .find_open_purchase(&write.user_id, &write.memory_title)
        .await?
        .filter(|existing| existing.updated_at <= write.requested_at);

    match reusable {
        Some(existing) => {
            tracing::debug!(
                purchase_id = %existing.id,
                previous_session_id = %existing.stripe_session_id,
                session_id = %write.session_id,
                "Reusing open purchase for new checkout session"
            );
            store.repoint_purchase(&existing.id, &write.session_id).await
        }
        None => {
            store
                .insert_purchase(NewPurchase::pending(
                    write.user_id.clone(),
                    write.memory_id.clone(),
                    write.memory_title.clone(),
                    write.session_id.clone(),
                ))
                .await
        }
    }
}

/// Sending half, held by the checkout initiator
#[derive(Clone, Debug)]
pub struct CompensationQueue {
    tx: mpsc::UnboundedSender<PendingPurchaseWrite>,
}

impl CompensationQueue {
    /// Create a queue and the receiver a worker drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PendingPurchaseWrite>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a write; returns false when no worker is listening
    pub fn enqueue(&self, write: PendingPurchaseWrite) -> bool {
        let session_id = write.session_id.clone();
        match self.tx.send(write) {
            Ok(()) => {
                tracing::info!(session_id = %session_id, "Queued purchase write for compensation");
                true
            }
            Err(mpsc::error::SendError(write)) => {
                tracing::error!(
                    session_id = %write.session_id,
                    user_id = %write.user_id,
                    memory_id = %write.memory_id,
                    memory_title = %write.memory_title,
                    "Compensation worker is gone; purchase row needs manual reconciliation"
                );
                false
            }
        }
    }
}

/// Background task retrying queued writes
pub struct CompensationWorker {
    store: Arc<dyn ReconciliationStore>,
    rx: mpsc::UnboundedReceiver<PendingPurchaseWrite>,
    retry: RetryPolicy,
}

impl CompensationWorker {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        rx: mpsc::UnboundedReceiver<PendingPurchaseWrite>,
        retry: RetryPolicy,
    ) -> Self {
        Self { store, rx, retry }
    }

    /// Run on the tokio runtime until every queue handle is dropped
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        while let Some(write) = self.rx.recv().await {
            if let Err(e) = self.process(&write).await {
                tracing::error!(
                    session_id = %write.session_id,
                    user_id = %write.user_id,
                    memory_id = %write.memory_id,
                    memory_title = %write.memory_title,
                    error = %e,
                    "Giving up on purchase write; needs manual reconciliation"
                );
            }
        }
        tracing::debug!("Compensation queue closed");
    }

    /// Apply one write with retries
    pub async fn process(&self, write: &PendingPurchaseWrite) -> Result<()> {
        self.retry
            .run("compensate purchase write", || self.apply_once(write))
            .await
    }

    async fn apply_once(&self, write: &PendingPurchaseWrite) -> Result<()> {
        // The webhook may already have inserted a recovery row for this session.
        if self
            .store
            .find_purchase_by_session(&write.session_id)
            .await?
            .is_some()
        {
            tracing::info!(session_id = %write.session_id, "Purchase row already present");
            return Ok(());
        }

        match record_pending_purchase(self.store.as_ref(), write).await {
            Ok(purchase) => {
                tracing::info!(
                    purchase_id = %purchase.id,
                    session_id = %write.session_id,
                    "Compensated purchase write"
                );
                Ok(())
            }
            Err(StoreError::Conflict(_)) => Ok(()),
            Err(e) => Err(PaymentError::from(e)),
        }
    }
}
