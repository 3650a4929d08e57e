//! # memoria-core
//!
//! Domain model and storage abstractions for Memórias Afetivas.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      memoria-core                             │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌────────────────┐   │
//! │  │ WizardContext│  │ReconciliationStore│  │  AuthProvider  │   │
//! │  │   (draft)    │──│    (Strategy)     │  │   (Strategy)   │   │
//! │  └──────────────┘  └──────────────────┘  └────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store and auth traits let the payment flow run against the hosted
//! backend or the in-memory implementations without code changes.

pub mod auth;
pub mod draft;
pub mod error;
pub mod memory;
pub mod purchase;
pub mod store;

pub use auth::{AuthProvider, AuthUser, MemoryAuth, Role, bearer_token};
pub use draft::{MemoryDraft, WizardContext, WizardStep};
pub use error::{Result, StoreError};
pub use memory::{MAX_PHOTOS, Memory, NewMemory};
pub use purchase::{DEFAULT_MEMORY_TITLE, MEMORY_PRICE_CENTS, NewPurchase, Purchase, PurchaseStatus};
pub use store::{ConditionalUpdate, MemoryStore, ReconciliationStore};
