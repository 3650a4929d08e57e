//! # memoria-runtime
//!
//! Hosted integrations behind the `memoria-core` seams.
//!
//! ## Backends
//!
//! - **Supabase store**: `ReconciliationStore` over the PostgREST API
//! - **Supabase auth**: `AuthProvider` over the GoTrue API
//!
//! Both authenticate with the service-role key and are only constructed when
//! `SUPABASE_URL` and `SUPABASE_SERVICE_ROLE_KEY` are set.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use memoria_runtime::{SupabaseAuth, SupabaseConfig, SupabaseStore};
//!
//! if let Some(config) = SupabaseConfig::from_env() {
//!     let store = Arc::new(SupabaseStore::from_config(config.clone())?);
//!     let auth = Arc::new(SupabaseAuth::from_config(config)?);
//! }
//! ```

pub mod supabase;

pub use supabase::{SupabaseAuth, SupabaseConfig, SupabaseStore};

// Re-export core types for convenience
pub use memoria_core::{AuthProvider, ReconciliationStore, Result, StoreError};
