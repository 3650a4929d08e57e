//! Memory Records
//!
//! A memory is the thing a user builds in the wizard and pays to keep.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of photos attached to one memory
pub const MAX_PHOTOS: usize = 10;

/// A persisted memory (`memories` row plus its ordered `memory_photos`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    /// Server-assigned identifier
    pub id: String,

    /// Owner
    pub user_id: String,

    pub title: String,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub date: Option<NaiveDate>,

    #[serde(default)]
    pub emoji: String,

    /// Opaque reference to the linked song
    #[serde(default)]
    pub spotify_link: String,

    /// Externally hosted photo URLs, in display order
    #[serde(default)]
    pub photos: Vec<String>,

    /// Flipped exactly once, by a confirmed payment
    #[serde(default)]
    pub is_paid: bool,

    pub created_at: DateTime<Utc>,
}

impl Memory {
    /// Materialize a new unpaid memory with a fresh id
    pub fn from_new(new: NewMemory) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id,
            title: new.title,
            text: new.text,
            date: new.date,
            emoji: new.emoji,
            spotify_link: new.spotify_link,
            photos: new.photos,
            is_paid: false,
            created_at: Utc::now(),
        }
    }

    /// Whether `user_id` owns this memory
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Insert payload for a memory. `is_paid` is always false on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMemory {
    pub user_id: String,
    pub title: String,
    pub text: String,
    pub date: Option<NaiveDate>,
    pub emoji: String,
    pub spotify_link: String,
    pub photos: Vec<String>,
}
