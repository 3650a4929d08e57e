//! Memory Draft Store
//!
//! Wizard state for building a memory before it is saved. The context is an
//! explicit value handed to each step; nothing here is global.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::memory::{MAX_PHOTOS, Memory, NewMemory};
use crate::store::ReconciliationStore;

/// Wizard steps, in order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    BasicInfo = 1,
    Photos = 2,
    MusicEmoji = 3,
    Preview = 4,
    Share = 5,
    Payment = 6,
}

impl WizardStep {
    pub const FIRST: u8 = 1;
    pub const LAST: u8 = 6;

    /// Map a step number to a step, clamping into `[FIRST, LAST]`
    pub fn clamped(step: i32) -> Self {
        match step.clamp(i32::from(Self::FIRST), i32::from(Self::LAST)) {
            1 => WizardStep::BasicInfo,
            2 => WizardStep::Photos,
            3 => WizardStep::MusicEmoji,
            4 => WizardStep::Preview,
            5 => WizardStep::Share,
            _ => WizardStep::Payment,
        }
    }

    pub fn number(self) -> u8 {
        self as u8
    }
}

/// The memory under construction
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDraft {
    /// Set once the draft has been saved
    pub id: Option<String>,
    pub title: String,
    pub text: String,
    pub date: Option<NaiveDate>,
    pub photos: Vec<String>,
    pub spotify_link: String,
    pub emoji: String,
}

/// Wizard context: the current step plus the draft
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardContext {
    current_step: WizardStep,
    draft: MemoryDraft,
}

impl Default for WizardContext {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardContext {
    pub fn new() -> Self {
        Self {
            current_step: WizardStep::BasicInfo,
            draft: MemoryDraft::default(),
        }
    }

    pub fn current_step(&self) -> WizardStep {
        self.current_step
    }

    pub fn draft(&self) -> &MemoryDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut MemoryDraft {
        &mut self.draft
    }

    /// Move forward one step (stays on the last step)
    pub fn advance(&mut self) -> WizardStep {
        self.jump_to(i32::from(self.current_step.number()) + 1)
    }

    /// Move back one step (stays on the first step)
    pub fn retreat(&mut self) -> WizardStep {
        self.jump_to(i32::from(self.current_step.number()) - 1)
    }

    /// Jump to a step number, clamped into range
    pub fn jump_to(&mut self, step: i32) -> WizardStep {
        self.current_step = WizardStep::clamped(step);
        self.current_step
    }

    /// Append a photo URL; fails once the draft holds `MAX_PHOTOS`
    pub fn add_photo(&mut self, url: impl Into<String>) -> Result<()> {
        if self.draft.photos.len() >= MAX_PHOTOS {
            return Err(StoreError::InvalidDraft(format!(
                "a memory holds at most {MAX_PHOTOS} photos"
            )));
        }
        self.draft.photos.push(url.into());
        Ok(())
    }

    /// Remove the photo at `index`, returning it if present
    pub fn remove_photo(&mut self, index: usize) -> Option<String> {
        (index < self.draft.photos.len()).then(|| self.draft.photos.remove(index))
    }

    /// Back to an empty draft on the first step
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Build the insert payload for the owner `user_id`
    pub fn to_new_memory(&self, user_id: &str) -> Result<NewMemory> {
        let title = self.draft.title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidDraft("title is required".into()));
        }

        Ok(NewMemory {
            user_id: user_id.to_string(),
            title: title.to_string(),
            text: self.draft.text.clone(),
            date: self.draft.date,
            emoji: self.draft.emoji.clone(),
            spotify_link: self.draft.spotify_link.clone(),
            photos: self.draft.photos.clone(),
        })
    }

    /// Record the id assigned when the draft was saved
    pub fn mark_saved(&mut self, id: impl Into<String>) {
        self.draft.id = Some(id.into());
    }

    /// Persist the draft once; later calls return the stored memory
    pub async fn save(&mut self, store: &dyn ReconciliationStore, user_id: &str) -> Result<Memory> {
        if let Some(id) = self.draft.id.as_deref() {
            return store
                .get_memory(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("memory {id}")));
        }

        let memory = store.insert_memory(self.to_new_memory(user_id)?).await?;
        tracing::info!(
            memory_id = %memory.id,
            user_id,
            photos = memory.photos.len(),
            "Saved memory draft"
        );
        self.mark_saved(memory.id.clone());
        Ok(memory)
    }
}
