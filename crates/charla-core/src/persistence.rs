//! Maps a [`Conversation`] to a single named storage slot.
//!
//! The whole conversation is rewritten on every save. There is no
//! incremental write and no atomicity beyond what the storage medium gives;
//! a torn write shows up as [`PersistenceError::DataCorruption`] on the next
//! load.

use crate::state::Conversation;
use crate::storage::Storage;
use thiserror::Error;

/// Slot the conversation lives in
pub const MESSAGES_SLOT: &str = "messages";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("stored conversation is not valid: {0}")]
    DataCorruption(#[from] serde_json::Error),

    #[error("storage unavailable: {0:#}")]
    Storage(#[from] anyhow::Error),
}

pub struct Persistence<S: Storage> {
    storage: S,
    slot: String,
}

impl<S: Storage> Persistence<S> {
    pub fn new(storage: S) -> Self {
        Self::with_slot(storage, MESSAGES_SLOT)
    }

    pub fn with_slot(storage: S, slot: &str) -> Self {
        Self {
            storage,
            slot: slot.to_string(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// An absent slot is an empty conversation, not an error.
    pub fn load(&self) -> Result<Conversation, PersistenceError> {
        match self.storage.get(&self.slot)? {
            None => Ok(Conversation::new()),
            // Invalid UTF-8 is rejected by the decoder, so it is corruption too
            Some(content) => Ok(serde_json::from_slice(&content)?),
        }
    }

    pub fn save(&self, conversation: &Conversation) -> Result<(), PersistenceError> {
        let content = serde_json::to_vec(conversation)?;
        self.storage.set(&self.slot, &content)?;
        Ok(())
    }
}
