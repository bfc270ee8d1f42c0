//! Per-conversation resume cursors.
//!
//! A cursor of zero is never stored: persisting a zero offset clears the entry,
//! so "absent" and "nothing checkpointed" are the same state.

mod file;

pub use file::FileCursorStore;

use std::collections::BTreeMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::types::ChatId;

#[derive(Debug, Error)]
pub enum CursorStoreError {
    #[error("Cursor store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Cursor store lock poisoned: {message}")]
    LockPoisoned { message: String },
}

impl CursorStoreError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn lock_poisoned(message: impl Into<String>) -> Self {
        Self::LockPoisoned {
            message: message.into(),
        }
    }
}

/// Durable key/value storage of the last checkpointed sequence per conversation.
///
/// No concurrency control beyond last-write-wins.
pub trait CursorStore: Send + Sync {
    fn get(&self, chat_id: &ChatId) -> Result<Option<u64>, CursorStoreError>;

    /// Store `value`. Implementations treat `0` as [`CursorStore::clear`].
    fn set(&self, chat_id: &ChatId, value: u64) -> Result<(), CursorStoreError>;

    fn clear(&self, chat_id: &ChatId) -> Result<(), CursorStoreError>;

    fn entries(&self) -> Result<Vec<(ChatId, u64)>, CursorStoreError>;

    /// Record `offset` as the conversation's cursor, clearing it when zero.
    fn persist(&self, chat_id: &ChatId, offset: u64) -> Result<(), CursorStoreError> {
        if offset > 0 {
            self.set(chat_id, offset)
        } else {
            self.clear(chat_id)
        }
    }
}

#[derive(Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<BTreeMap<ChatId, u64>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for InMemoryCursorStore {
    fn get(&self, chat_id: &ChatId) -> Result<Option<u64>, CursorStoreError> {
        let cursors = self
            .cursors
            .read()
            .map_err(|_| CursorStoreError::lock_poisoned("cursors"))?;
        Ok(cursors.get(chat_id).copied())
    }

    fn set(&self, chat_id: &ChatId, value: u64) -> Result<(), CursorStoreError> {
        if value == 0 {
            return self.clear(chat_id);
        }
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| CursorStoreError::lock_poisoned("cursors"))?;
        cursors.insert(chat_id.clone(), value);
        Ok(())
    }

    fn clear(&self, chat_id: &ChatId) -> Result<(), CursorStoreError> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| CursorStoreError::lock_poisoned("cursors"))?;
        cursors.remove(chat_id);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(ChatId, u64)>, CursorStoreError> {
        let cursors = self
            .cursors
            .read()
            .map_err(|_| CursorStoreError::lock_poisoned("cursors"))?;
        Ok(cursors.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let store = InMemoryCursorStore::new();
        let chat = ChatId::from("c1");

        assert_eq!(store.get(&chat).unwrap(), None);
        store.set(&chat, 30).unwrap();
        assert_eq!(store.get(&chat).unwrap(), Some(30));
        store.set(&chat, 12).unwrap();
        assert_eq!(store.get(&chat).unwrap(), Some(12));
        store.clear(&chat).unwrap();
        assert_eq!(store.get(&chat).unwrap(), None);
    }

    #[test]
    fn zero_is_never_stored() {
        let store = InMemoryCursorStore::new();
        let chat = ChatId::from("c1");

        store.set(&chat, 30).unwrap();
        store.set(&chat, 0).unwrap();
        assert_eq!(store.get(&chat).unwrap(), None);

        store.set(&chat, 30).unwrap();
        store.persist(&chat, 0).unwrap();
        assert_eq!(store.get(&chat).unwrap(), None);
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn conversations_are_isolated() {
        let store = InMemoryCursorStore::new();
        store.persist(&ChatId::from("a"), 5).unwrap();
        store.persist(&ChatId::from("b"), 7).unwrap();
        store.clear(&ChatId::from("a")).unwrap();

        assert_eq!(store.entries().unwrap(), vec![(ChatId::from("b"), 7)]);
    }
}
