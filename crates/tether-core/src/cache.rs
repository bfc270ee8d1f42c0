//! Local message state: the per-conversation loaded list and the shared
//! cross-view cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::message::Message;
use crate::types::{ChatId, MessageId};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Message cache lock poisoned: {message}")]
    LockPoisoned { message: String },
}

impl CacheError {
    pub fn lock_poisoned(message: impl Into<String>) -> Self {
        Self::LockPoisoned {
            message: message.into(),
        }
    }
}

/// Cache shared by every view that renders messages.
///
/// Writes are synchronous and last-write-wins.
pub trait MessageCache: Send + Sync {
    fn add(&self, message: Message) -> Result<(), CacheError>;

    /// Apply `updater` to a cached message. Returns `false` if it is not cached.
    fn update(
        &self,
        chat_id: &ChatId,
        message_id: &MessageId,
        updater: &mut dyn FnMut(&mut Message),
    ) -> Result<bool, CacheError>;

    fn get(&self, chat_id: &ChatId, message_id: &MessageId) -> Result<Option<Message>, CacheError>;
}

#[derive(Default)]
pub struct InMemoryMessageCache {
    messages: RwLock<HashMap<ChatId, Vec<Message>>>,
}

impl InMemoryMessageCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageCache for InMemoryMessageCache {
    fn add(&self, message: Message) -> Result<(), CacheError> {
        let mut messages = self
            .messages
            .write()
            .map_err(|_| CacheError::lock_poisoned("messages"))?;
        let chat = messages.entry(message.chat_id.clone()).or_default();
        match chat.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => chat.push(message),
        }
        Ok(())
    }

    fn update(
        &self,
        chat_id: &ChatId,
        message_id: &MessageId,
        updater: &mut dyn FnMut(&mut Message),
    ) -> Result<bool, CacheError> {
        let mut messages = self
            .messages
            .write()
            .map_err(|_| CacheError::lock_poisoned("messages"))?;
        let found = messages
            .get_mut(chat_id)
            .and_then(|chat| chat.iter_mut().find(|m| &m.id == message_id));
        match found {
            Some(message) => {
                updater(message);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get(&self, chat_id: &ChatId, message_id: &MessageId) -> Result<Option<Message>, CacheError> {
        let messages = self
            .messages
            .read()
            .map_err(|_| CacheError::lock_poisoned("messages"))?;
        Ok(messages
            .get(chat_id)
            .and_then(|chat| chat.iter().find(|m| &m.id == message_id))
            .cloned())
    }
}

/// Messages loaded for one conversation, in insertion order.
#[derive(Debug, Clone)]
pub struct MessageList {
    chat_id: ChatId,
    messages: Vec<Message>,
    loaded: bool,
}

pub type SharedMessageList = Arc<RwLock<MessageList>>;

impl MessageList {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            messages: Vec::new(),
            loaded: false,
        }
    }

    pub fn shared(chat_id: ChatId) -> SharedMessageList {
        Arc::new(RwLock::new(Self::new(chat_id)))
    }

    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    /// Replace the contents with the initial fetch and mark the list loaded.
    pub fn load(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.get(id).is_some()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Most recently added assistant message.
    pub fn latest_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_assistant())
    }
}
