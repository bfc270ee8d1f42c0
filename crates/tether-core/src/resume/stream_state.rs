use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::types::{ChatId, MessageId};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming {
        message_id: MessageId,
    },
}

impl StreamState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    pub fn target(&self) -> Option<&MessageId> {
        match self {
            Self::Idle => None,
            Self::Streaming { message_id } => Some(message_id),
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    generation: u64,
    state: StreamState,
}

/// Stream state of every attached conversation.
///
/// Conversations are inserted on attach and removed on detach. Each
/// registration gets a generation so a late detach cannot remove a newer
/// attach of the same conversation. Lookups for an unregistered conversation
/// report [`StreamState::Idle`].
#[derive(Clone, Default)]
pub struct StreamRegistry {
    states: Arc<Mutex<HashMap<ChatId, Entry>>>,
    generations: Arc<AtomicU64>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned map only ever holds fully written states.
    fn lock(&self) -> MutexGuard<'_, HashMap<ChatId, Entry>> {
        self.states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert `chat_id` as idle and return its registration generation.
    pub fn register(&self, chat_id: &ChatId) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = Entry {
            generation,
            state: StreamState::Idle,
        };
        if self.lock().insert(chat_id.clone(), entry).is_some() {
            debug!(chat_id = %chat_id, "Conversation re-registered, previous stream state dropped");
        }
        generation
    }

    /// Remove `chat_id` if it is still held by `generation`.
    pub fn unregister(&self, chat_id: &ChatId, generation: u64) {
        let mut states = self.lock();
        if states.get(chat_id).is_some_and(|e| e.generation == generation) {
            states.remove(chat_id);
        }
    }

    pub fn is_registered(&self, chat_id: &ChatId) -> bool {
        self.lock().contains_key(chat_id)
    }

    pub fn state(&self, chat_id: &ChatId) -> StreamState {
        self.lock()
            .get(chat_id)
            .map(|e| e.state.clone())
            .unwrap_or_default()
    }

    pub fn is_streaming(&self, chat_id: &ChatId) -> bool {
        self.state(chat_id).is_streaming()
    }

    /// Whether `generation` still holds the registration for `chat_id`.
    pub fn is_current(&self, chat_id: &ChatId, generation: u64) -> bool {
        self.lock()
            .get(chat_id)
            .is_some_and(|e| e.generation == generation)
    }

    /// Enter `streaming` for `message_id` on behalf of the attach holding
    /// `generation`. Returns `false` and changes nothing if the conversation is
    /// already streaming, is not registered, or is registered to another attach.
    pub fn try_begin(&self, chat_id: &ChatId, generation: u64, message_id: &MessageId) -> bool {
        let mut states = self.lock();
        let Some(entry) = states.get_mut(chat_id) else {
            debug!(chat_id = %chat_id, requested = %message_id, "Stream not started for unregistered conversation");
            return false;
        };
        if entry.generation != generation {
            debug!(
                chat_id = %chat_id,
                generation,
                current_generation = entry.generation,
                "Stream not started for superseded attach"
            );
            return false;
        }
        if let StreamState::Streaming { message_id: current } = &entry.state {
            debug!(
                chat_id = %chat_id,
                current = %current,
                requested = %message_id,
                "Stream already active, not starting another"
            );
            return false;
        }
        entry.state = StreamState::Streaming {
            message_id: message_id.clone(),
        };
        true
    }

    /// Return the conversation to `idle`.
    pub fn finish(&self, chat_id: &ChatId) {
        let mut states = self.lock();
        match states.get_mut(chat_id) {
            Some(entry) => entry.state = StreamState::Idle,
            None => warn!(chat_id = %chat_id, "Finished stream for unregistered conversation"),
        }
    }

    /// Return the conversation to `idle` only if `generation` still holds it.
    pub fn finish_generation(&self, chat_id: &ChatId, generation: u64) {
        let mut states = self.lock();
        match states.get_mut(chat_id) {
            Some(entry) if entry.generation == generation => entry.state = StreamState::Idle,
            _ => debug!(chat_id = %chat_id, generation, "Stream state belongs to another attach, left as is"),
        }
    }
}
