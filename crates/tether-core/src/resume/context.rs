use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{ChatStatusSource, StreamConsumer};
use crate::cache::MessageCache;
use crate::cursor::CursorStore;
use crate::types::ChatId;

use super::stream_state::StreamRegistry;

/// Collaborators shared by every conversation attached in this process.
#[derive(Clone)]
pub struct ResumeContext {
    pub status: Arc<dyn ChatStatusSource>,
    pub consumer: Arc<dyn StreamConsumer>,
    pub cursors: Arc<dyn CursorStore>,
    pub cache: Arc<dyn MessageCache>,
    pub streams: StreamRegistry,
}

impl ResumeContext {
    pub fn new(
        status: Arc<dyn ChatStatusSource>,
        consumer: Arc<dyn StreamConsumer>,
        cursors: Arc<dyn CursorStore>,
        cache: Arc<dyn MessageCache>,
    ) -> Self {
        Self {
            status,
            consumer,
            cursors,
            cache,
            streams: StreamRegistry::new(),
        }
    }

    /// Advance the stored cursor to `seq` after events up to it were applied.
    ///
    /// Never lowers an existing cursor.
    pub fn checkpoint(&self, chat_id: &ChatId, seq: u64) {
        if seq == 0 {
            return;
        }
        let stored = match self.cursors.get(chat_id) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Failed to read cursor for checkpoint");
                None
            }
        };
        if stored.is_some_and(|c| c >= seq) {
            return;
        }
        if let Err(e) = self.cursors.set(chat_id, seq) {
            warn!(chat_id = %chat_id, seq, error = %e, "Failed to checkpoint cursor");
        }
    }

    /// Normal completion of a stream: back to idle, nothing left to resume.
    pub fn on_stream_completed(&self, chat_id: &ChatId) {
        debug!(chat_id = %chat_id, "Stream completed");
        self.streams.finish(chat_id);
        if let Err(e) = self.cursors.clear(chat_id) {
            warn!(chat_id = %chat_id, error = %e, "Failed to clear cursor after completion");
        }
    }
}
