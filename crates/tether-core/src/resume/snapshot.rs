use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::message::{ContentRender, Message};
use crate::types::{MessageId, StreamId};

/// Pre-resumption copy of a message's mutable fields.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSnapshot {
    pub message_id: MessageId,
    pub content_text: String,
    pub content_render: ContentRender,
    pub last_seq: u64,
    pub active_stream_id: Option<StreamId>,
}

impl MessageSnapshot {
    pub fn capture(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            content_text: message.content_text.clone(),
            content_render: message.content_render.clone(),
            last_seq: message.last_seq,
            active_stream_id: message.active_stream_id.clone(),
        }
    }

    /// Overwrite the snapshotted fields of `message`, including `last_seq`.
    pub fn restore_onto(&self, message: &mut Message) {
        message.content_text.clone_from(&self.content_text);
        message.content_render.clone_from(&self.content_render);
        message.last_seq = self.last_seq;
        message.active_stream_id.clone_from(&self.active_stream_id);
    }
}

/// Snapshots held while a resumption is in flight, keyed by message.
#[derive(Debug, Default)]
pub struct SnapshotBuffer {
    snapshots: Mutex<HashMap<MessageId, MessageSnapshot>>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture(&self, message: &Message) {
        let snapshot = MessageSnapshot::capture(message);
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.message_id.clone(), snapshot);
    }

    /// Remove and return the snapshot for `message_id`.
    pub fn take(&self, message_id: &MessageId) -> Option<MessageSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(message_id)
    }

    pub fn discard(&self, message_id: &MessageId) {
        self.take(message_id);
    }

    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{RenderEvent, Role, StreamStatus};
    use crate::types::ChatId;
    use chrono::Utc;

    fn partial_message() -> Message {
        let mut message = Message::new(
            ChatId::from("c1"),
            MessageId::from("m1"),
            Role::Assistant,
            Utc::now(),
        );
        message.apply_event(
            40,
            RenderEvent::TextDelta {
                text: "partial".to_string(),
            },
        );
        message.active_stream_id = Some(StreamId::from("s1"));
        message
    }

    #[test]
    fn restore_undoes_later_progress_field_for_field() {
        let mut message = partial_message();
        let snapshot = MessageSnapshot::capture(&message);

        message.apply_event(
            41,
            RenderEvent::TextDelta {
                text: " and more".to_string(),
            },
        );
        message.active_stream_id = Some(StreamId::from("s2"));
        message.stream_status = StreamStatus::Failed;

        snapshot.restore_onto(&mut message);

        assert_eq!(message.content_text, "partial");
        assert_eq!(message.last_seq, 40);
        assert_eq!(message.content_render, partial_message().content_render);
        assert_eq!(message.active_stream_id, Some(StreamId::from("s1")));
        // Fields outside the snapshot are left alone.
        assert_eq!(message.stream_status, StreamStatus::Failed);
    }

    #[test]
    fn buffer_take_is_single_use() {
        let buffer = SnapshotBuffer::new();
        let message = partial_message();
        buffer.capture(&message);

        assert!(buffer.contains(&message.id));
        assert!(buffer.take(&message.id).is_some());
        assert!(buffer.take(&message.id).is_none());
    }
}
