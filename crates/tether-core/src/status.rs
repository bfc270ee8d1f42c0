use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{MessageId, StreamId};

/// The server's claim about whether a conversation is still generating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStatus {
    pub has_active_task: bool,
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub last_seq: Option<u64>,
    #[serde(default)]
    pub stream_id: Option<StreamId>,
}

impl ChatStatus {
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn active(message_id: Option<MessageId>, last_seq: Option<u64>) -> Self {
        Self {
            has_active_task: true,
            message_id,
            last_seq,
            stream_id: None,
        }
    }

    pub fn with_stream_id(mut self, stream_id: StreamId) -> Self {
        self.stream_id = Some(stream_id);
        self
    }

    /// Parse a status payload, treating any unexpected shape as "no active task".
    pub fn from_json(value: &serde_json::Value) -> Self {
        match serde_json::from_value::<Self>(value.clone()) {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Malformed chat status payload, assuming no active task");
                Self::inactive()
            }
        }
    }
}
