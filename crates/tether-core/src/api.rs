//! Collaborator seams for the network side of resumption.
//!
//! Both calls are the only suspension points of the resume engine. Transport
//! framing, authentication and event application live behind these traits.

use async_trait::async_trait;
use thiserror::Error;

use crate::status::ChatStatus;
use crate::types::{ChatId, MessageId, StreamId};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Request rejected: {message}")]
    Rejected { message: String },
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait ChatStatusSource: Send + Sync {
    async fn check_status(&self, chat_id: &ChatId) -> Result<ChatStatus, ApiError>;
}

/// Consumes a live stream into a message, starting after `resume_offset`.
///
/// Implementations apply events to the message list and external cache as a
/// side effect. A rejection may happen after some events were applied.
#[async_trait]
pub trait StreamConsumer: Send + Sync {
    async fn consume_stream(
        &self,
        chat_id: &ChatId,
        message_id: &MessageId,
        resume_offset: u64,
    ) -> Result<StreamId, ApiError>;
}
