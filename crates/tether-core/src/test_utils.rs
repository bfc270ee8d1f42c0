//! Test utilities for tether-core
//!
//! Scriptable collaborators for exercising the resume engine without a
//! transport. Exported to other crates behind the `test-utils` feature.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use crate::api::{ApiError, ChatStatusSource, StreamConsumer};
use crate::cache::{InMemoryMessageCache, MessageCache, MessageList, SharedMessageList};
use crate::config::ResumeConfig;
use crate::cursor::InMemoryCursorStore;
use crate::message::{Message, RenderEvent, Role};
use crate::resume::ResumeContext;
use crate::status::ChatStatus;
use crate::types::{ChatId, MessageId, StreamId};

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Status source that replays queued responses, then repeats `fallback`.
pub struct ScriptedChatApi {
    responses: Mutex<VecDeque<Result<ChatStatus, String>>>,
    fallback: ChatStatus,
    calls: Mutex<Vec<ChatId>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedChatApi {
    pub fn returning(status: ChatStatus) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: status,
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn failing_once(self, message: impl Into<String>) -> Self {
        locked(&self.responses).push_back(Err(message.into()));
        self
    }

    /// Hold every response until the returned handle is notified.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn call_count(&self) -> usize {
        locked(&self.calls).len()
    }
}

#[async_trait]
impl ChatStatusSource for ScriptedChatApi {
    async fn check_status(&self, chat_id: &ChatId) -> Result<ChatStatus, ApiError> {
        locked(&self.calls).push(chat_id.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = locked(&self.responses).pop_front();
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(ApiError::transport(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeCall {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub resume_offset: u64,
}

enum ConsumeBehavior {
    Succeed(StreamId),
    Fail(String),
}

/// Stream consumer that records calls, optionally applies events to the
/// message list and cache, then succeeds or fails as scripted.
pub struct ScriptedStreamConsumer {
    behavior: ConsumeBehavior,
    events: Vec<(u64, RenderEvent)>,
    target: Option<(SharedMessageList, Arc<dyn MessageCache>)>,
    calls: Mutex<Vec<ConsumeCall>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedStreamConsumer {
    pub fn succeeding(stream_id: impl Into<StreamId>) -> Self {
        Self::with_behavior(ConsumeBehavior::Succeed(stream_id.into()))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(ConsumeBehavior::Fail(message.into()))
    }

    fn with_behavior(behavior: ConsumeBehavior) -> Self {
        Self {
            behavior,
            events: Vec::new(),
            target: None,
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Apply `events` (those past the resume offset) before returning.
    pub fn applying(
        mut self,
        events: Vec<(u64, RenderEvent)>,
        messages: SharedMessageList,
        cache: Arc<dyn MessageCache>,
    ) -> Self {
        self.events = events;
        self.target = Some((messages, cache));
        self
    }

    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn calls(&self) -> Vec<ConsumeCall> {
        locked(&self.calls).clone()
    }

    fn apply_events(&self, chat_id: &ChatId, message_id: &MessageId, resume_offset: u64) {
        let Some((messages, cache)) = &self.target else {
            return;
        };
        let events: Vec<_> = self
            .events
            .iter()
            .filter(|(seq, _)| *seq > resume_offset)
            .cloned()
            .collect();

        if let Ok(mut list) = messages.write()
            && let Some(message) = list.get_mut(message_id)
        {
            for (seq, event) in &events {
                message.apply_event(*seq, event.clone());
            }
        }
        let _ = cache.update(chat_id, message_id, &mut |message| {
            for (seq, event) in &events {
                message.apply_event(*seq, event.clone());
            }
        });
    }
}

#[async_trait]
impl StreamConsumer for ScriptedStreamConsumer {
    async fn consume_stream(
        &self,
        chat_id: &ChatId,
        message_id: &MessageId,
        resume_offset: u64,
    ) -> Result<StreamId, ApiError> {
        locked(&self.calls).push(ConsumeCall {
            chat_id: chat_id.clone(),
            message_id: message_id.clone(),
            resume_offset,
        });
        self.apply_events(chat_id, message_id, resume_offset);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.behavior {
            ConsumeBehavior::Succeed(stream_id) => Ok(stream_id.clone()),
            ConsumeBehavior::Fail(message) => Err(ApiError::rejected(message.clone())),
        }
    }
}

/// Wiring of in-memory collaborators around one conversation.
pub struct Harness {
    pub chat_id: ChatId,
    pub messages: SharedMessageList,
    pub cursors: Arc<InMemoryCursorStore>,
    pub cache: Arc<InMemoryMessageCache>,
    pub api: Arc<ScriptedChatApi>,
    pub consumer: Arc<ScriptedStreamConsumer>,
    pub ctx: ResumeContext,
}

impl Harness {
    pub fn new(chat_id: &str, api: ScriptedChatApi, consumer: ScriptedStreamConsumer) -> Self {
        let chat_id = ChatId::from(chat_id);
        Self::with_parts(
            chat_id.clone(),
            MessageList::shared(chat_id),
            Arc::new(InMemoryMessageCache::new()),
            api,
            consumer,
        )
    }

    /// Build with a message list and cache created up front, so a consumer can
    /// be pointed at them before wiring.
    pub fn with_parts(
        chat_id: ChatId,
        messages: SharedMessageList,
        cache: Arc<InMemoryMessageCache>,
        api: ScriptedChatApi,
        consumer: ScriptedStreamConsumer,
    ) -> Self {
        let cursors = Arc::new(InMemoryCursorStore::new());
        let api = Arc::new(api);
        let consumer = Arc::new(consumer);
        let ctx = ResumeContext::new(
            Arc::clone(&api) as Arc<dyn ChatStatusSource>,
            Arc::clone(&consumer) as Arc<dyn StreamConsumer>,
            Arc::clone(&cursors) as Arc<dyn crate::cursor::CursorStore>,
            Arc::clone(&cache) as Arc<dyn MessageCache>,
        );
        Self {
            chat_id,
            messages,
            cursors,
            cache,
            api,
            consumer,
            ctx,
        }
    }

    /// Load `messages` into both the list and the cache and mark the list loaded.
    pub fn load(&self, messages: Vec<Message>) {
        for message in &messages {
            let _ = self.cache.add(message.clone());
        }
        if let Ok(mut list) = self.messages.write() {
            list.load(messages);
        }
    }

    pub fn message(&self, id: &str) -> Option<Message> {
        self.messages
            .read()
            .ok()
            .and_then(|list| list.get(&MessageId::from(id)).cloned())
    }

    pub fn cached(&self, id: &str) -> Option<Message> {
        self.cache
            .get(&self.chat_id, &MessageId::from(id))
            .ok()
            .flatten()
    }

    pub fn config(&self) -> ResumeConfig {
        ResumeConfig::default()
    }
}

pub fn user_message(chat_id: &str, id: &str, text: &str) -> Message {
    let mut message = Message::new(
        ChatId::from(chat_id),
        MessageId::from(id),
        Role::User,
        Utc::now(),
    );
    message.content_text = text.to_string();
    message
}

/// Assistant message whose text was built from one event at `last_seq`.
pub fn assistant_message(chat_id: &str, id: &str, text: &str, last_seq: u64) -> Message {
    let mut message = Message::new(
        ChatId::from(chat_id),
        MessageId::from(id),
        Role::Assistant,
        Utc::now(),
    );
    if last_seq > 0 {
        message.apply_event(last_seq, text_delta(text));
    }
    message
}

pub fn text_delta(text: &str) -> RenderEvent {
    RenderEvent::TextDelta {
        text: text.to_string(),
    }
}
