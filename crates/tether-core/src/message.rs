//! Conversation messages and their incrementally built content.
//!
//! A message's mutable fields (`content_text`, `content_render`, `last_seq`,
//! `active_stream_id`) are advanced only through [`Message::apply_event`], which
//! drops any event at or below the current high-water mark. Replaying a stream
//! from an earlier offset is therefore harmless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::types::{ChatId, MessageId, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StreamStatus {
    InProgress,
    Completed,
    Failed,
    #[default]
    Absent,
}

/// A single event produced by a stream, in the order the server emitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderEvent {
    TextDelta {
        text: String,
    },
    ReasoningDelta {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        id: String,
        output: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Text,
    Reasoning,
    Tool,
}

/// A contiguous run of render events collapsed for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
    /// Tool call id for `Tool` segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRender {
    pub events: Vec<RenderEvent>,
    pub segments: Vec<Segment>,
}

impl ContentRender {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn push(&mut self, event: RenderEvent) {
        append_segment(&mut self.segments, &event);
        self.events.push(event);
    }

    /// Recompute derived segments from the event list.
    pub fn rebuild_segments(&mut self) {
        let mut segments = Vec::new();
        for event in &self.events {
            append_segment(&mut segments, event);
        }
        self.segments = segments;
    }
}

fn append_segment(segments: &mut Vec<Segment>, event: &RenderEvent) {
    match event {
        RenderEvent::TextDelta { text } => extend_or_push(segments, SegmentKind::Text, text),
        RenderEvent::ReasoningDelta { text } => {
            extend_or_push(segments, SegmentKind::Reasoning, text);
        }
        RenderEvent::ToolCall { id, name, .. } => segments.push(Segment {
            kind: SegmentKind::Tool,
            text: name.clone(),
            tool_id: Some(id.clone()),
        }),
        RenderEvent::ToolResult { id, output } => {
            let existing = segments
                .iter_mut()
                .rev()
                .find(|s| s.kind == SegmentKind::Tool && s.tool_id.as_deref() == Some(id));
            match existing {
                Some(segment) => {
                    segment.text.push('\n');
                    segment.text.push_str(output);
                }
                None => segments.push(Segment {
                    kind: SegmentKind::Tool,
                    text: output.clone(),
                    tool_id: Some(id.clone()),
                }),
            }
        }
    }
}

fn extend_or_push(segments: &mut Vec<Segment>, kind: SegmentKind, text: &str) {
    if let Some(last) = segments.last_mut()
        && last.kind == kind
    {
        last.text.push_str(text);
        return;
    }
    segments.push(Segment {
        kind,
        text: text.to_string(),
        tool_id: None,
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub role: Role,
    pub content_text: String,
    pub content_render: ContentRender,
    /// High-water mark of applied events. Never lowered except by snapshot rollback.
    pub last_seq: u64,
    pub active_stream_id: Option<StreamId>,
    pub stream_status: StreamStatus,
    pub created_at: DateTime<Utc>,
    pub model_id: Option<String>,
}

impl Message {
    pub fn new(chat_id: ChatId, id: MessageId, role: Role, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            chat_id,
            role,
            content_text: String::new(),
            content_render: ContentRender::default(),
            last_seq: 0,
            active_stream_id: None,
            stream_status: StreamStatus::Absent,
            created_at,
            model_id: None,
        }
    }

    /// Empty in-progress assistant message that resumed events can land in.
    pub fn placeholder(
        chat_id: ChatId,
        id: MessageId,
        stream_id: Option<StreamId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            active_stream_id: stream_id,
            stream_status: StreamStatus::InProgress,
            ..Self::new(chat_id, id, Role::Assistant, created_at)
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Apply one stream event. Returns `false` when `seq` was already applied.
    pub fn apply_event(&mut self, seq: u64, event: RenderEvent) -> bool {
        if seq <= self.last_seq {
            return false;
        }
        if let RenderEvent::TextDelta { text } = &event {
            self.content_text.push_str(text);
        }
        self.content_render.push(event);
        self.last_seq = seq;
        true
    }
}
