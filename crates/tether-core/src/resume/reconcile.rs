use chrono::{DateTime, Utc};

use crate::cache::MessageList;
use crate::message::Message;
use crate::status::ChatStatus;
use crate::types::MessageId;

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeTarget {
    /// The message is already in the local list.
    Existing { last_seq: u64 },
    /// The message must be synthesized before events can land in it.
    Missing { placeholder: Message },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResumePlan {
    pub message_id: MessageId,
    pub target: ResumeTarget,
}

impl ResumePlan {
    pub fn needs_placeholder(&self) -> bool {
        matches!(self.target, ResumeTarget::Missing { .. })
    }
}

/// Decide which message a resumed stream should be applied to.
///
/// Prefers the server-reported message id and falls back to the most recent
/// local assistant message. Returns `None` when there is nothing to resume into.
/// Pure: callers perform every write.
pub fn plan_resume(
    status: &ChatStatus,
    messages: &MessageList,
    now: DateTime<Utc>,
) -> Option<ResumePlan> {
    let message_id = status
        .message_id
        .clone()
        .or_else(|| messages.latest_assistant().map(|m| m.id.clone()))?;

    let target = match messages.get(&message_id) {
        Some(existing) => ResumeTarget::Existing {
            last_seq: existing.last_seq,
        },
        None => ResumeTarget::Missing {
            placeholder: Message::placeholder(
                messages.chat_id().clone(),
                message_id.clone(),
                status.stream_id.clone(),
                now,
            ),
        },
    };

    Some(ResumePlan { message_id, target })
}

/// Offset from which the stream should be replayed.
///
/// For an existing message this is the largest of the stored cursor, the
/// server watermark and the message's own `last_seq`. A missing message is
/// always rebuilt from zero.
pub fn resume_offset(target: &ResumeTarget, stored_cursor: Option<u64>, server_seq: Option<u64>) -> u64 {
    match target {
        ResumeTarget::Existing { last_seq } => stored_cursor
            .unwrap_or(0)
            .max(server_seq.unwrap_or(0))
            .max(*last_seq),
        ResumeTarget::Missing { .. } => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Role, StreamStatus};
    use crate::types::{ChatId, StreamId};
    use rstest::rstest;

    fn list_with(messages: &[(&str, Role, u64)]) -> MessageList {
        let mut list = MessageList::new(ChatId::from("c1"));
        list.load(
            messages
                .iter()
                .map(|(id, role, seq)| {
                    let mut m = Message::new(ChatId::from("c1"), MessageId::from(*id), *role, Utc::now());
                    m.last_seq = *seq;
                    m
                })
                .collect(),
        );
        list
    }

    #[test]
    fn server_message_id_wins_over_latest_assistant() {
        let list = list_with(&[("a1", Role::Assistant, 3), ("a2", Role::Assistant, 8)]);
        let status = ChatStatus::active(Some(MessageId::from("a1")), Some(5));

        let plan = plan_resume(&status, &list, Utc::now()).unwrap();
        assert_eq!(plan.message_id, MessageId::from("a1"));
        assert_eq!(plan.target, ResumeTarget::Existing { last_seq: 3 });
    }

    #[test]
    fn falls_back_to_latest_assistant() {
        let list = list_with(&[
            ("a1", Role::Assistant, 3),
            ("a2", Role::Assistant, 8),
            ("u1", Role::User, 0),
        ]);
        let status = ChatStatus::active(None, None);

        let plan = plan_resume(&status, &list, Utc::now()).unwrap();
        assert_eq!(plan.message_id, MessageId::from("a2"));
        assert!(!plan.needs_placeholder());
    }

    #[test]
    fn no_target_without_id_or_assistant() {
        let list = list_with(&[("u1", Role::User, 0)]);
        assert!(plan_resume(&ChatStatus::active(None, Some(4)), &list, Utc::now()).is_none());
    }

    #[test]
    fn missing_message_gets_a_placeholder() {
        let list = list_with(&[("u1", Role::User, 0)]);
        let status = ChatStatus::active(Some(MessageId::from("m2")), Some(12))
            .with_stream_id(StreamId::from("s7"));

        let plan = plan_resume(&status, &list, Utc::now()).unwrap();
        let ResumeTarget::Missing { placeholder } = &plan.target else {
            panic!("expected placeholder, got {:?}", plan.target);
        };
        assert_eq!(placeholder.id, MessageId::from("m2"));
        assert_eq!(placeholder.chat_id, ChatId::from("c1"));
        assert_eq!(placeholder.stream_status, StreamStatus::InProgress);
        assert_eq!(placeholder.active_stream_id, Some(StreamId::from("s7")));
        assert!(placeholder.content_text.is_empty());
        // planning never touches the list
        assert_eq!(list.len(), 1);
    }

    #[rstest]
    #[case::server_ahead(Some(30), Some(45), 40, 45)]
    #[case::cursor_ahead(Some(50), Some(45), 40, 50)]
    #[case::message_ahead(Some(30), Some(45), 60, 60)]
    #[case::no_cursor(None, Some(45), 40, 45)]
    #[case::no_server_seq(Some(30), None, 12, 30)]
    #[case::nothing_known(None, None, 0, 0)]
    fn existing_target_takes_the_largest_watermark(
        #[case] cursor: Option<u64>,
        #[case] server: Option<u64>,
        #[case] message: u64,
        #[case] expected: u64,
    ) {
        let target = ResumeTarget::Existing { last_seq: message };
        assert_eq!(resume_offset(&target, cursor, server), expected);
    }

    #[rstest]
    #[case(Some(30), Some(45))]
    #[case(Some(999), None)]
    #[case(None, Some(12))]
    fn missing_target_always_starts_from_zero(
        #[case] cursor: Option<u64>,
        #[case] server: Option<u64>,
    ) {
        let target = ResumeTarget::Missing {
            placeholder: Message::placeholder(ChatId::from("c1"), MessageId::from("m"), None, Utc::now()),
        };
        assert_eq!(resume_offset(&target, cursor, server), 0);
    }
}
