use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::attach;
use crate::cache::{InMemoryMessageCache, MessageCache, MessageList};
use crate::cursor::CursorStore;
use crate::resume::{ReconnectionCoordinator, ResumeOutcome, SkipReason, StreamState};
use crate::status::ChatStatus;
use crate::test_utils::{
    Harness, ScriptedChatApi, ScriptedStreamConsumer, assistant_message, text_delta,
};
use crate::types::{ChatId, MessageId};

fn resumable() -> ChatStatus {
    ChatStatus::active(Some(MessageId::from("m1")), Some(45))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn check_runs_after_the_settle_delay() {
    let h = Harness::new(
        "c1",
        ScriptedChatApi::returning(resumable()),
        ScriptedStreamConsumer::succeeding("s1"),
    );
    h.load(vec![assistant_message("c1", "m1", "partial", 40)]);
    let attachment = attach(&h);

    let handle = attachment.schedule_check().unwrap();

    tokio::time::sleep(h.config().settle_delay() - Duration::from_millis(1)).await;
    assert_eq!(h.api.call_count(), 0);

    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, ResumeOutcome::Resumed { offset: 45, .. }));
    assert_eq!(h.api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn detaching_before_the_delay_cancels_the_check() {
    let h = Harness::new(
        "c1",
        ScriptedChatApi::returning(resumable()),
        ScriptedStreamConsumer::succeeding("s1"),
    );
    h.load(vec![assistant_message("c1", "m1", "partial", 40)]);
    let attachment = attach(&h);

    let handle = attachment.schedule_check().unwrap();
    attachment.detach();

    assert_eq!(
        handle.await.unwrap(),
        ResumeOutcome::Skipped(SkipReason::Detached)
    );
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.api.call_count(), 0);
    assert!(!h.ctx.streams.is_registered(&h.chat_id));
}

#[tokio::test(start_paused = true)]
async fn rearming_supersedes_the_pending_check() {
    let h = Harness::new(
        "c1",
        ScriptedChatApi::returning(resumable()),
        ScriptedStreamConsumer::succeeding("s1"),
    );
    h.load(vec![assistant_message("c1", "m1", "partial", 40)]);
    let attachment = attach(&h);

    let first = attachment.schedule_check().unwrap();
    let second = attachment.schedule_check().unwrap();

    assert_eq!(
        first.await.unwrap(),
        ResumeOutcome::Skipped(SkipReason::Superseded)
    );
    assert!(matches!(
        second.await.unwrap(),
        ResumeOutcome::Resumed { .. }
    ));
    assert_eq!(h.api.call_count(), 1);
    assert_eq!(h.consumer.calls().len(), 1);
}

#[tokio::test]
async fn not_scheduled_until_messages_load() {
    let h = Harness::new(
        "c1",
        ScriptedChatApi::returning(resumable()),
        ScriptedStreamConsumer::succeeding("s1"),
    );
    let attachment = attach(&h);

    assert!(attachment.schedule_check().is_none());

    h.load(vec![assistant_message("c1", "m1", "partial", 40)]);
    assert!(attachment.schedule_check().is_some());
}

#[tokio::test]
async fn concurrent_check_is_not_issued_twice() {
    let (api, gate) = ScriptedChatApi::returning(resumable()).gated();
    let h = Harness::new("c1", api, ScriptedStreamConsumer::succeeding("s1"));
    h.load(vec![assistant_message("c1", "m1", "partial", 40)]);
    let attachment = attach(&h);

    let coordinator = Arc::clone(attachment.coordinator());
    let in_flight = tokio::spawn(async move { coordinator.check_and_resume().await });
    wait_until(|| h.api.call_count() == 1).await;

    let second = attachment.coordinator().check_and_resume().await;
    assert_eq!(second, ResumeOutcome::Skipped(SkipReason::InFlight));

    gate.notify_one();
    assert!(matches!(
        in_flight.await.unwrap(),
        ResumeOutcome::Resumed { .. }
    ));
    assert_eq!(h.api.call_count(), 1);
}

#[tokio::test]
async fn status_arriving_after_detach_is_discarded() {
    let (api, gate) = ScriptedChatApi::returning(resumable()).gated();
    let h = Harness::new("c1", api, ScriptedStreamConsumer::succeeding("s1"));
    h.load(vec![assistant_message("c1", "m1", "partial", 40)]);
    h.cursors.set(&h.chat_id, 30).unwrap();
    let attachment = attach(&h);

    let coordinator = Arc::clone(attachment.coordinator());
    let in_flight = tokio::spawn(async move { coordinator.check_and_resume().await });
    wait_until(|| h.api.call_count() == 1).await;

    attachment.detach();
    gate.notify_one();

    assert_eq!(in_flight.await.unwrap(), ResumeOutcome::Discarded);
    assert!(h.consumer.calls().is_empty());
    assert_eq!(h.cursors.get(&h.chat_id).unwrap(), Some(30));
    assert_eq!(h.message("m1").unwrap().last_seq, 40);
}

#[tokio::test]
async fn resume_failure_after_detach_does_not_touch_the_new_attach() {
    let chat_id = ChatId::from("c1");
    let messages = MessageList::shared(chat_id.clone());
    let cache = Arc::new(InMemoryMessageCache::new());
    let (consumer, gate) = ScriptedStreamConsumer::failing("reset")
        .applying(
            vec![(41, text_delta(" more"))],
            messages.clone(),
            Arc::clone(&cache) as Arc<dyn MessageCache>,
        )
        .gated();
    let h = Harness::with_parts(
        chat_id,
        messages,
        cache,
        ScriptedChatApi::returning(ChatStatus::active(Some(MessageId::from("m1")), Some(40))),
        consumer,
    );
    h.load(vec![assistant_message("c1", "m1", "partial", 40)]);
    let old = attach(&h);

    let coordinator = Arc::clone(old.coordinator());
    let in_flight = tokio::spawn(async move { coordinator.check_and_resume().await });
    wait_until(|| !h.consumer.calls().is_empty()).await;

    old.detach();
    let new = attach(&h);
    assert!(new.begin_stream(&MessageId::from("m1")));
    gate.notify_one();

    assert_eq!(in_flight.await.unwrap(), ResumeOutcome::Discarded);
    // no rollback and no stream-state reset on behalf of the detached attach
    assert_eq!(h.message("m1").unwrap().last_seq, 41);
    assert_eq!(
        h.ctx.streams.state(&h.chat_id),
        StreamState::Streaming {
            message_id: MessageId::from("m1")
        }
    );
    drop(new);
}

#[tokio::test]
async fn dropping_an_attachment_unregisters_it() {
    let h = Harness::new(
        "c1",
        ScriptedChatApi::returning(ChatStatus::inactive()),
        ScriptedStreamConsumer::succeeding("s1"),
    );
    {
        let attachment = attach(&h);
        assert!(h.ctx.streams.is_registered(&h.chat_id));
        assert!(!attachment.is_detached());
    }
    assert!(!h.ctx.streams.is_registered(&h.chat_id));
}

#[tokio::test]
async fn abort_during_status_check_suppresses_resumption() {
    let (api, gate) = ScriptedChatApi::returning(resumable()).gated();
    let h = Harness::new("c1", api, ScriptedStreamConsumer::succeeding("s1"));
    h.load(vec![assistant_message("c1", "m1", "partial", 40)]);
    h.cursors.set(&h.chat_id, 30).unwrap();
    let attachment = attach(&h);

    let coordinator = Arc::clone(attachment.coordinator());
    let check = tokio::spawn(async move { coordinator.check_and_resume().await });
    wait_until(|| h.api.call_count() == 1).await;

    attachment.abort();
    gate.notify_one();

    assert_eq!(check.await.unwrap(), ResumeOutcome::Skipped(SkipReason::Aborted));
    assert!(h.consumer.calls().is_empty());
    assert_eq!(h.cursors.get(&h.chat_id).unwrap(), Some(30));
    assert_eq!(h.ctx.streams.state(&h.chat_id), StreamState::Idle);
}

#[tokio::test]
async fn superseded_coordinator_writes_nothing_into_the_new_attach() {
    let h = Harness::new(
        "c1",
        ScriptedChatApi::returning(ChatStatus::active(Some(MessageId::from("m2")), Some(12))),
        ScriptedStreamConsumer::succeeding("s1"),
    );
    h.load(vec![assistant_message("c1", "m1", "done", 8)]);
    h.cursors.set(&h.chat_id, 30).unwrap();

    // the old attach passed its token check, then was replaced before committing
    let old_generation = h.ctx.streams.register(&h.chat_id);
    h.ctx.streams.unregister(&h.chat_id, old_generation);
    let new = attach(&h);
    let stale = ReconnectionCoordinator::new(
        h.chat_id.clone(),
        h.messages.clone(),
        h.ctx.clone(),
        old_generation,
        CancellationToken::new(),
    );

    let outcome = stale.check_and_resume().await;

    assert_eq!(outcome, ResumeOutcome::Skipped(SkipReason::Detached));
    assert!(h.consumer.calls().is_empty());
    assert!(h.message("m2").is_none());
    assert!(h.cached("m2").is_none());
    assert_eq!(h.cursors.get(&h.chat_id).unwrap(), Some(30));
    assert_eq!(h.ctx.streams.state(&h.chat_id), StreamState::Idle);

    // the live attach is unaffected and can still resume
    assert!(matches!(
        new.coordinator().check_and_resume().await,
        ResumeOutcome::Resumed { offset: 0, placeholder: true, .. }
    ));
}
