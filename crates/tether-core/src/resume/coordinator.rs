use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::SharedMessageList;
use crate::status::ChatStatus;
use crate::types::{ChatId, MessageId, StreamId};

use super::context::ResumeContext;
use super::reconcile::{ResumeTarget, plan_resume, resume_offset};
use super::snapshot::SnapshotBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    Detached,
    Superseded,
    NotLoaded,
    AlreadyCompleted,
    Aborted,
    InFlight,
    NoActiveTask,
    AlreadyStreaming,
    NoTarget,
    MessageListUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The consumer accepted the resumed stream.
    Resumed {
        message_id: MessageId,
        stream_id: StreamId,
        offset: u64,
        placeholder: bool,
    },
    /// The consumer rejected the stream; `restored` is true when a snapshot was
    /// written back onto the message in the list.
    RolledBack {
        message_id: MessageId,
        restored: bool,
    },
    Skipped(SkipReason),
    /// The status query failed. Nothing was changed.
    StatusUnavailable,
    /// A response arrived after the conversation was detached and was dropped.
    Discarded,
}

struct Prepared {
    message_id: MessageId,
    offset: u64,
    placeholder: bool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Decides, once per attach, whether to resume a live stream and where from.
pub struct ReconnectionCoordinator {
    chat_id: ChatId,
    messages: SharedMessageList,
    ctx: ResumeContext,
    generation: u64,
    token: CancellationToken,
    snapshots: SnapshotBuffer,
    in_flight: AtomicBool,
    completed: AtomicBool,
    aborted: AtomicBool,
}

impl ReconnectionCoordinator {
    pub fn new(
        chat_id: ChatId,
        messages: SharedMessageList,
        ctx: ResumeContext,
        generation: u64,
        token: CancellationToken,
    ) -> Self {
        Self {
            chat_id,
            messages,
            ctx,
            generation,
            token,
            snapshots: SnapshotBuffer::new(),
            in_flight: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    /// The user stopped the response; no resumption for the rest of this attach.
    pub fn abort(&self) {
        debug!(chat_id = %self.chat_id, "Resumption aborted by user");
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Check the attach preconditions without touching the network.
    pub fn readiness(&self) -> Result<(), SkipReason> {
        if self.token.is_cancelled() {
            return Err(SkipReason::Detached);
        }
        if self.is_completed() {
            return Err(SkipReason::AlreadyCompleted);
        }
        if self.is_aborted() {
            return Err(SkipReason::Aborted);
        }
        let loaded = self
            .messages
            .read()
            .map_err(|_| SkipReason::MessageListUnavailable)?
            .is_loaded();
        if !loaded {
            return Err(SkipReason::NotLoaded);
        }
        if self.ctx.streams.is_streaming(&self.chat_id) {
            return Err(SkipReason::AlreadyStreaming);
        }
        Ok(())
    }

    pub async fn check_and_resume(&self) -> ResumeOutcome {
        if let Err(reason) = self.readiness() {
            debug!(chat_id = %self.chat_id, %reason, "Skipping resume check");
            return ResumeOutcome::Skipped(reason);
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!(chat_id = %self.chat_id, "Resume check already in flight");
            return ResumeOutcome::Skipped(SkipReason::InFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let status = match self.ctx.status.check_status(&self.chat_id).await {
            Ok(status) => status,
            Err(e) => {
                if self.token.is_cancelled() {
                    return ResumeOutcome::Discarded;
                }
                warn!(chat_id = %self.chat_id, error = %e, "Failed to check chat status");
                return ResumeOutcome::StatusUnavailable;
            }
        };

        if self.token.is_cancelled() {
            debug!(chat_id = %self.chat_id, "Discarding status for detached conversation");
            return ResumeOutcome::Discarded;
        }

        if let Some(reason) = self.skip_for_status(&status) {
            debug!(chat_id = %self.chat_id, %reason, "Not resuming");
            return ResumeOutcome::Skipped(reason);
        }

        let prepared = match self.prepare(&status) {
            Ok(prepared) => prepared,
            Err(reason) => {
                debug!(chat_id = %self.chat_id, %reason, "Not resuming");
                return ResumeOutcome::Skipped(reason);
            }
        };

        info!(
            chat_id = %self.chat_id,
            message_id = %prepared.message_id,
            offset = prepared.offset,
            placeholder = prepared.placeholder,
            "Resuming stream"
        );

        let result = self
            .ctx
            .consumer
            .consume_stream(&self.chat_id, &prepared.message_id, prepared.offset)
            .await;

        if self.token.is_cancelled() {
            self.snapshots.discard(&prepared.message_id);
            debug!(
                chat_id = %self.chat_id,
                message_id = %prepared.message_id,
                succeeded = result.is_ok(),
                "Discarding resume result for detached conversation"
            );
            return ResumeOutcome::Discarded;
        }

        match result {
            Ok(stream_id) => {
                self.snapshots.discard(&prepared.message_id);
                self.completed.store(true, Ordering::Release);
                info!(
                    chat_id = %self.chat_id,
                    message_id = %prepared.message_id,
                    stream_id = %stream_id,
                    "Stream resumed"
                );
                ResumeOutcome::Resumed {
                    message_id: prepared.message_id,
                    stream_id,
                    offset: prepared.offset,
                    placeholder: prepared.placeholder,
                }
            }
            Err(e) => {
                warn!(
                    chat_id = %self.chat_id,
                    message_id = %prepared.message_id,
                    error = %e,
                    "Stream resumption failed, rolling back"
                );
                let restored = self.rollback(&prepared.message_id);
                self.ctx
                    .streams
                    .finish_generation(&self.chat_id, self.generation);
                ResumeOutcome::RolledBack {
                    message_id: prepared.message_id,
                    restored,
                }
            }
        }
    }

    fn skip_for_status(&self, status: &ChatStatus) -> Option<SkipReason> {
        if !status.has_active_task {
            Some(SkipReason::NoActiveTask)
        } else if self.ctx.streams.is_streaming(&self.chat_id) {
            Some(SkipReason::AlreadyStreaming)
        } else if self.is_aborted() {
            Some(SkipReason::Aborted)
        } else {
            None
        }
    }

    fn stored_cursor(&self) -> Option<u64> {
        match self.ctx.cursors.get(&self.chat_id) {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(chat_id = %self.chat_id, error = %e, "Failed to read stored cursor");
                None
            }
        }
    }

    /// Everything between the status response and the consume call. Runs under
    /// the message list lock so the snapshot and the placeholder are never
    /// observable half-written. Nothing is written until this attach holds the
    /// stream.
    fn prepare(&self, status: &ChatStatus) -> Result<Prepared, SkipReason> {
        let mut list = self.messages.write().map_err(|_| {
            error!(chat_id = %self.chat_id, "Message list lock poisoned");
            SkipReason::MessageListUnavailable
        })?;

        if self.token.is_cancelled() {
            return Err(SkipReason::Detached);
        }

        let plan = plan_resume(status, &list, Utc::now()).ok_or(SkipReason::NoTarget)?;

        if !self
            .ctx
            .streams
            .try_begin(&self.chat_id, self.generation, &plan.message_id)
        {
            if self.ctx.streams.is_current(&self.chat_id, self.generation) {
                return Err(SkipReason::AlreadyStreaming);
            }
            return Err(SkipReason::Detached);
        }

        let offset = resume_offset(&plan.target, self.stored_cursor(), status.last_seq);

        let placeholder = match plan.target {
            ResumeTarget::Existing { .. } => {
                if let Some(existing) = list.get(&plan.message_id) {
                    self.snapshots.capture(existing);
                }
                false
            }
            ResumeTarget::Missing { placeholder } => {
                list.push(placeholder.clone());
                if let Err(e) = self.ctx.cache.add(placeholder) {
                    warn!(chat_id = %self.chat_id, error = %e, "Failed to cache placeholder message");
                }
                true
            }
        };
        drop(list);

        if let Err(e) = self.ctx.cursors.persist(&self.chat_id, offset) {
            warn!(chat_id = %self.chat_id, offset, error = %e, "Failed to persist resume cursor");
        }

        Ok(Prepared {
            message_id: plan.message_id,
            offset,
            placeholder,
        })
    }

    /// Restore the snapshot of `message_id`. Returns whether the message in the
    /// list was restored.
    fn rollback(&self, message_id: &MessageId) -> bool {
        let Some(snapshot) = self.snapshots.take(message_id) else {
            return false;
        };

        let restored = match self.messages.write() {
            Ok(mut list) => match list.get_mut(message_id) {
                Some(message) => {
                    snapshot.restore_onto(message);
                    true
                }
                None => {
                    warn!(message_id = %message_id, "Rolled-back message no longer in list");
                    false
                }
            },
            Err(_) => {
                error!(chat_id = %self.chat_id, "Message list lock poisoned during rollback");
                false
            }
        };

        match self
            .ctx
            .cache
            .update(&self.chat_id, message_id, &mut |m| snapshot.restore_onto(m))
        {
            Ok(true) => {}
            Ok(false) => debug!(message_id = %message_id, "Rolled-back message not in cache"),
            Err(e) => warn!(message_id = %message_id, error = %e, "Failed to roll back cached message"),
        }

        restored
    }
}
