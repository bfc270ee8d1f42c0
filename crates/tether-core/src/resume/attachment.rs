use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::SharedMessageList;
use crate::config::ResumeConfig;
use crate::types::{ChatId, MessageId};

use super::context::ResumeContext;
use super::coordinator::{ReconnectionCoordinator, ResumeOutcome, SkipReason};

/// One conversation being shown by the client.
///
/// Owns the cancellation token for this attach. Detaching (explicitly or by
/// dropping) cancels any pending settle timer and makes in-flight responses be
/// discarded instead of written into local state.
pub struct ChatAttachment {
    coordinator: Arc<ReconnectionCoordinator>,
    ctx: ResumeContext,
    token: CancellationToken,
    generation: u64,
    settle_delay: Duration,
    pending: Mutex<Option<CancellationToken>>,
}

impl ChatAttachment {
    pub fn attach(
        chat_id: ChatId,
        messages: SharedMessageList,
        ctx: ResumeContext,
        config: &ResumeConfig,
    ) -> Self {
        debug!(chat_id = %chat_id, "Attaching conversation");
        let generation = ctx.streams.register(&chat_id);

        let token = CancellationToken::new();
        let coordinator = Arc::new(ReconnectionCoordinator::new(
            chat_id,
            messages,
            ctx.clone(),
            generation,
            token.clone(),
        ));

        Self {
            coordinator,
            ctx,
            token,
            generation,
            settle_delay: config.settle_delay(),
            pending: Mutex::new(None),
        }
    }

    pub fn chat_id(&self) -> &ChatId {
        self.coordinator.chat_id()
    }

    pub fn coordinator(&self) -> &Arc<ReconnectionCoordinator> {
        &self.coordinator
    }

    pub fn is_detached(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Registration generation of this attach in the stream registry.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mark a user-initiated stream into `message_id` as active. Returns
    /// `false` if a stream is already active or this attach was detached.
    pub fn begin_stream(&self, message_id: &MessageId) -> bool {
        self.ctx
            .streams
            .try_begin(self.chat_id(), self.generation, message_id)
    }

    /// Arm the resume check to run after the settle delay.
    ///
    /// Returns `None` when the preconditions do not hold yet. Re-arming
    /// cancels a previously pending timer.
    pub fn schedule_check(&self) -> Option<JoinHandle<ResumeOutcome>> {
        if let Err(reason) = self.coordinator.readiness() {
            debug!(chat_id = %self.chat_id(), %reason, "Resume check not scheduled");
            return None;
        }

        let timer = self.token.child_token();
        if let Some(previous) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(timer.clone())
        {
            previous.cancel();
        }

        let coordinator = Arc::clone(&self.coordinator);
        let attach_token = self.token.clone();
        let delay = self.settle_delay;
        Some(tokio::spawn(async move {
            tokio::select! {
                () = timer.cancelled() => {
                    debug!(chat_id = %coordinator.chat_id(), "Pending resume check cancelled");
                    if attach_token.is_cancelled() {
                        ResumeOutcome::Skipped(SkipReason::Detached)
                    } else {
                        ResumeOutcome::Skipped(SkipReason::Superseded)
                    }
                }
                () = tokio::time::sleep(delay) => coordinator.check_and_resume().await,
            }
        }))
    }

    /// The user stopped the response.
    pub fn abort(&self) {
        self.coordinator.abort();
    }

    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for ChatAttachment {
    fn drop(&mut self) {
        if self.token.is_cancelled() {
            return;
        }
        debug!(chat_id = %self.chat_id(), "Detaching conversation");
        self.token.cancel();
        self.ctx.streams.unregister(self.chat_id(), self.generation);
    }
}
