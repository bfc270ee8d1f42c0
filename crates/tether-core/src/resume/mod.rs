//! Stream reconnection and resumption.
//!
//! When a conversation is attached, the [`ReconnectionCoordinator`] asks the
//! server whether a response is still being generated and, if so, resumes
//! consuming it from the furthest known sequence number. Three sources of truth
//! are reconciled: the persisted cursor, the cached message, and the server
//! status. A failed resumption restores the message from a [`MessageSnapshot`].

mod attachment;
mod context;
mod coordinator;
mod reconcile;
mod snapshot;
mod stream_state;

#[cfg(test)]
mod tests;

pub use attachment::ChatAttachment;
pub use context::ResumeContext;
pub use coordinator::{ReconnectionCoordinator, ResumeOutcome, SkipReason};
pub use reconcile::{ResumePlan, ResumeTarget, plan_resume, resume_offset};
pub use snapshot::{MessageSnapshot, SnapshotBuffer};
pub use stream_state::{StreamRegistry, StreamState};
