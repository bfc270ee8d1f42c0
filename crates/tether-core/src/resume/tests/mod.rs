mod lifecycle;

use crate::resume::ChatAttachment;
use crate::test_utils::Harness;

fn attach(harness: &Harness) -> ChatAttachment {
    ChatAttachment::attach(
        harness.chat_id.clone(),
        harness.messages.clone(),
        harness.ctx.clone(),
        &harness.config(),
    )
}
