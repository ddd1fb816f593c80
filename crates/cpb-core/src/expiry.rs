//! Self-destructing posts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::{domain::MessageRef, messaging::port::MessagingPort};

/// Delete `messages` once `at` is reached.
///
/// Runs on a detached task; pending deletions are lost if the process exits first.
pub fn schedule_deletion(
    messenger: Arc<dyn MessagingPort>,
    messages: Vec<MessageRef>,
    at: DateTime<Utc>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let wait = (at - Utc::now()).to_std().unwrap_or_default();
        tracing::debug!(count = messages.len(), wait_secs = wait.as_secs(), "self-destruct armed");
        tokio::time::sleep(wait).await;

        for msg in messages {
            if let Err(e) = messenger.delete_message(msg).await {
                tracing::warn!(
                    chat_id = msg.chat_id.0,
                    message_id = msg.message_id.0,
                    error = %e,
                    "self-destruct delete failed"
                );
            }
        }
    })
}
