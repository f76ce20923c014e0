// ABOUTME: Message handler that swaps overlong chat messages for a chat log file reply
// ABOUTME: Decides via the conversion policy, creates the artifact, replies, and schedules cleanup

use crate::channel::{EventContext, MessageContent, ReplyChannel};
use anyhow::Result;
use chatlog_core::{ArtifactManager, Decision};
use std::sync::Arc;

/// Sent ahead of the attachment
pub const ATTACHMENT_PREFACE: &str = "The following message was converted to a chat log file:\n";

/// Sent when the file could not be written
pub const FAILURE_REPLY: &str = "Failed to convert your message to a file, please try again.";

/// Result of handling a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleResult {
    /// Message was replaced by a file reply
    Converted,
    /// Policy declined; host keeps its default behaviour
    Ignored(Decision),
    /// File creation failed; the user was told to retry
    Failed(String),
}

/// Plugin-side handler wrapping a shared [`ArtifactManager`]
#[derive(Debug, Clone)]
pub struct LongMessageHandler {
    manager: Arc<ArtifactManager>,
}

impl LongMessageHandler {
    pub fn new(manager: Arc<ArtifactManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ArtifactManager> {
        &self.manager
    }

    /// Handle one incoming message.
    ///
    /// The retention timer starts once the send has finished, whether or not
    /// it succeeded, so the file stays readable for the whole upload. Reply
    /// errors are logged, not returned.
    pub async fn handle(
        &self,
        ctx: &mut EventContext,
        channel: &dyn ReplyChannel,
    ) -> Result<HandleResult> {
        let text = ctx.message.text.trim().to_string();

        let decision = self.manager.evaluate(&text);
        if !decision.is_convert() {
            tracing::debug!(
                channel = %channel.channel_id(),
                chars = text.chars().count(),
                decision = %decision,
                "Message not converted"
            );
            return Ok(HandleResult::Ignored(decision));
        }

        let handle = match self.manager.create_artifact(&text, &ctx.message) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    channel = %channel.channel_id(),
                    error = %e,
                    "Failed to create chat log file"
                );
                ctx.prevent_default();
                if let Err(send_err) = channel.send(MessageContent::plain(FAILURE_REPLY)).await {
                    tracing::error!(
                        channel = %channel.channel_id(),
                        error = %send_err,
                        "Failed to send failure reply"
                    );
                }
                return Ok(HandleResult::Failed(e.to_string()));
            }
        };

        ctx.prevent_default();
        match channel
            .send(MessageContent::attachment(ATTACHMENT_PREFACE, &handle.path))
            .await
        {
            Ok(()) => {
                self.manager.mark_served(&handle);
            }
            Err(e) => {
                tracing::error!(
                    channel = %channel.channel_id(),
                    path = %handle.path.display(),
                    error = %e,
                    "Failed to send chat log file"
                );
            }
        }

        let policy = self.manager.policy();
        if policy.keep_files {
            self.manager.release(&handle);
        } else {
            // Detached: the timer outlives this call
            let _ = self.manager.schedule_deletion(&handle, policy.retention());
        }

        Ok(HandleResult::Converted)
    }
}
