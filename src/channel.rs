// ABOUTME: Reply channel abstraction between the message handler and the chat host
// ABOUTME: Includes the event context, a console channel, and a mock channel for tests

use anyhow::Result;
use async_trait::async_trait;
use chatlog_core::IncomingMessage;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Content the handler asks the host to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Plain text message
    Plain(String),
    /// Text preface followed by a file attachment
    Attachment { preface: String, path: PathBuf },
}

impl MessageContent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain(text.into())
    }

    pub fn attachment(preface: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Attachment {
            preface: preface.into(),
            path: path.into(),
        }
    }
}

/// A message event as seen by the handler.
///
/// Setting `default_prevented` tells the host to skip its own reply.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub message: IncomingMessage,
    default_prevented: bool,
}

impl EventContext {
    pub fn new(message: IncomingMessage) -> Self {
        Self {
            message,
            default_prevented: false,
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Where replies go. Transport is the host's business.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    async fn send(&self, content: MessageContent) -> Result<()>;

    /// Channel identifier for logging
    fn channel_id(&self) -> &str;
}

// =============================================================================
// Console Implementation
// =============================================================================

/// Prints replies to stdout; used by the local console host
#[derive(Debug, Clone)]
pub struct ConsoleChannel {
    channel_id: String,
}

impl ConsoleChannel {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
        }
    }
}

#[async_trait]
impl ReplyChannel for ConsoleChannel {
    async fn send(&self, content: MessageContent) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let rendered = match content {
            MessageContent::Plain(text) => format!("{}\n", text),
            MessageContent::Attachment { preface, path } => {
                format!("{}\n[file] {}\n", preface.trim_end(), path.display())
            }
        };
        let mut stdout = tokio::io::stdout();
        stdout.write_all(rendered.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

/// Records every reply; can be switched to fail sends
#[derive(Debug, Default, Clone)]
pub struct MockChannel {
    pub channel_id: String,
    pub messages: Arc<Mutex<Vec<MessageContent>>>,
    pub fail_sends: bool,
}

impl MockChannel {
    pub fn new(channel_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            ..Default::default()
        }
    }

    /// A channel whose sends always error, like a dropped connection
    pub fn failing(channel_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            fail_sends: true,
            ..Default::default()
        }
    }

    pub fn get_messages(&self) -> Vec<MessageContent> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_message(&self) -> Option<MessageContent> {
        self.get_messages().pop()
    }
}

#[async_trait]
impl ReplyChannel for MockChannel {
    async fn send(&self, content: MessageContent) -> Result<()> {
        if self.fail_sends {
            anyhow::bail!("mock channel {} refused to send", self.channel_id);
        }
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(content);
        Ok(())
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }
}
