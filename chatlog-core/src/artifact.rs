// ABOUTME: Artifact data types and the atomic file writer behind them
// ABOUTME: Renders the chat log header and persists files under collision-resistant names

use crate::error::ArtifactError;
use chrono::{DateTime, Local, Utc};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// How many fresh suffixes to try before giving up on a filename
const MAX_NAME_ATTEMPTS: usize = 8;

/// Length of the random token appended to every filename
const SUFFIX_LEN: usize = 8;

/// A chat message as delivered by the host's event dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub text: String,
    pub sender_id: String,
    /// Set when the message was posted in a group rather than a direct chat
    pub group_id: Option<String>,
}

impl IncomingMessage {
    pub fn direct(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender_id: sender_id.into(),
            group_id: None,
        }
    }

    pub fn group(
        group_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            sender_id: sender_id.into(),
            group_id: Some(group_id.into()),
        }
    }

    pub fn is_group(&self) -> bool {
        self.group_id.is_some()
    }
}

/// Reference to a file created for an overlong message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactHandle {
    /// Absolute path of the file
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl ArtifactHandle {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Lifecycle of an artifact: Created -> (Served) -> Deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Created,
    /// The host attached the file to a reply
    Served,
    Deleted,
}

impl std::fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactState::Created => write!(f, "created"),
            ArtifactState::Served => write!(f, "served"),
            ArtifactState::Deleted => write!(f, "deleted"),
        }
    }
}

/// Render the file body: header block followed by the message text verbatim
pub fn render_content(
    banner: &str,
    text: &str,
    message: &IncomingMessage,
    generated_at: DateTime<Utc>,
) -> String {
    let local = generated_at.with_timezone(&Local);
    let mut out = String::with_capacity(text.len() + 128);
    out.push_str(banner);
    out.push('\n');
    out.push_str(&format!("Time: {}\n", local.format("%Y-%m-%d %H:%M:%S")));
    if let Some(group_id) = &message.group_id {
        out.push_str(&format!("Group: {}\n", group_id));
    }
    out.push_str(&format!("Sender: {}\n", message.sender_id));
    out.push_str("\nMessage:\n");
    out.push_str(text);
    out
}

/// `<prefix><YYYYmmddHHMMSS>-<suffix>.txt`
pub fn artifact_filename(prefix: &str, created_at: DateTime<Utc>, suffix: &str) -> String {
    let stamp = created_at.with_timezone(&Local).format("%Y%m%d%H%M%S");
    format!("{}{}-{}.txt", prefix, stamp, suffix)
}

fn unique_suffix() -> String {
    let mut token = uuid::Uuid::new_v4().simple().to_string();
    token.truncate(SUFFIX_LEN);
    token
}

/// Write `content` to a new file in `dir` and return its path.
///
/// The content goes to a hidden temp file first and is then linked into place
/// without overwriting anything. Either the full file exists afterwards or
/// nothing does.
pub(crate) fn write_atomic(
    dir: &Path,
    prefix: &str,
    created_at: DateTime<Utc>,
    content: &str,
) -> Result<PathBuf, ArtifactError> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let target = dir.join(artifact_filename(prefix, created_at, &unique_suffix()));

        let mut tmp = tempfile::Builder::new()
            .prefix(".chatlog-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| ArtifactError::io(dir, e))?;
        let tmp_path = tmp.path().to_path_buf();

        // On early return the NamedTempFile drop removes the partial file
        tmp.write_all(content.as_bytes())
            .map_err(|e| ArtifactError::io(&tmp_path, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| ArtifactError::io(&tmp_path, e))?;

        match tmp.persist_noclobber(&target) {
            Ok(_) => return Ok(target),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(path = %target.display(), "Artifact name taken, retrying");
                continue;
            }
            Err(e) => return Err(ArtifactError::io(&target, e.error)),
        }
    }

    Err(ArtifactError::NameExhausted {
        dir: dir.to_path_buf(),
        attempts: MAX_NAME_ATTEMPTS,
    })
}
