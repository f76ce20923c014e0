// ABOUTME: Error types for artifact creation and policy validation
// ABOUTME: Deletion problems are not errors here; they surface as DeletionOutcome::Failed

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Invalid conversion policy: {0}")]
    InvalidPolicy(String),

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not find a free filename in {} after {attempts} attempts", .dir.display())]
    NameExhausted { dir: PathBuf, attempts: usize },
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures the host should report as "processing failed, please retry"
    pub fn is_io(&self) -> bool {
        matches!(self, ArtifactError::Io { .. } | ArtifactError::NameExhausted { .. })
    }
}
