// ABOUTME: Conversion policy deciding which messages become chat log files
// ABOUTME: Holds length thresholds, filename prefix, banner, and retention window

use crate::error::ArtifactError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds and naming rules governing message-to-file conversion.
///
/// Loaded once and never mutated afterwards. `threshold_chars <= max_chars`
/// is enforced by [`ConversionPolicy::validate`], which the manager calls
/// on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionPolicy {
    /// Minimum length (in characters) that triggers conversion
    #[serde(default = "default_threshold_chars")]
    pub threshold_chars: usize,
    /// Maximum length (in characters) still eligible for conversion
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Prepended to every generated filename
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
    /// Seconds a file lives before it is deleted
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// First line of every generated file
    #[serde(default = "default_banner")]
    pub banner: String,
    /// Debug switch: never schedule deletion of generated files
    #[serde(default)]
    pub keep_files: bool,
}

fn default_threshold_chars() -> usize {
    200
}

fn default_max_chars() -> usize {
    5000
}

fn default_filename_prefix() -> String {
    "chatlog-".to_string()
}

fn default_retention_secs() -> u64 {
    30
}

fn default_banner() -> String {
    "=== Chat Log ===".to_string()
}

impl Default for ConversionPolicy {
    fn default() -> Self {
        Self {
            threshold_chars: default_threshold_chars(),
            max_chars: default_max_chars(),
            filename_prefix: default_filename_prefix(),
            retention_secs: default_retention_secs(),
            banner: default_banner(),
            keep_files: false,
        }
    }
}

/// Outcome of evaluating a message against the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Message should be turned into a file
    Convert,
    /// Below `threshold_chars`; host keeps its default handling
    TooShort,
    /// Above `max_chars`; host keeps its default handling
    TooLong,
}

impl Decision {
    pub fn is_convert(self) -> bool {
        self == Decision::Convert
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Convert => write!(f, "convert"),
            Decision::TooShort => write!(f, "too_short"),
            Decision::TooLong => write!(f, "too_long"),
        }
    }
}

impl ConversionPolicy {
    /// Check the policy's invariants
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.threshold_chars > self.max_chars {
            return Err(ArtifactError::InvalidPolicy(format!(
                "threshold_chars ({}) must not exceed max_chars ({})",
                self.threshold_chars, self.max_chars
            )));
        }
        if self
            .filename_prefix
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0')
        {
            return Err(ArtifactError::InvalidPolicy(format!(
                "filename_prefix must not contain path separators, got: {:?}",
                self.filename_prefix
            )));
        }
        Ok(())
    }

    /// Classify a message text by its length in characters
    pub fn evaluate(&self, text: &str) -> Decision {
        let len = text.chars().count();
        if len < self.threshold_chars {
            Decision::TooShort
        } else if len > self.max_chars {
            Decision::TooLong
        } else {
            Decision::Convert
        }
    }

    pub fn should_convert(&self, text: &str) -> bool {
        self.evaluate(text).is_convert()
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// True iff `threshold_chars <= len(text) <= max_chars`
pub fn should_convert(text: &str, policy: &ConversionPolicy) -> bool {
    policy.should_convert(text)
}
