// ABOUTME: Standard locations for the chatlog config file and artifact directory
// ABOUTME: Config lives in the XDG config dir, artifacts in a fixed folder under the temp root

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "chatlog";
const APPLICATION: &str = "chatlog";

/// Folder under the platform temp root holding generated chat log files
pub const ARTIFACT_DIR_NAME: &str = "chatlog_files";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Get the config directory path (e.g., ~/.config/chatlog/)
/// Falls back to current directory if XDG directories unavailable
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// e.g., ~/.config/chatlog/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default managed directory, e.g. /tmp/chatlog_files
pub fn artifact_dir() -> PathBuf {
    std::env::temp_dir().join(ARTIFACT_DIR_NAME)
}
