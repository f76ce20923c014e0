// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Resolves the artifact directory and validates the conversion policy

use crate::paths;
use anyhow::{Context, Result};
use chatlog_core::ConversionPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub conversion: ConversionPolicy,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Managed artifact directory; defaults to a fixed folder under the temp root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Sweep the whole directory on shutdown, not just files this process tracks
    #[serde(default = "default_true")]
    pub purge_on_shutdown: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            purge_on_shutdown: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Expand tilde (~) to home directory in paths
/// Logs a warning if expansion fails and falls back to the original path
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(
            path = %path,
            "Failed to expand tilde in path: could not determine home directory"
        );
    } else if path == "~" {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs.home_dir().to_string_lossy().to_string();
        }
        tracing::warn!("Failed to expand tilde: could not determine home directory");
    }
    path.to_string()
}

fn parse_bool(name: &str, val: &str) -> Result<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be a boolean, got: {}", name, val),
    }
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. CHATLOG_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/chatlog/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("CHATLOG_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from the first config file found, with env overrides
    pub fn load() -> Result<Self> {
        let config = if let Some(config_path) = Self::find_config_file() {
            Self::read_file(&config_path)?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };
        config.finish()
    }

    /// Load configuration from an explicit path, with env overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::read_file(path)?.finish()
    }

    fn read_file(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_env_overrides()?;
        if let Some(dir) = self.storage.dir.as_deref() {
            self.storage.dir = Some(expand_tilde(dir));
        }
        self.validate()?;
        Ok(self)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("CHATLOG_THRESHOLD") {
            self.conversion.threshold_chars = val.parse().with_context(|| {
                format!("CHATLOG_THRESHOLD must be a valid number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("CHATLOG_MAX_CHARS") {
            self.conversion.max_chars = val.parse().with_context(|| {
                format!("CHATLOG_MAX_CHARS must be a valid number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("CHATLOG_FILE_PREFIX") {
            self.conversion.filename_prefix = val;
        }
        if let Ok(val) = std::env::var("CHATLOG_RETENTION_SECS") {
            self.conversion.retention_secs = val.parse().with_context(|| {
                format!("CHATLOG_RETENTION_SECS must be a valid number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("CHATLOG_KEEP_FILES") {
            self.conversion.keep_files = parse_bool("CHATLOG_KEEP_FILES", &val)?;
        }
        if let Ok(val) = std::env::var("CHATLOG_DIR") {
            self.storage.dir = Some(val);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.conversion
            .validate()
            .context("Invalid [conversion] configuration")?;
        if let Some(dir) = &self.storage.dir {
            if dir.trim().is_empty() {
                anyhow::bail!("storage.dir must not be empty when set");
            }
        }
        Ok(())
    }

    /// Resolved managed directory
    pub fn artifact_dir(&self) -> PathBuf {
        self.storage
            .dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::artifact_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.conversion, ConversionPolicy::default());
        assert!(config.storage.purge_on_shutdown);
        assert!(config.storage.dir.is_none());
        assert_eq!(config.artifact_dir(), paths::artifact_dir());
    }

    #[test]
    fn test_conversion_table_deserialize() {
        let toml_str = r#"
            [conversion]
            threshold_chars = 100
            max_chars = 1000
            filename_prefix = "[log]"
            retention_secs = 5
            keep_files = true

            [storage]
            dir = "/var/tmp/chatlog"
            purge_on_shutdown = false
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.conversion.threshold_chars, 100);
        assert_eq!(config.conversion.max_chars, 1000);
        assert_eq!(config.conversion.filename_prefix, "[log]");
        assert_eq!(config.conversion.retention_secs, 5);
        assert!(config.conversion.keep_files);
        assert_eq!(config.artifact_dir(), PathBuf::from("/var/tmp/chatlog"));
        assert!(!config.storage.purge_on_shutdown);
    }

    #[test]
    fn test_validate_rejects_threshold_above_max() {
        let mut config = Config::default();
        config.conversion.threshold_chars = 10;
        config.conversion.max_chars = 5;
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("must not exceed"));
    }

    #[test]
    fn test_validate_rejects_blank_dir() {
        let mut config = Config::default();
        config.storage.dir = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(!parse_bool("X", "Off").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_expand_tilde_leaves_plain_paths_alone() {
        assert_eq!(expand_tilde("/tmp/chatlog"), "/tmp/chatlog");
        assert_eq!(expand_tilde("relative/dir"), "relative/dir");
    }
}
