//! Configuration module

use crate::{Error, Result};
use dirs::config_dir;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log every visited entry at `info` level from the default visitors
    pub verbose: bool,
    /// Glob patterns matched against base names; matches are skipped when packing
    pub exclude: Vec<String>,
    /// Follow symlinks when packing
    pub follow_symlinks: bool,
    /// Record and restore unix permissions
    pub preserve_permissions: bool,
    /// Record and restore modification times
    pub preserve_timestamps: bool,
    /// File mode applied to archives created from scratch
    pub default_permission: u32,
    /// Parent directory for flush scratch trees (system temp dir if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: true,
            exclude: vec![".git".to_string(), ".svn".to_string(), ".hg".to_string()],
            follow_symlinks: false,
            preserve_permissions: true,
            preserve_timestamps: true,
            default_permission: 0o644,
            scratch_dir: None,
        }
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir().ok_or_else(|| {
            Error::Config("Unable to determine config directory".to_string())
        })?;

        let zipbox_dir = config_dir.join("zipbox");
        if !zipbox_dir.exists() {
            fs::create_dir_all(&zipbox_dir)?;
        }

        Ok(zipbox_dir.join("config.toml"))
    }

    /// Get default configuration content with examples
    pub fn default_config_content() -> String {
        r#"# zipbox configuration file

# Log every extracted or packed entry at info level
verbose = true

# Base names skipped when packing a directory (glob patterns)
exclude = [".git", ".svn", ".hg"]

# Follow symlinks when packing
follow_symlinks = false

# Record and restore unix permissions and modification times
preserve_permissions = true
preserve_timestamps = true

# Mode of archives created from scratch (420 = 0o644)
default_permission = 420

# Where flush stages its scratch trees (defaults to the system temp dir)
# scratch_dir = "/var/tmp/zipbox"
"#
        .to_string()
    }

    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            fs::write(&path, Self::default_config_content())?;
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.exclude_patterns()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&path, contents)?;
        Ok(())
    }

    /// Load configuration or use defaults if loading fails
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Compile the exclusion globs
    pub fn exclude_patterns(&self) -> Result<Vec<Pattern>> {
        self.exclude
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| Error::Config(format!("Invalid exclude pattern {:?}: {}", p, e)))
            })
            .collect()
    }

    /// Directory under which flush creates its scratch trees
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
