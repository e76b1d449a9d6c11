//! Mount configuration
//!
//! Read from `config.toml` in the user's config directory
//! (`~/.config/filermount/config.toml` on Linux) or from an explicit file.
//! Every field has a default, so a missing file or a partial one is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fuser::MountOption;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Filesystem name shown in the mount table
    pub fs_name: String,
    pub read_only: bool,
    pub allow_other: bool,
    pub auto_unmount: bool,
    /// How long the kernel may cache attributes and entries
    pub attr_ttl_secs: u64,
    /// Default log level when neither `RUST_LOG` nor `--log-level` is set
    pub log_level: Option<String>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            fs_name: "filermount".to_string(),
            read_only: false,
            allow_other: false,
            auto_unmount: true,
            attr_ttl_secs: 1,
            log_level: None,
        }
    }
}

impl MountConfig {
    /// Default location: `<config dir>/filermount/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("filermount")
            .join("config.toml")
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load `path` if given, otherwise the default file if it exists
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }

    /// Options passed to `fuser::mount2`
    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(self.fs_name.clone()),
            MountOption::DefaultPermissions,
        ];
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.read_only {
            options.push(MountOption::RO);
        }
        options
    }
}
