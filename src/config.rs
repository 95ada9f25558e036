// src/config.rs

//! Converter configuration
//!
//! Everything that is fixed per invocation but not worth a CLI flag lives
//! here: provider binaries, which partitions fold into a rebuilt super
//! image, and where platform-tools come from.
//!
//! ```toml
//! work_root = "/var/tmp/romforge"
//!
//! [tools]
//! lpmake = "/opt/android/bin/lpmake"
//! payload_dumper = "payload-dumper-go"
//! timeout_secs = 1800
//!
//! [super_image]
//! logical_partitions = ["system", "vendor", "product"]
//!
//! [platform_tools]
//! local_dir = "/opt/android/platform-tools"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "ROMFORGE_CONFIG";

/// Latest Windows platform-tools bundle (the Super package ships a `.bat` flasher)
pub const DEFAULT_PLATFORM_TOOLS_URL: &str =
    "https://dl.google.com/android/repository/platform-tools-latest-windows.zip";

/// Provider binaries; bare names are looked up on `PATH`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub simg2img: PathBuf,
    pub lpunpack: PathBuf,
    pub lpmake: PathBuf,
    pub payload_dumper: PathBuf,
    /// Kill a provider that runs longer than this many seconds
    pub timeout_secs: Option<u64>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            simg2img: PathBuf::from("simg2img"),
            lpunpack: PathBuf::from("lpunpack"),
            lpmake: PathBuf::from("lpmake"),
            payload_dumper: PathBuf::from("payload-dumper-go"),
            timeout_secs: None,
        }
    }
}

/// Rebuilt super image settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperImageConfig {
    /// Partitions folded into the container; everything else ships loose
    pub logical_partitions: Vec<String>,
    /// Partition group name passed to the container maker
    pub group_name: String,
    /// Name of the container block device
    pub super_name: String,
}

impl Default for SuperImageConfig {
    fn default() -> Self {
        Self {
            logical_partitions: vec!["system".to_string()],
            group_name: "main".to_string(),
            super_name: "super".to_string(),
        }
    }
}

/// Where the bundled platform flashing tools come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformToolsConfig {
    /// Zip download, used when `local_dir` is unset
    pub url: String,
    /// Pre-fetched `platform-tools` directory, copied verbatim
    pub local_dir: Option<PathBuf>,
}

impl Default for PlatformToolsConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PLATFORM_TOOLS_URL.to_string(),
            local_dir: None,
        }
    }
}

/// Generated installer settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Flash vbmeta with verity and verification disabled (fastboot only)
    pub disable_vbmeta_verification: bool,
}

/// Top-level converter configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Parent of per-job working directories (system temp dir when unset)
    pub work_root: Option<PathBuf>,
    pub tools: ToolPaths,
    pub super_image: SuperImageConfig,
    pub platform_tools: PlatformToolsConfig,
    pub installer: InstallerConfig,
}

impl ForgeConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let config: ForgeConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective config: explicit path, then `$ROMFORGE_CONFIG`,
    /// then the per-user config file, then defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        if let Some(path) = Self::user_config_path()
            && path.exists()
        {
            debug!("Using config file {}", path.display());
            return Self::load(&path);
        }

        Ok(Self::default())
    }

    /// `<config_dir>/romforge/config.toml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("romforge").join("config.toml"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let logical = &self.super_image.logical_partitions;
        if logical.is_empty() {
            return Err(Error::Config(
                "super_image.logical_partitions must name at least one partition".to_string(),
            ));
        }
        if let Some(bad) = logical.iter().find(|name| !is_valid_name(name)) {
            return Err(Error::Config(format!(
                "invalid logical partition name: {bad:?}"
            )));
        }
        if !is_valid_name(&self.super_image.group_name) {
            return Err(Error::Config(format!(
                "invalid group name: {:?}",
                self.super_image.group_name
            )));
        }
        if !is_valid_name(&self.super_image.super_name) {
            return Err(Error::Config(format!(
                "invalid super name: {:?}",
                self.super_image.super_name
            )));
        }
        if self.platform_tools.local_dir.is_none() && self.platform_tools.url.is_empty() {
            return Err(Error::Config(
                "platform_tools needs either url or local_dir".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the working directory root
    pub fn with_work_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.work_root = Some(path.into());
        self
    }

    /// Set the partitions folded into a rebuilt super image
    pub fn with_logical_partitions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.super_image.logical_partitions = names.into_iter().map(Into::into).collect();
        self
    }

    /// Use a local platform-tools directory instead of downloading
    pub fn with_platform_tools_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.platform_tools.local_dir = Some(path.into());
        self
    }

    /// Whether a partition belongs inside the rebuilt container
    pub fn is_logical(&self, name: &str) -> bool {
        self.super_image.logical_partitions.iter().any(|n| n == name)
    }
}

/// Partition and group names end up in shell and lpmake arguments
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
