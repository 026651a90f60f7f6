//! Configuration file (`mpdev.toml`)
//!
//! Looked up in the current directory first, then in the user configuration
//! directory. Every field is optional; a missing file means defaults.
//!
//! ```toml
//! chip = "esp32"
//! baud = 460800
//! exclusions = [".git", "__pycache__", "*.log"]
//! ```

use directories::ProjectDirs;
use mpdev_command::ToolPaths;
use mpdev_core::local::Exclusions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const FILE_NAME: &str = "mpdev.toml";

/// Errors loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but cannot be read
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema
    #[error("invalid configuration in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Tool settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Program used for file operations
    pub file_tool: String,
    /// Program used for firmware operations
    pub flash_tool: String,
    /// Program used for interactive sessions
    pub repl_tool: String,
    /// Chip family passed to the flash tool
    pub chip: String,
    /// Flash baud rate
    pub baud: u32,
    /// Baud rate used to interrupt a running program
    pub serial_baud: u32,
    /// Over-the-air write chunk size
    pub ota_chunk_size: usize,
    /// Socket transport frame size
    pub socket_chunk_size: usize,
    /// Socket transport websocket path
    pub socket_path: String,
    /// Local paths never uploaded
    pub exclusions: Vec<String>,
    /// Pause between remote deletions
    pub delete_throttle_ms: u64,
    /// Pause after flashing before a session is opened
    pub settle_ms: u64,
    /// Bound on opening a socket connection
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_tool: "ampy".to_string(),
            flash_tool: "esptool".to_string(),
            repl_tool: "mpremote".to_string(),
            chip: "esp32s3".to_string(),
            baud: 921_600,
            serial_baud: 115_200,
            ota_chunk_size: 1024,
            socket_chunk_size: 1024,
            socket_path: "/ws".to_string(),
            exclusions: vec![
                ".git".to_string(),
                ".vscode".to_string(),
                "__pycache__".to_string(),
            ],
            delete_throttle_ms: 1000,
            settle_ms: 1000,
            connect_timeout_secs: 20,
        }
    }
}

impl Config {
    /// Load `explicit`, or the first file found in the default locations
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        for path in Self::search_paths() {
            if path.is_file() {
                return Self::from_file(&path);
            }
        }
        log::debug!("No {} found, using defaults", FILE_NAME);
        Ok(Self::default())
    }

    /// Candidate files, in lookup order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(FILE_NAME)];
        if let Some(dirs) = ProjectDirs::from("", "", "mpdev") {
            paths.push(dirs.config_dir().join(FILE_NAME));
        }
        paths
    }

    /// Parse one file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// External tool names
    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths {
            file_tool: self.file_tool.clone(),
            flash_tool: self.flash_tool.clone(),
        }
    }

    /// Configured exclusions plus `extra`
    pub fn exclusions(&self, extra: &[String]) -> Exclusions {
        let mut exclusions = Exclusions::new(&self.exclusions);
        exclusions.extend(extra);
        exclusions
    }

    /// Pause between remote deletions
    pub fn delete_throttle(&self) -> Duration {
        Duration::from_millis(self.delete_throttle_ms)
    }

    /// Pause after flashing
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Socket transport settings
    #[cfg(feature = "socket")]
    pub fn socket_config(&self) -> mpdev_socket::SocketConfig {
        mpdev_socket::SocketConfig {
            chunk_size: self.socket_chunk_size,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            path: self.socket_path.clone(),
            ..Default::default()
        }
    }
}
