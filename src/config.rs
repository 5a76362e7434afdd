//! Code for the configuration of the application.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// The configuration of the application.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Root directory of the slicer configuration store.
    #[serde(default = "default_config_root")]
    pub config_root: PathBuf,

    /// Directory holding per-job temporary artifacts. Created at startup
    /// if absent.
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,

    /// Path to the external slicer executable. The `SLICER_EXECUTABLE_PATH`
    /// environment variable overrides this.
    #[serde(default)]
    pub slicer_path: PathBuf,

    /// Run the slicer with verbose output and log at debug level.
    #[serde(default)]
    pub debug: bool,

    /// Accept the self-signed certificate Bambu Lab printers present on
    /// their LAN FTPS interface. Defaults to true; operators exposing the
    /// server to anything beyond a trusted LAN should turn this off.
    #[serde(default = "default_true")]
    pub ftp_accept_invalid_certs: bool,
}

fn default_config_root() -> PathBuf {
    PathBuf::from("slicer-configs")
}

fn default_temp_root() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_root: default_config_root(),
            temp_root: default_temp_root(),
            slicer_path: PathBuf::new(),
            debug: false,
            ftp_accept_invalid_certs: true,
        }
    }
}

impl Config {
    /// Parse a configuration from a toml file, applying environment
    /// overrides on top.
    pub fn from_file(file: &PathBuf) -> Result<Self> {
        let config = std::fs::read_to_string(file)?;
        let mut config = Self::from_str(&config)?;
        if let Ok(slicer_path) = std::env::var("SLICER_EXECUTABLE_PATH") {
            config.slicer_path = PathBuf::from(slicer_path);
        }
        Ok(config)
    }

    /// Parse a configuration from a toml string.
    pub fn from_str(config: &str) -> Result<Self> {
        Ok(toml::from_str(config)?)
    }
}
