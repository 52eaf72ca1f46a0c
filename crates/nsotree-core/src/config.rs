//! Run settings: endpoint credentials, bucket and output locations
//!
//! Settings are layered. Built-in defaults come first, then an optional JSON
//! config file, then whatever the command line overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::source::S3Config;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "nsotree.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub access_id: String,
    pub access_secret: String,
    /// Endpoint FQDN or IP address
    pub host: String,
    pub port: u16,
    pub is_secure: bool,
    pub region: String,
    /// Bucket configured for the NAS bridge
    pub bucket: String,
    pub output_json: PathBuf,
    pub debug: bool,
    pub log: PathBuf,
    pub parallel: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            access_id: String::new(),
            access_secret: String::new(),
            host: String::new(),
            port: 8082, // StorageGRID default S3 port
            is_secure: true,
            region: "us-east-1".to_string(),
            bucket: String::new(),
            output_json: PathBuf::from("nso.json"),
            debug: false,
            log: PathBuf::from("nso2inode.log"),
            parallel: false,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file; missing fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load `explicit` if given, otherwise the first default location that
    /// exists, otherwise built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        for candidate in Self::default_paths() {
            if candidate.is_file() {
                tracing::debug!("Using config file {}", candidate.display());
                return Self::load(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// `./nsotree.json`, then `<config dir>/nsotree/config.json`
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("nsotree").join("config.json"));
        }
        paths
    }

    /// Check the settings a bucket scan depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.access_id.is_empty() || self.access_secret.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        Ok(())
    }

    pub fn s3_config(&self) -> S3Config {
        S3Config {
            access_id: self.access_id.clone(),
            access_secret: self.access_secret.clone(),
            host: self.host.clone(),
            port: self.port,
            is_secure: self.is_secure,
            region: self.region.clone(),
            bucket: self.bucket.clone(),
        }
    }
}
