//! Configuration management for the bridge
//!
//! Loaded from a YAML file (`config.yaml` by default) with CLI/env overrides
//! applied in `main`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Upstream gateway service settings
    pub service: ServiceConfig,

    /// Plain-POST notification endpoint (online/offline transitions,
    /// red-packet notices); disabled when absent
    #[serde(default)]
    pub notify_url: Option<String>,

    /// File-backed store locations and attachment save directories
    #[serde(default)]
    pub storage: StorageConfig,

    /// Idiom-learning side task settings
    #[serde(default)]
    pub idiom: IdiomConfig,
}

/// Upstream gateway service settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Port the webhook ingress listens on
    pub port: u16,

    /// Local account identity at the upstream gateway
    pub account_id: String,

    /// Base URL of the upstream gateway REST surface
    pub base_url: String,
}

/// File-backed store locations and attachment save directories
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Contact mapping file
    #[serde(default = "default_contact_file")]
    pub contact_file: PathBuf,

    /// Group member directory file
    #[serde(default = "default_group_file")]
    pub group_file: PathBuf,

    /// Save directory for downloaded images; `null` keeps images in memory
    #[serde(default = "default_image_dir")]
    pub image_dir: Option<PathBuf>,

    /// Save directory for downloaded files; `null` keeps files in memory
    #[serde(default = "default_file_dir")]
    pub file_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            contact_file: default_contact_file(),
            group_file: default_group_file(),
            image_dir: default_image_dir(),
            file_dir: default_file_dir(),
        }
    }
}

/// Idiom-learning side task settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdiomConfig {
    /// Sender ids whose text and image messages feed the idiom learner
    #[serde(default)]
    pub watch_senders: Vec<String>,
}

fn default_contact_file() -> PathBuf {
    PathBuf::from("contact.json")
}

fn default_group_file() -> PathBuf {
    PathBuf::from("group.json")
}

fn default_image_dir() -> Option<PathBuf> {
    Some(PathBuf::from("chat_images"))
}

fn default_file_dir() -> Option<PathBuf> {
    Some(PathBuf::from("chat_files"))
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or fails validation
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate required fields
    ///
    /// # Errors
    ///
    /// Returns error if a required field is empty
    pub fn validate(&self) -> Result<()> {
        if self.service.account_id.is_empty() {
            return Err(Error::Config("service.account_id must not be empty".into()));
        }
        if self.service.base_url.is_empty() {
            return Err(Error::Config("service.base_url must not be empty".into()));
        }
        if self.service.port == 0 {
            return Err(Error::Config("service.port must not be zero".into()));
        }
        Ok(())
    }
}
