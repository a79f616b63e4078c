//! Configuration
//!
//! Loaded from `~/.ragpilot/config.toml`, created with defaults on first
//! run. Policy thresholds are validated at load time: a misconfigured
//! policy refuses to start rather than silently misclassify.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::errors::{RagError, Result};
use crate::policy::PolicyConfig;
use crate::providers::embedding::EmbeddingConfig;
use crate::providers::generation::GenerationConfig;
use crate::providers::search::IndexConfig;

/// Environment variable overriding the provider API key
pub const API_KEY_ENV: &str = "RAGPILOT_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub index: IndexConfig,
    /// Candidates requested per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::default(),
            session: SessionConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            index: IndexConfig::default(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Conversations not accessed within this window are expired
    pub timeout_secs: u64,
    /// Where conversation records are stored; defaults to
    /// `~/.ragpilot/sessions` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 24 * 60 * 60,
            storage_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from file, creating the default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .map_err(|e| RagError::Config(format!("failed to read config file: {}", e)))?;
            toml::from_str(&contents)
                .map_err(|e| RagError::Config(format!("failed to parse config file: {}", e)))?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.embedding.api_key = Some(key.clone());
            config.generation.api_key = Some(key);
        }

        config.policy.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| RagError::Config(format!("failed to create config directory: {}", e)))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| RagError::Config(format!("failed to serialize config: {}", e)))?;

        fs::write(&config_path, toml_string)
            .map_err(|e| RagError::Config(format!("failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| RagError::Config("could not determine home directory".to_string()))?;
        Ok(home.join(".ragpilot").join("config.toml"))
    }

    /// Default location for on-disk conversation records
    pub fn default_session_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| RagError::Config("could not determine home directory".to_string()))?;
        Ok(home.join(".ragpilot").join("sessions"))
    }
}
