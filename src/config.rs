//! Configuration System
//!
//! Layered configuration for the store, context defaults and logging. Sources
//! are merged with the `config` crate: defaults, the global user file, the
//! workspace files, then `CTXSTACK__*` environment variables.

use crate::context::MergePolicy;
use crate::error::ContextError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod defaults;
mod facade;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub contexts: ContextsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of the sled database
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Use an in-memory store that is discarded on exit
    #[serde(default)]
    pub temporary: bool,

    /// Background flush interval; sled's default when unset
    #[serde(default)]
    pub flush_every_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            temporary: false,
            flush_every_ms: None,
        }
    }
}

/// Defaults for newly created contexts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextsConfig {
    /// Merge policy of parent-linked contexts; the root always uses
    /// `in_memory_wins`
    #[serde(default)]
    pub child_merge_policy: MergePolicy,
}

pub(crate) fn default_store_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "ctxstack")
        .map(|dirs| dirs.data_dir().join("store"))
        .unwrap_or_else(|| PathBuf::from(".ctxstack/store"))
}

impl StackConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ContextError> {
        if !self.store.temporary && self.store.path.as_os_str().is_empty() {
            return Err(ContextError::Config(
                "store.path cannot be empty unless store.temporary is set".to_string(),
            ));
        }
        if self.store.flush_every_ms == Some(0) {
            return Err(ContextError::Config(
                "store.flush_every_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ContextError> {
        toml::to_string_pretty(self)
            .map_err(|e| ContextError::Config(format!("Failed to render config: {}", e)))
    }
}
