//! Defaults applied beneath every other configuration source.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default(
            "store.path",
            super::default_store_path().to_string_lossy().to_string(),
        )?
        .set_default("store.temporary", false)?
        .set_default("contexts.child_merge_policy", "error")
}
