//! Configuration loading entrypoints.

use super::{defaults, sources, StackConfig};
use crate::error::ContextError;
use config::{Environment, File};
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace files,
    /// `CTXSTACK__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<StackConfig, ContextError> {
        let builder = defaults::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(Self::environment());

        let config: StackConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from one explicit file (plus defaults and environment).
    pub fn load_from_file(path: &Path) -> Result<StackConfig, ContextError> {
        let file = path.to_str().ok_or_else(|| {
            ContextError::Config(format!("Config path is not valid UTF-8: {:?}", path))
        })?;
        let config: StackConfig = defaults::builder_with_defaults()?
            .add_source(File::with_name(file).required(true))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix("CTXSTACK")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }
}
