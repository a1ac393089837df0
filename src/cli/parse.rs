//! CLI parse: clap types for ctxstack. No behavior; definitions only.

use crate::types::{AttributeValue, ObjectId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ctxstack CLI - edit objects through the default/root context stack
#[derive(Parser)]
#[command(name = "ctxstack")]
#[command(about = "Edit stored objects through a confined persistence-context stack")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Store directory (overrides store.path)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Insert a new object and save it to the store
    Insert {
        /// Entity name
        entity: String,
        /// Attribute assignment, key=value (repeatable)
        #[arg(long = "set", value_parser = parse_assignment)]
        values: Vec<(String, AttributeValue)>,
    },
    /// Change attributes of a stored object
    Update {
        /// Object id (p12 or 12)
        id: ObjectId,
        /// Attribute assignment, key=value (repeatable)
        #[arg(long = "set", value_parser = parse_assignment, required = true)]
        values: Vec<(String, AttributeValue)>,
    },
    /// Delete a stored object
    Delete {
        /// Object id (p12 or 12)
        id: ObjectId,
    },
    /// Print a stored object
    Show {
        /// Object id (p12 or 12)
        id: ObjectId,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// Parse `key=value`; the value goes through [`AttributeValue::parse_literal`].
pub fn parse_assignment(raw: &str) -> Result<(String, AttributeValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty attribute name in {:?}", raw));
    }
    Ok((key.to_string(), AttributeValue::parse_literal(value)))
}
