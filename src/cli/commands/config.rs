//! Config Command
//!
//! Inspect codexplain configuration.
//!
//! Usage:
//!   codexplain config show [-f json]
//!   codexplain config path

use crate::config::ConfigLoader;
use crate::types::Result;

/// Show the merged effective configuration
pub fn show(format: &str) -> Result<()> {
    ConfigLoader::show_config(format == "json")
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}
