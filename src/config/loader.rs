//! Layered configuration
//!
//! Later layers win, key by key:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/codexplain/config.toml)
//! 3. Project config (.codexplain/config.toml)
//! 4. Environment variables (CODEXPLAIN_* prefix, `__` between sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::types::Config;
use crate::types::{ExplainError, Result};

const ENV_PREFIX: &str = "CODEXPLAIN_";

/// Resolves a [`Config`] from defaults, files and the environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolve from the standard locations
    pub fn load() -> Result<Config> {
        Self::load_with_paths(
            Self::global_config_path().as_deref(),
            &Self::project_config_path(),
        )
    }

    /// Resolve with explicit global and project files; missing files are skipped
    pub fn load_with_paths(global: Option<&Path>, project: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(project));
        }

        // e.g. CODEXPLAIN_CACHE__TTL_SECS -> cache.ttl_secs
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| ExplainError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Defaults plus one file, ignoring the environment
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| ExplainError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // ---- locations ----

    /// `$XDG_CONFIG_HOME/codexplain`, else `$HOME/.config/codexplain`
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("codexplain"))
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Relative to the working directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".codexplain/config.toml")
    }

    /// Print each config source, marking files that exist
    pub fn show_path() {
        println!("Config files (later overrides earlier):");
        let mark = |p: &Path| if p.exists() { "found  " } else { "missing" };

        match Self::global_config_path() {
            Some(global) => println!("  global   {}  {}", mark(&global), global.display()),
            None => println!("  global   (no HOME or XDG_CONFIG_HOME)"),
        }
        let project = Self::project_config_path();
        println!("  project  {}  {}", mark(&project), project.display());
        println!("  env      {}<SECTION>__<KEY>", ENV_PREFIX);
    }

    /// Print the merged configuration; API keys are skipped by serde
    pub fn show_config(as_json: bool) -> Result<()> {
        let config = Self::load()?;

        if as_json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| ExplainError::Config(e.to_string()))?
            );
        }

        Ok(())
    }
}
