//! Shared helpers for CLI commands

use anchor_core::AnchorConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Load the configuration file if given, then apply `ANCHOR_*` overrides
pub fn load_config(path: Option<&Path>) -> Result<AnchorConfig> {
    let mut config = match path {
        Some(path) => AnchorConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AnchorConfig::default(),
    };
    config.merge_with_env()?;
    config.validate()?;
    tracing::debug!(?path, "configuration loaded");
    Ok(config)
}
