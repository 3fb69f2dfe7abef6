//! Server configuration.
//!
//! Supports loading the full [`dialog_core::Config`] from a YAML file, with
//! environment variable overrides for the values most often set at deploy
//! time (bind port, upstream API key/model/URL).

use std::path::Path;

use anyhow::{Context, Result};
use dialog_core::Config;

/// Loads configuration from an optional YAML file, then applies environment
/// variable overrides.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut config = if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("DIALOG_BIND_PORT") {
        if let Ok(port) = val.parse() {
            config.preferred_port = port;
        }
    }
    if let Ok(val) = std::env::var("DIALOG_UPSTREAM_API_KEY") {
        config.upstream.api_key = val;
    }
    if let Ok(val) = std::env::var("DIALOG_UPSTREAM_MODEL") {
        config.upstream.model = val;
    }
    if let Ok(val) = std::env::var("DIALOG_UPSTREAM_URL") {
        config.upstream.url = val;
    }
    if let Ok(val) = std::env::var("DIALOG_UPSTREAM_VOICE") {
        config.upstream.voice = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_without_path_returns_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config.preferred_port, 0);
    }
}
