//! Configuration sources implementing [`ConfigPort`].
//!
//! - Host: [`FileConfigStore`] reads a JSON document from the path in
//!   `DEVBRIDGE_CONFIG`, or uses defaults when the variable is unset.
//! - ESP-IDF: [`EmbeddedConfigStore`] parses the JSON baked in at build
//!   time through `DEVBRIDGE_CONFIG_JSON`.
//!
//! Both validate before returning; a config that fails validation never
//! reaches the supervisor.

use std::path::PathBuf;

use log::info;

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::BridgeConfig;

/// Environment variable naming the host config file.
pub const CONFIG_PATH_ENV: &str = "DEVBRIDGE_CONFIG";

fn parse(bytes: &[u8]) -> Result<BridgeConfig, ConfigError> {
    let cfg: BridgeConfig =
        serde_json::from_slice(bytes).map_err(|e| ConfigError::Corrupted(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

// ───────────────────────────────────────────────────────────────
// File-backed store
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct FileConfigStore {
    path: Option<PathBuf>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Path from `DEVBRIDGE_CONFIG`, if set and non-empty.
    pub fn from_env() -> Self {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        Self { path }
    }
}

impl ConfigPort for FileConfigStore {
    fn load(&self) -> Result<BridgeConfig, ConfigError> {
        let Some(path) = &self.path else {
            info!("Config: {} unset, using defaults", CONFIG_PATH_ENV);
            let cfg = BridgeConfig::default();
            cfg.validate()?;
            return Ok(cfg);
        };
        let bytes = std::fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {e}", path.display())))?;
        let cfg = parse(&bytes)?;
        info!("Config: loaded {}", path.display());
        Ok(cfg)
    }
}

// ───────────────────────────────────────────────────────────────
// Build-time embedded store
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct EmbeddedConfigStore {
    json: Option<&'static str>,
}

impl EmbeddedConfigStore {
    pub const fn new() -> Self {
        Self {
            json: option_env!("DEVBRIDGE_CONFIG_JSON"),
        }
    }

    pub const fn from_json(json: &'static str) -> Self {
        Self { json: Some(json) }
    }
}

impl Default for EmbeddedConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigPort for EmbeddedConfigStore {
    fn load(&self) -> Result<BridgeConfig, ConfigError> {
        match self.json {
            Some(json) => {
                let cfg = parse(json.as_bytes())?;
                info!("Config: embedded document ({} bytes)", json.len());
                Ok(cfg)
            }
            None => {
                info!("Config: nothing embedded, using defaults");
                Ok(BridgeConfig::default())
            }
        }
    }
}
