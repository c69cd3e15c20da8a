//! Tunables for validation, layout and the plugin runtime, loadable from RON.
//!
//! Every section is optional in the file; omitted sections and fields keep
//! their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::layout::{HierarchicalConfig, RadialConfig};
use crate::core::plugin::{PluginRuntime, RuntimeConfig};
use crate::core::validator::ValidatorConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryloomConfig {
    pub validator: ValidatorConfig,
    pub hierarchical: HierarchicalConfig,
    pub radial: RadialConfig,
    pub plugins: RuntimeConfig,
}

impl StoryloomConfig {
    pub fn load_from_ron(path: &Path) -> Result<StoryloomConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<StoryloomConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }

    /// An empty plugin runtime using this configuration's policy.
    pub fn runtime(&self) -> PluginRuntime {
        PluginRuntime::new(self.plugins.clone())
    }
}
