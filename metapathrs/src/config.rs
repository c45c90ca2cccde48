//! Configuration for metapath sessions.
//!
//! TOML-based, with every field defaulted so a partial file works.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::search::SearchOptions;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MetapathConfig {
    /// Defaults for the search driver.
    pub search: SearchConfig,

    /// Where variable definitions (YAML, one file per variable) live.
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Iteration budget of the driver (default: 100).
    pub max_iterations: usize,

    #[serde(flatten)]
    pub options: SearchOptions,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            options: SearchOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub definitions_dir: Option<PathBuf>,
}

impl MetapathConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}
