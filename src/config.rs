//! Configuration read from Connect4.toml

use anyhow::{anyhow, Result};
use log::warn;
use serde::Deserialize;

use std::fs;
use std::path::Path;

use crate::{DEFAULT_HEIGHT, DEFAULT_WIDTH, MIN_DIMENSION};

pub const CONFIG_PATH: &str = "Connect4.toml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub board: BoardConfig,
    pub search: SearchConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BoardConfig {
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SearchConfig {
    /// Plies searched below the CPU's position each turn
    pub target_depth: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClusterConfig {
    /// Number of ranks, the coordinator included
    pub processes: usize,
    /// Fixes the tie-breaking shuffle when set
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Config {
    /// Loads and validates configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow!("Failed to read config file {}: {}", path.as_ref().display(), e)
        })?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| anyhow!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_default() -> Result<Self> {
        Self::from_file(CONFIG_PATH)
    }

    /// Falls back to the built-in values when the file is missing or invalid
    pub fn load_or_default() -> Self {
        Self::load_default().unwrap_or_else(|e| {
            warn!("Could not load {} ({}), using hardcoded defaults", CONFIG_PATH, e);
            Self::default_hardcoded()
        })
    }

    /// Should match Connect4.toml
    pub fn default_hardcoded() -> Self {
        Config {
            board: BoardConfig {
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
            },
            search: SearchConfig { target_depth: 6 },
            cluster: ClusterConfig {
                processes: 4,
                seed: None,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.board.width < MIN_DIMENSION || self.board.height < MIN_DIMENSION {
            return Err(anyhow!(
                "board must be at least {}x{}, got {}x{}",
                MIN_DIMENSION,
                MIN_DIMENSION,
                self.board.width,
                self.board.height
            ));
        }
        if self.board.width > u16::MAX as usize || self.board.height > u16::MAX as usize {
            return Err(anyhow!("board dimensions must fit in 16 bits"));
        }
        if self.search.target_depth < 1 {
            return Err(anyhow!("target_depth must be at least 1"));
        }
        if self.cluster.processes < 1 {
            return Err(anyhow!("processes must be at least 1"));
        }
        Ok(())
    }
}
