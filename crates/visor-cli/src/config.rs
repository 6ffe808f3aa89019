use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use visor_types::ChainEpoch;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisorConfig {
    pub instrumentation: InstrumentationConfig,
    pub replay: ReplayConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Wrap extraction stores and report once per tipset.
    pub enabled: bool,
    /// Hot keys listed per store summary.
    pub hot_keys: usize,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hot_keys: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub start_height: ChainEpoch,
    pub tipsets: usize,
    pub miners: usize,
    /// Sector reads each miner extraction performs on top of its info reads.
    pub reads_per_miner: usize,
    pub seed: u64,
    /// Deadline for each extraction call.
    pub get_timeout_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            start_height: 0,
            tipsets: 5,
            miners: 4,
            reads_per_miner: 8,
            seed: 42,
            get_timeout_ms: 5_000,
        }
    }
}

impl ReplayConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }
}

impl VisorConfig {
    /// Load from a TOML file. No path, or a path that does not exist, gives
    /// the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("rendering config")
    }
}
