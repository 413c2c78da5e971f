use serde::Deserialize;
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::split::SplitOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Ring member the planner asks for topology. Planning refuses to run
    /// without one.
    #[serde(default)]
    pub local_node: Option<String>,
    #[serde(default = "default_topology_timeout_ms")]
    pub topology_timeout_ms: u64,
    #[serde(default)]
    pub max_partitions_per_split: Option<usize>,
    /// Fixed seed for the split shuffle; entropy when unset.
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_topology_timeout_ms() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    64
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            local_node: None,
            topology_timeout_ms: default_topology_timeout_ms(),
            max_partitions_per_split: None,
            shuffle_seed: None,
            batch_size: default_batch_size(),
        }
    }
}

impl Settings {
    /// Loads `RINGSCAN_CONFIG_PATH` (if present) overlaid with `RINGSCAN__*`
    /// environment variables.
    pub fn new() -> Result<Self, config::ConfigError> {
        let config_file_path = std::env::var("RINGSCAN_CONFIG_PATH")
            .unwrap_or_else(|_| "crates/coordinator/config/default.toml".to_string());
        Self::load(&config_file_path, false)
    }

    /// Loads a specific file, which must exist.
    pub fn from_path(path: &str) -> Result<Self, config::ConfigError> {
        Self::load(path, true)
    }

    fn load(path: &str, required: bool) -> Result<Self, config::ConfigError> {
        let s = config::Config::builder()
            .add_source(config::File::with_name(path).required(required))
            .add_source(config::Environment::with_prefix("RINGSCAN").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    pub fn topology_timeout(&self) -> Duration {
        Duration::from_millis(self.topology_timeout_ms)
    }

    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            max_partitions_per_split: self.max_partitions_per_split.and_then(NonZeroUsize::new),
        }
    }
}
