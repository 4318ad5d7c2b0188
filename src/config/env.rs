//! Environment variable configuration
//!
//! Provides `TREE_RUNNER_*` overrides for file configuration.

use std::env;
use std::path::PathBuf;

/// Environment variable prefix
const ENV_PREFIX: &str = "TREE_RUNNER";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Strategy name from TREE_RUNNER_STRATEGY
    pub strategy: Option<String>,
    /// Shuffle seed from TREE_RUNNER_SEED
    pub seed: Option<u64>,
    /// Worker count from TREE_RUNNER_WORKERS
    pub workers: Option<usize>,
    /// Case filter from TREE_RUNNER_FILTER
    pub filter: Option<String>,
    /// Run timeout in seconds from TREE_RUNNER_TIMEOUT
    pub timeout: Option<u64>,
    /// JUnit XML path from TREE_RUNNER_XML
    pub xml_output: Option<PathBuf>,
    /// Output format from TREE_RUNNER_FORMAT
    pub format: Option<String>,
    /// Config file from TREE_RUNNER_CONFIG
    pub config_file: Option<PathBuf>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            strategy: get_env("STRATEGY"),
            seed: get_env_parse("SEED"),
            workers: get_env_parse("WORKERS"),
            filter: get_env("FILTER"),
            timeout: get_env_parse("TIMEOUT"),
            xml_output: get_env("XML").map(PathBuf::from),
            format: get_env("FORMAT"),
            config_file: get_env("CONFIG").map(PathBuf::from),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.strategy.is_some()
            || self.seed.is_some()
            || self.workers.is_some()
            || self.filter.is_some()
            || self.timeout.is_some()
            || self.xml_output.is_some()
            || self.format.is_some()
            || self.config_file.is_some()
    }
}

/// Full variable name for a setting
pub(super) fn var_name(name: &str) -> String {
    format!("{ENV_PREFIX}_{name}")
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(var_name(name)).ok().filter(|v| !v.trim().is_empty())
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}
