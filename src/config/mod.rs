//! Configuration module
//!
//! A `RunConfig` is threaded explicitly through every run. It is layered
//! from a config file, then `TREE_RUNNER_*` environment variables, then
//! command-line flags; the engine itself never reads ambient state.

mod env;

pub use env::EnvConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::{Strategy, WorkerCommand};
use crate::scheduler::CaseFilter;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./tree-runner.yaml",
    "./tree-runner.yml",
    "./.tree-runner.yaml",
    "./tree-runner.json",
];

/// Options recognised by a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Execution strategy
    pub strategy: Strategy,

    /// Permutation seed for the shuffled strategy
    pub seed: Option<u64>,

    /// Threads (parallel) or processes (distributed); defaults to the
    /// available hardware parallelism
    pub worker_count: Option<usize>,

    /// Path prefix or glob selecting the cases to run
    pub filter: Option<String>,

    /// Stop dispatching new cases after this many seconds
    pub timeout_secs: Option<u64>,

    /// Write a JUnit XML report here when set
    pub xml_output_path: Option<PathBuf>,

    /// Console output format (table, json, json-pretty, summary)
    pub format: String,

    /// Command that starts one worker process (distributed strategy)
    pub worker_command: Option<WorkerCommand>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Sequential,
            seed: None,
            worker_count: None,
            filter: None,
            timeout_secs: None,
            xml_output_path: None,
            format: "table".to_string(),
            worker_command: None,
        }
    }
}

impl RunConfig {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = Some(workers);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_xml_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.xml_output_path = Some(path.into());
        self
    }

    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }

    /// Effective worker count
    pub fn workers(&self) -> usize {
        self.worker_count
            .unwrap_or_else(crate::executor::default_workers)
            .max(1)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn case_filter(&self) -> crate::error::Result<Option<CaseFilter>> {
        self.filter.as_deref().map(CaseFilter::parse).transpose()
    }

    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Load from the first standard location, or defaults when none exists
    pub fn load_default() -> Result<Self> {
        match Self::find() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Reject values that can never produce a valid run
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == Some(0) {
            anyhow::bail!("worker_count must be at least 1");
        }
        if self.timeout_secs == Some(0) {
            anyhow::bail!("timeout_secs must be at least 1");
        }
        self.case_filter().context("Invalid filter")?;
        Ok(())
    }

    /// Apply environment overrides
    pub fn apply_env(mut self, env: &EnvConfig) -> Result<Self> {
        if let Some(strategy) = &env.strategy {
            self.strategy = strategy
                .parse::<Strategy>()
                .with_context(|| format!("Invalid {}", env::var_name("STRATEGY")))?;
        }
        if env.seed.is_some() {
            self.seed = env.seed;
        }
        if env.workers.is_some() {
            self.worker_count = env.workers;
        }
        if env.filter.is_some() {
            self.filter = env.filter.clone();
        }
        if env.timeout.is_some() {
            self.timeout_secs = env.timeout;
        }
        if env.xml_output.is_some() {
            self.xml_output_path = env.xml_output.clone();
        }
        if let Some(format) = &env.format {
            self.format = format.clone();
        }
        Ok(self)
    }
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.strategy, Strategy::Sequential);
        assert_eq!(config.format, "table");
        assert!(config.workers() >= 1);
        assert!(config.timeout().is_none());
    }

    #[test]
    fn test_builder() {
        let config = RunConfig::new(Strategy::Parallel)
            .with_workers(4)
            .with_seed(9)
            .with_timeout(30)
            .with_filter("root.math");
        assert_eq!(config.workers(), 4);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert!(config.case_filter().unwrap().is_some());
    }

    #[test]
    fn test_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("tree-runner.yaml");
        std::fs::write(
            &yaml,
            "strategy: shuffled\nseed: 7\nworker_count: 3\nxml_output_path: out.xml\n",
        )
        .unwrap();
        let config = RunConfig::load(&yaml).unwrap();
        assert_eq!(config.strategy, Strategy::Shuffled);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.worker_count, Some(3));
        assert_eq!(config.xml_output_path, Some(PathBuf::from("out.xml")));
        assert_eq!(config.format, "table");

        let json = dir.path().join("tree-runner.json");
        RunConfig::new(Strategy::Parallel)
            .with_workers(2)
            .save(&json)
            .unwrap();
        let config = RunConfig::load(&json).unwrap();
        assert_eq!(config.strategy, Strategy::Parallel);
        assert_eq!(config.worker_count, Some(2));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "worker_count: 0\n").unwrap();
        assert!(RunConfig::load(&path).is_err());

        std::fs::write(&path, "strategy: round-robin\n").unwrap();
        assert!(RunConfig::load(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env = EnvConfig {
            strategy: Some("parallel".to_string()),
            workers: Some(6),
            filter: Some("bulk".to_string()),
            ..EnvConfig::default()
        };
        let config = RunConfig::default().apply_env(&env).unwrap();
        assert_eq!(config.strategy, Strategy::Parallel);
        assert_eq!(config.worker_count, Some(6));
        assert_eq!(config.filter.as_deref(), Some("bulk"));

        let env = EnvConfig {
            strategy: Some("bogus".to_string()),
            ..EnvConfig::default()
        };
        assert!(RunConfig::default().apply_env(&env).is_err());
    }
}
