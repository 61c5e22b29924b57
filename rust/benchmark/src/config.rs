use std::path::{Path, PathBuf};
use std::time::Duration;

use annbench_error::{BenchError, ErrorCodes};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::datasets::DEFAULT_QUERY_DATASET;
use crate::evaluator::DEFAULT_RECALL_CUTOFFS;
use crate::sampler::DEFAULT_SAMPLING_INTERVAL;

pub const DEFAULT_CONFIG_PATH: &str = "./annbench.yaml";
const ENV_PREFIX: &str = "ANNBENCH_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file {0} does not exist")]
    MissingFile(PathBuf),
    #[error("Error loading configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl BenchError for ConfigError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}

/// Harness settings. Index options are not part of this; they come from the
/// command line as JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    pub query_dataset: String,
    pub recall_cutoffs: Vec<usize>,
    pub sampling_interval_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_timeout_secs: Option<u64>,
    pub progress: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            data_dir: PathBuf::from("data"),
            results_dir: PathBuf::from("results"),
            query_dataset: DEFAULT_QUERY_DATASET.to_string(),
            recall_cutoffs: DEFAULT_RECALL_CUTOFFS.to_vec(),
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL.as_millis() as u64,
            build_timeout_secs: None,
            progress: true,
        }
    }
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_dataset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall_cutoffs: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<bool>,
}

impl BenchmarkConfig {
    /// Layers, lowest first: built-in defaults, the YAML file, `ANNBENCH_*`
    /// environment variables, then `overrides`.
    ///
    /// With `path` unset the default file is read only if it exists; an
    /// explicit path must exist.
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let mut f = Figment::from(Serialized::defaults(BenchmarkConfig::default()));
        match path {
            Some(path) if !path.exists() => return Err(ConfigError::MissingFile(path.into())),
            Some(path) => f = f.merge(Yaml::file(path)),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                f = f.merge(Yaml::file(DEFAULT_CONFIG_PATH))
            }
            None => {}
        }
        // Nested keys use `__` since figment would otherwise split on `_`.
        f = f
            .merge(Env::prefixed(ENV_PREFIX).map(|k| k.as_str().replace("__", ".").into()))
            .merge(Serialized::defaults(overrides));

        let config: BenchmarkConfig = f.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "sampling_interval_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.recall_cutoffs.is_empty() {
            return Err(ConfigError::Invalid {
                field: "recall_cutoffs",
                reason: "at least one cutoff is required".to_string(),
            });
        }
        if self.recall_cutoffs.contains(&0) {
            return Err(ConfigError::Invalid {
                field: "recall_cutoffs",
                reason: "cutoffs must be positive".to_string(),
            });
        }
        if self.build_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "build_timeout_secs",
                reason: "must be positive when set".to_string(),
            });
        }
        if self.query_dataset.is_empty() {
            return Err(ConfigError::Invalid {
                field: "query_dataset",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_secs.map(Duration::from_secs)
    }
}
