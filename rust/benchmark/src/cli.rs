use std::path::PathBuf;

use annbench_error::{BenchError, ErrorCodes};
use annbench_index::config::BackendOptions;
use annbench_index::hnsw::HNSW_BACKEND;
use clap::Parser;
use thiserror::Error;

use crate::config::ConfigOverrides;
use crate::datasets::DEFAULT_DATASET;
use crate::run::BenchmarkRequest;

#[derive(Error, Debug)]
pub enum IndexKwargsError {
    #[error("Index kwargs are not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("Index kwargs must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

impl BenchError for IndexKwargsError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}

pub fn parse_index_kwargs(raw: &str) -> Result<BackendOptions, IndexKwargsError> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(IndexKwargsError::Malformed)?;
    match value {
        serde_json::Value::Object(options) => Ok(options),
        serde_json::Value::Null => Err(IndexKwargsError::NotAnObject("null")),
        serde_json::Value::Bool(_) => Err(IndexKwargsError::NotAnObject("a boolean")),
        serde_json::Value::Number(_) => Err(IndexKwargsError::NotAnObject("a number")),
        serde_json::Value::String(_) => Err(IndexKwargsError::NotAnObject("a string")),
        serde_json::Value::Array(_) => Err(IndexKwargsError::NotAnObject("an array")),
    }
}

/// Benchmark an approximate nearest-neighbor index: build time and memory,
/// recall and query latency.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Index backend to benchmark.
    #[arg(long, default_value = HNSW_BACKEND)]
    pub ann_backend: String,

    /// Corpus dataset; `{name}.npy` and `{name}.benchmark.npy` are read from the data directory.
    #[arg(long, default_value = DEFAULT_DATASET)]
    pub dataset_name: String,

    /// Index options as a JSON object. `k` sets the neighbor-list width.
    #[arg(long, default_value = "{}")]
    pub index_kwargs: String,

    /// YAML configuration file. Defaults to ./annbench.yaml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Query embeddings, read as `{name}.npy` from the data directory.
    #[arg(long)]
    pub query_dataset: Option<String>,

    /// Comma-separated recall cutoffs, e.g. `1,10`.
    #[arg(long, value_delimiter = ',')]
    pub recall_cutoffs: Option<Vec<usize>>,

    #[arg(long)]
    pub sampling_interval_ms: Option<u64>,

    /// Abort if building the index takes longer than this.
    #[arg(long)]
    pub build_timeout_secs: Option<u64>,

    /// Hide the query progress bar.
    #[arg(long)]
    pub no_progress: bool,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            data_dir: self.data_dir.clone(),
            results_dir: self.results_dir.clone(),
            query_dataset: self.query_dataset.clone(),
            recall_cutoffs: self.recall_cutoffs.clone(),
            sampling_interval_ms: self.sampling_interval_ms,
            build_timeout_secs: self.build_timeout_secs,
            progress: self.no_progress.then_some(false),
        }
    }

    pub fn request(&self) -> Result<BenchmarkRequest, IndexKwargsError> {
        Ok(BenchmarkRequest {
            backend: self.ann_backend.clone(),
            dataset: self.dataset_name.clone(),
            options: parse_index_kwargs(&self.index_kwargs)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["annbench"]).unwrap();
        assert_eq!(args.ann_backend, "hnsw");
        assert_eq!(args.dataset_name, "GeMS_A1_DreaMS_rand50k");
        let request = args.request().unwrap();
        assert!(request.options.is_empty());
        let overrides = args.overrides();
        assert!(overrides.progress.is_none());
        assert!(overrides.recall_cutoffs.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "annbench",
            "--ann-backend",
            "brute_force",
            "--index-kwargs",
            r#"{"k": 5}"#,
            "--recall-cutoffs",
            "1,5,10",
            "--no-progress",
            "--data-dir",
            "/datasets",
        ])
        .unwrap();
        let request = args.request().unwrap();
        assert_eq!(request.backend, "brute_force");
        assert_eq!(request.options["k"], serde_json::json!(5));
        let overrides = args.overrides();
        assert_eq!(overrides.recall_cutoffs, Some(vec![1, 5, 10]));
        assert_eq!(overrides.progress, Some(false));
        assert_eq!(overrides.data_dir, Some(PathBuf::from("/datasets")));
    }

    #[test]
    fn test_index_kwargs_must_be_object() {
        assert!(parse_index_kwargs(r#"{"ef_search": 32}"#).is_ok());
        for raw in ["[1, 2]", "10", "\"hnsw\"", "null"] {
            let err = parse_index_kwargs(raw).unwrap_err();
            assert!(matches!(err, IndexKwargsError::NotAnObject(_)), "{raw}");
            assert_eq!(err.code(), ErrorCodes::InvalidArgument);
        }
        let err = parse_index_kwargs("{k: 10").unwrap_err();
        assert!(matches!(err, IndexKwargsError::Malformed(_)));
        assert_eq!(err.code(), ErrorCodes::InvalidArgument);
    }
}
