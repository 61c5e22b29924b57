//! On-disk layout of benchmark datasets.
//!
//! A dataset `name` under `data_dir` consists of the corpus `name.npy` and
//! its ground truth `name.benchmark.npy`. The query set is a separate
//! dataset shared by all corpora.

pub mod ground_truth;

use std::path::{Path, PathBuf};

pub use ground_truth::{GroundTruth, GroundTruthError};

pub const DEFAULT_DATASET: &str = "GeMS_A1_DreaMS_rand50k";
pub const DEFAULT_QUERY_DATASET: &str = "MassSpecGym_DreaMS_rand1k";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetPaths {
    pub corpus: PathBuf,
    pub ground_truth: PathBuf,
    pub queries: PathBuf,
}

impl DatasetPaths {
    pub fn resolve(data_dir: &Path, dataset_name: &str, query_dataset: &str) -> Self {
        DatasetPaths {
            corpus: data_dir.join(format!("{dataset_name}.npy")),
            ground_truth: data_dir.join(format!("{dataset_name}.benchmark.npy")),
            queries: data_dir.join(format!("{query_dataset}.npy")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_paths() {
        let paths = DatasetPaths::resolve(Path::new("data"), "corpus_a", "queries_b");
        assert_eq!(paths.corpus, PathBuf::from("data/corpus_a.npy"));
        assert_eq!(
            paths.ground_truth,
            PathBuf::from("data/corpus_a.benchmark.npy")
        );
        assert_eq!(paths.queries, PathBuf::from("data/queries_b.npy"));
    }
}
