use std::collections::BTreeMap;
use std::sync::Arc;

use annbench_error::{BenchError, ErrorCodes};
use thiserror::Error;

use crate::brute_force::BruteForceBackend;
use crate::config::BackendOptions;
use crate::hnsw::HnswBackend;
use crate::{EmbeddingSource, Neighbors};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Unsupported ANN backend `{name}` (available: {available})")]
    Unsupported { name: String, available: String },
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Backend `{backend}` failed: {message}")]
    Internal {
        backend: &'static str,
        message: String,
    },
}

impl BenchError for BackendError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::Engine
    }
}

/// A named index construction algorithm.
pub trait AnnBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validate raw options and return them with every default filled in.
    /// The neighbor-list width is passed separately and is not part of the
    /// returned map.
    fn resolve_options(
        &self,
        neighbor_width: usize,
        options: &BackendOptions,
    ) -> Result<BackendOptions, Box<dyn BenchError>>;

    /// Load the corpus from `source` and build an index over it. `options`
    /// is the output of [`AnnBackend::resolve_options`].
    fn build(
        &self,
        source: &EmbeddingSource,
        neighbor_width: usize,
        options: &BackendOptions,
    ) -> Result<Box<dyn AnnIndex>, Box<dyn BenchError>>;
}

/// A built index. Positions returned by [`AnnIndex::query`] are corpus
/// positions.
pub trait AnnIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimensionality(&self) -> usize;

    /// Return up to `k` neighbors of `vector`, most similar first.
    fn query(&self, vector: &[f32], k: usize) -> Result<Neighbors, Box<dyn BenchError>>;
}

pub(crate) fn check_dimensionality(expected: usize, vector: &[f32]) -> Result<(), BackendError> {
    if vector.len() != expected {
        return Err(BackendError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

#[derive(Clone)]
pub struct BackendRegistry {
    backends: BTreeMap<&'static str, Arc<dyn AnnBackend>>,
}

impl BackendRegistry {
    pub fn empty() -> Self {
        BackendRegistry {
            backends: BTreeMap::new(),
        }
    }

    /// Every backend compiled into this build.
    pub fn with_default_backends() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(HnswBackend));
        registry.register(Arc::new(BruteForceBackend));
        #[cfg(feature = "usearch")]
        registry.register(Arc::new(crate::usearch_index::USearchBackend));
        registry
    }

    pub fn register(&mut self, backend: Arc<dyn AnnBackend>) {
        self.backends.insert(backend.name(), backend);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AnnBackend>, BackendError> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::Unsupported {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.keys().copied().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_default_backends()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_contents() {
        let registry = BackendRegistry::default();
        assert!(registry.get("hnsw").is_ok());
        assert!(registry.get("brute_force").is_ok());
    }

    #[test]
    fn test_unsupported_backend() {
        let registry = BackendRegistry::default();
        let err = registry.get("pynndescent").err().unwrap();
        assert_eq!(err.code(), ErrorCodes::Engine);
        let message = err.to_string();
        assert!(message.contains("pynndescent"));
        assert!(message.contains("brute_force"));
    }
}
