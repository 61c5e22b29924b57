//! Exact linear-scan backend. Serves as a recall reference and as a cheap
//! engine for exercising the harness.

use std::cmp::Ordering;

use annbench_error::BenchError;
use serde::{Deserialize, Serialize};

use crate::backend::{check_dimensionality, AnnBackend, AnnIndex};
use crate::config::{parse_options, to_options, BackendOptions};
use crate::distance::{dot_product_scalar, normalize};
use crate::{EmbeddingSet, EmbeddingSource, Neighbors};

pub const BRUTE_FORCE_BACKEND: &str = "brute_force";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BruteForceParams {}

#[derive(Debug, Default, Clone, Copy)]
pub struct BruteForceBackend;

impl AnnBackend for BruteForceBackend {
    fn name(&self) -> &'static str {
        BRUTE_FORCE_BACKEND
    }

    fn resolve_options(
        &self,
        _neighbor_width: usize,
        options: &BackendOptions,
    ) -> Result<BackendOptions, Box<dyn BenchError>> {
        let params: BruteForceParams =
            parse_options(BRUTE_FORCE_BACKEND, options).map_err(|e| e.boxed())?;
        to_options(BRUTE_FORCE_BACKEND, &params).map_err(|e| e.boxed())
    }

    fn build(
        &self,
        source: &EmbeddingSource,
        _neighbor_width: usize,
        _options: &BackendOptions,
    ) -> Result<Box<dyn AnnIndex>, Box<dyn BenchError>> {
        let corpus = source.load().map_err(|e| e.boxed())?;
        Ok(Box::new(BruteForceIndex::new(&corpus)))
    }
}

/// Normalized copy of the corpus; similarity is a plain dot product.
pub struct BruteForceIndex {
    normalized: Vec<f32>,
    dimensionality: usize,
}

impl BruteForceIndex {
    pub fn new(corpus: &EmbeddingSet) -> Self {
        let mut normalized = Vec::with_capacity(corpus.as_slice().len());
        for embedding in corpus.iter() {
            normalized.extend(normalize(embedding));
        }
        BruteForceIndex {
            normalized,
            dimensionality: corpus.dimensionality(),
        }
    }
}

fn by_similarity_desc(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

impl AnnIndex for BruteForceIndex {
    fn len(&self) -> usize {
        self.normalized.len() / self.dimensionality
    }

    fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Neighbors, Box<dyn BenchError>> {
        check_dimensionality(self.dimensionality, vector).map_err(|e| e.boxed())?;
        if k == 0 || self.is_empty() {
            return Ok(Neighbors::default());
        }
        let query = normalize(vector);
        let mut scored: Vec<(usize, f32)> = self
            .normalized
            .chunks_exact(self.dimensionality)
            .map(|embedding| dot_product_scalar(&query, embedding))
            .enumerate()
            .collect();
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_similarity_desc);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_similarity_desc);
        Ok(scored.into_iter().collect())
    }
}
