//! HNSW backend delegating to USearch. Enabled with the `usearch` feature.

use annbench_error::{BenchError, ErrorCodes};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use usearch::{new_index, Index as USearchIndexInner, IndexOptions, MetricKind, ScalarKind};

use crate::backend::{check_dimensionality, AnnBackend, AnnIndex};
use crate::config::{parse_options, to_options, BackendConfigError, BackendOptions};
use crate::{EmbeddingSource, Neighbors};

pub const USEARCH_BACKEND: &str = "usearch";

const DEFAULT_USEARCH_EXPANSION_ADD: usize = 128;
const DEFAULT_USEARCH_EXPANSION_SEARCH: usize = 64;

#[derive(Error, Debug)]
pub enum USearchError {
    #[error("USearch error: {0}")]
    Internal(String),
}

impl BenchError for USearchError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::Engine
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum USearchQuantization {
    #[default]
    F32,
    F16,
    I8,
}

impl From<USearchQuantization> for ScalarKind {
    fn from(value: USearchQuantization) -> Self {
        match value {
            USearchQuantization::F32 => ScalarKind::F32,
            USearchQuantization::F16 => ScalarKind::F16,
            USearchQuantization::I8 => ScalarKind::I8,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUSearchOptions {
    connectivity: Option<usize>,
    expansion_add: Option<usize>,
    expansion_search: Option<usize>,
    quantization: Option<USearchQuantization>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct USearchParams {
    /// Number of connections per element (M). Defaults to the neighbor-list width.
    pub connectivity: usize,
    /// Size of the dynamic candidate list during construction (ef_construction)
    pub expansion_add: usize,
    /// Size of the dynamic candidate list during search (ef_search)
    pub expansion_search: usize,
    pub quantization: USearchQuantization,
}

impl USearchParams {
    pub fn resolve(
        neighbor_width: usize,
        options: &BackendOptions,
    ) -> Result<Self, BackendConfigError> {
        let raw: RawUSearchOptions = parse_options(USEARCH_BACKEND, options)?;
        let params = USearchParams {
            connectivity: raw.connectivity.unwrap_or(neighbor_width),
            expansion_add: raw.expansion_add.unwrap_or(DEFAULT_USEARCH_EXPANSION_ADD),
            expansion_search: raw
                .expansion_search
                .unwrap_or(DEFAULT_USEARCH_EXPANSION_SEARCH),
            quantization: raw.quantization.unwrap_or_default(),
        };
        for (option, value) in [
            ("connectivity", params.connectivity),
            ("expansion_add", params.expansion_add),
            ("expansion_search", params.expansion_search),
        ] {
            if value == 0 {
                return Err(BackendConfigError::OutOfRange {
                    backend: USEARCH_BACKEND.to_string(),
                    option,
                    reason: "must be positive".to_string(),
                });
            }
        }
        Ok(params)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct USearchBackend;

impl AnnBackend for USearchBackend {
    fn name(&self) -> &'static str {
        USEARCH_BACKEND
    }

    fn resolve_options(
        &self,
        neighbor_width: usize,
        options: &BackendOptions,
    ) -> Result<BackendOptions, Box<dyn BenchError>> {
        let params = USearchParams::resolve(neighbor_width, options).map_err(|e| e.boxed())?;
        to_options(USEARCH_BACKEND, &params).map_err(|e| e.boxed())
    }

    fn build(
        &self,
        source: &EmbeddingSource,
        _neighbor_width: usize,
        options: &BackendOptions,
    ) -> Result<Box<dyn AnnIndex>, Box<dyn BenchError>> {
        let params: USearchParams =
            parse_options(USEARCH_BACKEND, options).map_err(|e| e.boxed())?;
        let corpus = source.load().map_err(|e| e.boxed())?;

        let index_options = IndexOptions {
            dimensions: corpus.dimensionality(),
            metric: MetricKind::Cos,
            quantization: params.quantization.into(),
            connectivity: params.connectivity,
            expansion_add: params.expansion_add,
            expansion_search: params.expansion_search,
            multi: false,
        };
        let index =
            new_index(&index_options).map_err(|e| USearchError::Internal(e.to_string()).boxed())?;
        index
            .reserve(corpus.len())
            .map_err(|e| USearchError::Internal(e.to_string()).boxed())?;
        for (position, embedding) in corpus.iter().enumerate() {
            index
                .add(position as u64, embedding)
                .map_err(|e| USearchError::Internal(e.to_string()).boxed())?;
        }

        Ok(Box::new(USearchIndex {
            index,
            dimensionality: corpus.dimensionality(),
        }))
    }
}

pub struct USearchIndex {
    index: USearchIndexInner,
    dimensionality: usize,
}

impl AnnIndex for USearchIndex {
    fn len(&self) -> usize {
        self.index.size()
    }

    fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Neighbors, Box<dyn BenchError>> {
        check_dimensionality(self.dimensionality, vector).map_err(|e| e.boxed())?;
        if k == 0 || self.is_empty() {
            return Ok(Neighbors::default());
        }
        let matches = self
            .index
            .search(vector, k)
            .map_err(|e| USearchError::Internal(e.to_string()).boxed())?;
        Ok(matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .map(|(&key, &distance)| (key as usize, 1.0 - distance))
            .collect())
    }
}
