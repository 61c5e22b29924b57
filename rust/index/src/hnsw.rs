//! HNSW backend delegating to the `hnsw_rs` crate.

use annbench_error::BenchError;
use hnsw_rs::prelude::{DistCosine, Hnsw};
use serde::{Deserialize, Serialize};

use crate::backend::{check_dimensionality, AnnBackend, AnnIndex};
use crate::config::{parse_options, to_options, BackendConfigError, BackendOptions};
use crate::{EmbeddingSource, Neighbors};

pub const HNSW_BACKEND: &str = "hnsw";

const DEFAULT_HNSW_EF_CONSTRUCTION: usize = 200;
const DEFAULT_HNSW_EF_SEARCH: usize = 64;
// hnsw_rs caps the number of layers at 16.
const MAX_HNSW_LAYERS: usize = 16;
const MAX_HNSW_CONNECTIONS: usize = 256;

/// Options as accepted from the user; anything left out is defaulted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHnswOptions {
    max_nb_connection: Option<usize>,
    ef_construction: Option<usize>,
    ef_search: Option<usize>,
    max_layer: Option<usize>,
    parallel_insert: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HnswParams {
    /// Graph degree (M). Defaults to the neighbor-list width.
    pub max_nb_connection: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_layer: usize,
    pub parallel_insert: bool,
}

impl HnswParams {
    pub fn resolve(
        neighbor_width: usize,
        options: &BackendOptions,
    ) -> Result<Self, BackendConfigError> {
        let raw: RawHnswOptions = parse_options(HNSW_BACKEND, options)?;
        let params = HnswParams {
            max_nb_connection: raw.max_nb_connection.unwrap_or(neighbor_width),
            ef_construction: raw.ef_construction.unwrap_or(DEFAULT_HNSW_EF_CONSTRUCTION),
            ef_search: raw.ef_search.unwrap_or(DEFAULT_HNSW_EF_SEARCH),
            max_layer: raw.max_layer.unwrap_or(MAX_HNSW_LAYERS),
            parallel_insert: raw.parallel_insert.unwrap_or(true),
        };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), BackendConfigError> {
        let out_of_range = |option: &'static str, reason: String| {
            Err(BackendConfigError::OutOfRange {
                backend: HNSW_BACKEND.to_string(),
                option,
                reason,
            })
        };
        if self.max_nb_connection == 0 || self.max_nb_connection > MAX_HNSW_CONNECTIONS {
            return out_of_range(
                "max_nb_connection",
                format!("must be in 1..={MAX_HNSW_CONNECTIONS}"),
            );
        }
        if self.max_layer == 0 || self.max_layer > MAX_HNSW_LAYERS {
            return out_of_range("max_layer", format!("must be in 1..={MAX_HNSW_LAYERS}"));
        }
        if self.ef_construction == 0 {
            return out_of_range("ef_construction", "must be positive".to_string());
        }
        if self.ef_search == 0 {
            return out_of_range("ef_search", "must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HnswBackend;

impl AnnBackend for HnswBackend {
    fn name(&self) -> &'static str {
        HNSW_BACKEND
    }

    fn resolve_options(
        &self,
        neighbor_width: usize,
        options: &BackendOptions,
    ) -> Result<BackendOptions, Box<dyn BenchError>> {
        let params = HnswParams::resolve(neighbor_width, options).map_err(|e| e.boxed())?;
        to_options(HNSW_BACKEND, &params).map_err(|e| e.boxed())
    }

    fn build(
        &self,
        source: &EmbeddingSource,
        _neighbor_width: usize,
        options: &BackendOptions,
    ) -> Result<Box<dyn AnnIndex>, Box<dyn BenchError>> {
        let params: HnswParams = parse_options(HNSW_BACKEND, options).map_err(|e| e.boxed())?;
        let corpus = source.load().map_err(|e| e.boxed())?;

        // hnsw_rs wants owned rows for parallel insertion.
        let rows: Vec<Vec<f32>> = corpus.iter().map(|row| row.to_vec()).collect();
        let mut inner = Hnsw::<f32, DistCosine>::new(
            params.max_nb_connection,
            rows.len().max(1),
            params.max_layer,
            params.ef_construction,
            DistCosine {},
        );
        if params.parallel_insert {
            let refs: Vec<(&Vec<f32>, usize)> = rows.iter().zip(0..).collect();
            inner.parallel_insert(&refs);
        } else {
            for (row, id) in rows.iter().zip(0..) {
                inner.insert_slice((row.as_slice(), id));
            }
        }
        inner.set_searching_mode(true);
        tracing::debug!(
            "Built hnsw index over {} embeddings of dimensionality {}",
            rows.len(),
            corpus.dimensionality()
        );

        Ok(Box::new(HnswIndex {
            inner,
            len: rows.len(),
            dimensionality: corpus.dimensionality(),
            ef_search: params.ef_search,
        }))
    }
}

pub struct HnswIndex {
    inner: Hnsw<'static, f32, DistCosine>,
    len: usize,
    dimensionality: usize,
    ef_search: usize,
}

impl AnnIndex for HnswIndex {
    fn len(&self) -> usize {
        self.len
    }

    fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Neighbors, Box<dyn BenchError>> {
        check_dimensionality(self.dimensionality, vector).map_err(|e| e.boxed())?;
        if k == 0 || self.len == 0 {
            return Ok(Neighbors::default());
        }
        // ef below k would cap the result size.
        let ef = self.ef_search.max(k);
        Ok(self
            .inner
            .search(vector, k, ef)
            .into_iter()
            .map(|neighbour| (neighbour.d_id, 1.0 - neighbour.distance))
            .collect())
    }
}
