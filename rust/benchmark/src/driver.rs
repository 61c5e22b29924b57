//! Index construction under measurement.

use std::sync::Arc;
use std::time::Duration;

use annbench_error::{BenchError, ErrorCodes};
use annbench_index::config::BackendOptions;
use annbench_index::{
    AnnBackend, AnnIndex, BackendError, BackendRegistry, EmbeddingSource, DEFAULT_NEIGHBOR_WIDTH,
};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::sampler::{MemoryProbe, ResourceSampler, SamplerError};

/// Key of the neighbor-list width inside the user-supplied options.
pub const NEIGHBOR_WIDTH_OPTION: &str = "k";

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Option `k` must be a positive integer, got {0}")]
    InvalidNeighborWidth(serde_json::Value),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Options(Box<dyn BenchError>),
    #[error("Failed to build `{backend}` index from {source_description} (peak memory {peak_memory_mb:.1} MB after {seconds:.3}s): {source}")]
    Build {
        backend: String,
        source_description: String,
        peak_memory_mb: f64,
        seconds: f64,
        #[source]
        source: Box<dyn BenchError>,
    },
    #[error("Building `{backend}` index did not finish within {timeout:?}")]
    Timeout { backend: String, timeout: Duration },
    #[error(transparent)]
    Sampler(#[from] SamplerError),
}

impl BenchError for DriverError {
    fn code(&self) -> ErrorCodes {
        match self {
            DriverError::InvalidNeighborWidth(_) => ErrorCodes::InvalidArgument,
            DriverError::Backend(err) => err.code(),
            DriverError::Options(err) => err.code(),
            DriverError::Build { source, .. } => source.code(),
            DriverError::Timeout { .. } => ErrorCodes::DeadlineExceeded,
            DriverError::Sampler(err) => err.code(),
        }
    }
}

/// The configuration an index was actually built with, defaults included.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EffectiveIndexConfig {
    pub backend: String,
    pub neighbor_width: usize,
    pub backend_options: BackendOptions,
}

impl EffectiveIndexConfig {
    /// The options in the same shape the user passes them, `k` included.
    pub fn to_json(&self) -> serde_json::Value {
        let mut options = self.backend_options.clone();
        options.insert(
            NEIGHBOR_WIDTH_OPTION.to_string(),
            serde_json::Value::from(self.neighbor_width),
        );
        serde_json::Value::Object(options)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstructionStats {
    pub peak_memory_mb: f64,
    pub seconds: f64,
}

pub struct BuiltIndex {
    pub index: Box<dyn AnnIndex>,
    pub construction: ConstructionStats,
    pub effective_config: EffectiveIndexConfig,
}

impl std::fmt::Debug for BuiltIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltIndex")
            .field("len", &self.index.len())
            .field("construction", &self.construction)
            .field("effective_config", &self.effective_config)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct IndexBuildRequest {
    pub backend: String,
    pub source: EmbeddingSource,
    /// Raw user options; never modified.
    pub options: BackendOptions,
}

/// Split the neighbor-list width out of `options`, defaulting it.
pub fn neighbor_width(options: &BackendOptions) -> Result<usize, DriverError> {
    match options.get(NEIGHBOR_WIDTH_OPTION) {
        None => Ok(DEFAULT_NEIGHBOR_WIDTH),
        Some(value) => value
            .as_u64()
            .filter(|&width| width > 0)
            .and_then(|width| usize::try_from(width).ok())
            .ok_or_else(|| DriverError::InvalidNeighborWidth(value.clone())),
    }
}

/// Look up the backend and compute the effective configuration without
/// building anything.
pub fn resolve(
    registry: &BackendRegistry,
    backend: &str,
    options: &BackendOptions,
) -> Result<(Arc<dyn AnnBackend>, EffectiveIndexConfig), DriverError> {
    let ann_backend = registry.get(backend)?;
    let width = neighbor_width(options)?;
    let mut backend_options = options.clone();
    backend_options.remove(NEIGHBOR_WIDTH_OPTION);
    let backend_options = ann_backend
        .resolve_options(width, &backend_options)
        .map_err(DriverError::Options)?;
    tracing::debug!("Resolved options for `{}`: {:?}", backend, backend_options);
    Ok((
        ann_backend,
        EffectiveIndexConfig {
            backend: backend.to_string(),
            neighbor_width: width,
            backend_options,
        },
    ))
}

/// Build an index for `request`, measuring peak memory and wall-clock time of
/// the build (corpus loading included). Backend and option errors surface
/// before any measurement starts.
#[instrument(skip(registry, sampler, request), fields(backend = %request.backend, source = %request.source))]
pub async fn build_index<P: MemoryProbe>(
    registry: &BackendRegistry,
    sampler: &ResourceSampler<P>,
    request: IndexBuildRequest,
    timeout: Option<Duration>,
) -> Result<BuiltIndex, DriverError> {
    let (ann_backend, effective_config) = resolve(registry, &request.backend, &request.options)?;

    tracing::info!("Building index...");
    let source = request.source.clone();
    let width = effective_config.neighbor_width;
    let options = effective_config.backend_options.clone();
    let measurement = sampler.measure(move || ann_backend.build(&source, width, &options));
    let measurement = match timeout {
        Some(limit) => tokio::time::timeout(limit, measurement)
            .await
            .map_err(|_| DriverError::Timeout {
                backend: request.backend.clone(),
                timeout: limit,
            })??,
        None => measurement.await?,
    };

    let construction = ConstructionStats {
        peak_memory_mb: measurement.peak_memory_mb(),
        seconds: measurement.elapsed_secs(),
    };
    match measurement.output {
        Ok(index) => {
            tracing::info!(
                "Index built: {} embeddings in {:.3}s, peak memory {:.1} MB ({} samples)",
                index.len(),
                construction.seconds,
                construction.peak_memory_mb,
                measurement.samples
            );
            Ok(BuiltIndex {
                index,
                construction,
                effective_config,
            })
        }
        Err(source) => {
            tracing::error!(
                "Index build failed after {:.3}s at peak memory {:.1} MB",
                construction.seconds,
                construction.peak_memory_mb
            );
            Err(DriverError::Build {
                backend: request.backend,
                source_description: request.source.to_string(),
                peak_memory_mb: construction.peak_memory_mb,
                seconds: construction.seconds,
                source,
            })
        }
    }
}
