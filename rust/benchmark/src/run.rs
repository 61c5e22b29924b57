//! One complete benchmark run: build, evaluate, fold into a [`RunResult`].

use std::future::Future;
use std::time::Duration;

use annbench_error::{BenchError, ErrorCodes};
use annbench_index::config::BackendOptions;
use annbench_index::{BackendRegistry, EmbeddingError, EmbeddingSet, EmbeddingSource};
use thiserror::Error;
use tokio::runtime::Runtime;

use crate::config::BenchmarkConfig;
use crate::datasets::{DatasetPaths, GroundTruth, GroundTruthError};
use crate::driver::{build_index, DriverError, IndexBuildRequest};
use crate::evaluator::{EvaluationError, QueryEvaluator};
use crate::report::RunResult;
use crate::sampler::{ResourceSampler, SamplerError};

/// How long blocking work may keep the runtime alive once the run is over.
/// A build abandoned after a timeout is not waited for beyond this.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(250);

pub fn tokio_multi_thread() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

/// Drive `future` to completion on a fresh runtime, then shut the runtime
/// down without waiting for leftover blocking tasks.
pub fn block_on_then_shutdown<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio_multi_thread()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE_PERIOD);
    Ok(output)
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error(transparent)]
    Queries(#[from] EmbeddingError),
    #[error(transparent)]
    GroundTruth(#[from] GroundTruthError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl BenchError for RunError {
    fn code(&self) -> ErrorCodes {
        match self {
            RunError::Driver(err) => err.code(),
            RunError::Sampler(err) => err.code(),
            RunError::Queries(err) => err.code(),
            RunError::GroundTruth(err) => err.code(),
            RunError::Evaluation(err) => err.code(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BenchmarkRequest {
    pub backend: String,
    pub dataset: String,
    pub options: BackendOptions,
}

pub async fn run_benchmark(
    config: &BenchmarkConfig,
    request: BenchmarkRequest,
    registry: &BackendRegistry,
) -> Result<RunResult, RunError> {
    let evaluator =
        QueryEvaluator::new(config.recall_cutoffs.clone())?.with_progress(config.progress);
    let sampler = ResourceSampler::for_current_process(config.sampling_interval())?;
    let paths = DatasetPaths::resolve(&config.data_dir, &request.dataset, &config.query_dataset);
    tracing::info!(
        "Benchmarking `{}` on dataset `{}` with recall cutoffs {:?}, sampling memory every {:?}",
        request.backend,
        request.dataset,
        evaluator.cutoffs(),
        sampler.interval()
    );

    let built = build_index(
        registry,
        &sampler,
        IndexBuildRequest {
            backend: request.backend.clone(),
            source: EmbeddingSource::Npy(paths.corpus.clone()),
            options: request.options,
        },
        config.build_timeout(),
    )
    .await?;

    let queries = EmbeddingSet::from_npy(&paths.queries)?;
    let ground_truth = GroundTruth::from_npy(&paths.ground_truth)?;
    tracing::info!(
        "Loaded {} queries and ground truth of depth {}",
        queries.len(),
        ground_truth.depth()
    );

    let evaluation = evaluator.evaluate(built.index.as_ref(), &queries, &ground_truth)?;

    Ok(RunResult::new(
        &request.backend,
        &request.dataset,
        &built.construction,
        &evaluation,
        &built.effective_config,
    ))
}
