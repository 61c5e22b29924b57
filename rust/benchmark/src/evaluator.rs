//! Recall and latency evaluation of a built index against ground truth.

use std::collections::HashSet;
use std::time::Instant;

use annbench_error::{BenchError, ErrorCodes};
use annbench_index::{AnnIndex, EmbeddingSet};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::datasets::GroundTruth;
use crate::stats::Summary;

pub const DEFAULT_RECALL_CUTOFFS: [usize; 2] = [1, 10];

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("At least one recall cutoff is required")]
    NoCutoffs,
    #[error("Recall cutoffs must be positive")]
    ZeroCutoff,
    #[error("Query set is empty")]
    NoQueries,
    #[error("Query set has {queries} embeddings but ground truth has {ground_truth} entries")]
    QueryCountMismatch { queries: usize, ground_truth: usize },
    #[error("Ground truth holds {depth} neighbors per query, fewer than the largest cutoff {max_cutoff}")]
    GroundTruthTooShallow { depth: usize, max_cutoff: usize },
    #[error("Query embeddings have dimensionality {queries}, index expects {index}")]
    DimensionMismatch { queries: usize, index: usize },
    #[error("All {failed} queries failed; last error: {last}")]
    AllQueriesFailed {
        failed: usize,
        last: Box<dyn BenchError>,
    },
}

impl BenchError for EvaluationError {
    fn code(&self) -> ErrorCodes {
        match self {
            EvaluationError::NoCutoffs | EvaluationError::ZeroCutoff => {
                ErrorCodes::InvalidArgument
            }
            EvaluationError::NoQueries
            | EvaluationError::QueryCountMismatch { .. }
            | EvaluationError::GroundTruthTooShallow { .. }
            | EvaluationError::DimensionMismatch { .. } => ErrorCodes::Data,
            EvaluationError::AllQueriesFailed { .. } => ErrorCodes::Engine,
        }
    }
}

/// recall@k = |top-k returned ∩ top-k truth| / k.
///
/// Membership decides a hit, so order inside the top-k is irrelevant and a
/// repeated id counts once. Returning fewer than `k` neighbors is penalized
/// because the denominator stays `k`.
pub fn recall_at_k(returned: &[usize], truth: &[usize], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let truth: HashSet<usize> = truth.iter().take(k).copied().collect();
    let returned: HashSet<usize> = returned.iter().take(k).copied().collect();
    returned.intersection(&truth).count() as f64 / k as f64
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecallStats {
    pub k: usize,
    pub recall: Summary,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationReport {
    /// One entry per cutoff, ascending by `k`.
    pub recalls: Vec<RecallStats>,
    /// Latency of successful queries, in seconds.
    pub query_time: Summary,
    pub queries_evaluated: usize,
    pub queries_failed: usize,
}

/// Issues queries one at a time, in query order, and times each call on its
/// own. A query that fails is recorded with recall 0 at every cutoff and left
/// out of the latency statistics.
#[derive(Clone, Debug)]
pub struct QueryEvaluator {
    cutoffs: Vec<usize>,
    show_progress: bool,
}

impl QueryEvaluator {
    pub fn new(mut cutoffs: Vec<usize>) -> Result<Self, EvaluationError> {
        if cutoffs.is_empty() {
            return Err(EvaluationError::NoCutoffs);
        }
        if cutoffs.contains(&0) {
            return Err(EvaluationError::ZeroCutoff);
        }
        cutoffs.sort_unstable();
        cutoffs.dedup();
        Ok(QueryEvaluator {
            cutoffs,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn cutoffs(&self) -> &[usize] {
        &self.cutoffs
    }

    pub fn max_cutoff(&self) -> usize {
        self.cutoffs.last().copied().unwrap_or(1)
    }

    fn validate(
        &self,
        index: &dyn AnnIndex,
        queries: &EmbeddingSet,
        ground_truth: &GroundTruth,
    ) -> Result<(), EvaluationError> {
        if queries.len() != ground_truth.len() {
            return Err(EvaluationError::QueryCountMismatch {
                queries: queries.len(),
                ground_truth: ground_truth.len(),
            });
        }
        if queries.is_empty() {
            return Err(EvaluationError::NoQueries);
        }
        if ground_truth.depth() < self.max_cutoff() {
            return Err(EvaluationError::GroundTruthTooShallow {
                depth: ground_truth.depth(),
                max_cutoff: self.max_cutoff(),
            });
        }
        if queries.dimensionality() != index.dimensionality() {
            return Err(EvaluationError::DimensionMismatch {
                queries: queries.dimensionality(),
                index: index.dimensionality(),
            });
        }
        Ok(())
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}<{eta_precise}]")
        {
            bar.set_style(style);
        }
        bar.set_message("Benchmarking index search accuracy");
        bar
    }

    pub fn evaluate(
        &self,
        index: &dyn AnnIndex,
        queries: &EmbeddingSet,
        ground_truth: &GroundTruth,
    ) -> Result<EvaluationReport, EvaluationError> {
        self.validate(index, queries, ground_truth)?;

        let request_k = self.max_cutoff();
        let mut recall_samples: Vec<Vec<f64>> =
            vec![Vec::with_capacity(queries.len()); self.cutoffs.len()];
        let mut latencies = Vec::with_capacity(queries.len());
        let mut failed = 0;
        let mut last_failure = None;

        let progress = self.progress_bar(queries.len());
        for (position, query) in queries.iter().enumerate() {
            let truth = ground_truth.neighbors(position).unwrap_or_default();

            let start = Instant::now();
            let result = index.query(query, request_k);
            let latency = start.elapsed();

            match result {
                Ok(neighbors) => {
                    latencies.push(latency.as_secs_f64());
                    for (samples, &k) in recall_samples.iter_mut().zip(&self.cutoffs) {
                        samples.push(recall_at_k(&neighbors.indices, truth, k));
                    }
                }
                Err(err) => {
                    tracing::warn!("Query {} failed, recording zero recall: {}", position, err);
                    failed += 1;
                    last_failure = Some(err);
                    for samples in recall_samples.iter_mut() {
                        samples.push(0.0);
                    }
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        let query_time = match Summary::from_samples(&latencies) {
            Some(summary) => summary,
            None => {
                return Err(EvaluationError::AllQueriesFailed {
                    failed,
                    last: last_failure.unwrap_or_else(|| {
                        annbench_error::CodedError::new(ErrorCodes::Engine, "no query succeeded")
                            .boxed()
                    }),
                })
            }
        };
        if failed > 0 {
            tracing::warn!("{} of {} queries failed", failed, queries.len());
        }

        let recalls = self
            .cutoffs
            .iter()
            .zip(&recall_samples)
            .map(|(&k, samples)| RecallStats {
                k,
                recall: Summary::from_samples(samples).unwrap_or_default(),
            })
            .collect();

        Ok(EvaluationReport {
            recalls,
            query_time,
            queries_evaluated: queries.len(),
            queries_failed: failed,
        })
    }
}
