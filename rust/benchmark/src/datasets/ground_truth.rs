//! Ground truth loading utilities.

use std::path::Path;

use annbench_error::{BenchError, ErrorCodes};
use annbench_index::npy::{self, NpyError};
use ndarray::{Array3, Axis, Ix3};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroundTruthError {
    #[error(transparent)]
    Npy(#[from] NpyError),
    #[error("Ground truth must have shape (queries, 2, k), got {0:?}")]
    Shape(Vec<usize>),
    #[error("Ground truth entry {query} has invalid neighbor index {value}")]
    InvalidIndex { query: usize, value: f64 },
    #[error("Ground truth rows have inconsistent lengths")]
    Ragged,
}

impl BenchError for GroundTruthError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::Data
    }
}

/// Exact top-k neighbors per query: entry `i` belongs to query `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct GroundTruth {
    neighbors: Vec<Vec<usize>>,
    similarities: Vec<Vec<f32>>,
    depth: usize,
}

impl GroundTruth {
    pub fn new(
        neighbors: Vec<Vec<usize>>,
        similarities: Vec<Vec<f32>>,
    ) -> Result<Self, GroundTruthError> {
        let depth = neighbors.first().map(Vec::len).unwrap_or(0);
        if neighbors.len() != similarities.len()
            || neighbors
                .iter()
                .zip(&similarities)
                .any(|(n, s)| n.len() != depth || s.len() != depth)
        {
            return Err(GroundTruthError::Ragged);
        }
        Ok(GroundTruth {
            neighbors,
            similarities,
            depth,
        })
    }

    /// Expected array layout: `[:, 0, :]` holds neighbor indices (stored as
    /// floats) and `[:, 1, :]` their similarities.
    pub fn from_npy(path: &Path) -> Result<Self, GroundTruthError> {
        let array = npy::read_f64::<Ix3>(path)?;
        Self::from_array(&array)
    }

    pub fn from_array(array: &Array3<f64>) -> Result<Self, GroundTruthError> {
        if array.shape()[1] != 2 {
            return Err(GroundTruthError::Shape(array.shape().to_vec()));
        }
        let mut neighbors = Vec::with_capacity(array.shape()[0]);
        let mut similarities = Vec::with_capacity(array.shape()[0]);
        for (query, entry) in array.axis_iter(Axis(0)).enumerate() {
            let indices = entry
                .row(0)
                .iter()
                .map(|&value| {
                    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
                        Ok(value as usize)
                    } else {
                        Err(GroundTruthError::InvalidIndex { query, value })
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            neighbors.push(indices);
            similarities.push(entry.row(1).iter().map(|&s| s as f32).collect());
        }
        Self::new(neighbors, similarities)
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Number of true neighbors stored per query.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn neighbors(&self, query: usize) -> Option<&[usize]> {
        self.neighbors.get(query).map(Vec::as_slice)
    }

    pub fn similarities(&self, query: usize) -> Option<&[f32]> {
        self.similarities.get(query).map(Vec::as_slice)
    }
}
