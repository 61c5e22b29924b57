use std::path::{Path, PathBuf};
use std::slice::ChunksExact;
use std::sync::Arc;

use annbench_error::{BenchError, ErrorCodes};
use ndarray::Ix2;
use thiserror::Error;

use crate::npy::{self, NpyError};

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error(transparent)]
    Npy(#[from] NpyError),
    #[error("Embeddings have zero dimensionality")]
    ZeroDimensionality,
    #[error("Embedding buffer of length {len} is not a multiple of dimensionality {dimensionality}")]
    RaggedBuffer { len: usize, dimensionality: usize },
    #[error("Embedding {row} has dimensionality {actual}, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

impl BenchError for EmbeddingError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::Data
    }
}

/// An immutable, position-addressed set of fixed-dimension vectors stored
/// row-major in a single buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingSet {
    data: Vec<f32>,
    dimensionality: usize,
}

impl EmbeddingSet {
    pub fn new(data: Vec<f32>, dimensionality: usize) -> Result<Self, EmbeddingError> {
        if dimensionality == 0 {
            return Err(EmbeddingError::ZeroDimensionality);
        }
        if data.len() % dimensionality != 0 {
            return Err(EmbeddingError::RaggedBuffer {
                len: data.len(),
                dimensionality,
            });
        }
        Ok(EmbeddingSet {
            data,
            dimensionality,
        })
    }

    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, EmbeddingError> {
        let dimensionality = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * dimensionality);
        for (row, embedding) in rows.iter().enumerate() {
            let embedding = embedding.as_ref();
            if embedding.len() != dimensionality {
                return Err(EmbeddingError::RaggedRow {
                    row,
                    expected: dimensionality,
                    actual: embedding.len(),
                });
            }
            data.extend_from_slice(embedding);
        }
        Self::new(data, dimensionality)
    }

    /// Load a 2-D `(n, dim)` numpy array.
    pub fn from_npy(path: &Path) -> Result<Self, EmbeddingError> {
        let array = npy::read_f32::<Ix2>(path)?;
        let dimensionality = array.ncols();
        // `iter` walks in logical order, so Fortran-ordered files come out row-major.
        Self::new(array.iter().copied().collect(), dimensionality)
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimensionality
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensionality)?;
        self.data.get(start..start + self.dimensionality)
    }

    pub fn iter(&self) -> ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dimensionality)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Where a backend reads its corpus from. Loading is part of the build so
/// that construction cost covers it.
#[derive(Clone, Debug)]
pub enum EmbeddingSource {
    Npy(PathBuf),
    InMemory(Arc<EmbeddingSet>),
}

impl EmbeddingSource {
    pub fn load(&self) -> Result<Arc<EmbeddingSet>, EmbeddingError> {
        match self {
            EmbeddingSource::Npy(path) => Ok(Arc::new(EmbeddingSet::from_npy(path)?)),
            EmbeddingSource::InMemory(set) => Ok(set.clone()),
        }
    }
}

impl std::fmt::Display for EmbeddingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingSource::Npy(path) => write!(f, "{}", path.display()),
            EmbeddingSource::InMemory(set) => write!(
                f,
                "<in-memory {}x{}>",
                set.len(),
                set.dimensionality()
            ),
        }
    }
}
