//! The ANN engine boundary used by the benchmark harness.
//!
//! The harness only ever talks to an engine through [`AnnBackend`] (building)
//! and [`AnnIndex`] (querying). Backends are looked up by name in a
//! [`BackendRegistry`].

pub mod backend;
pub mod brute_force;
pub mod config;
pub mod distance;
pub mod embeddings;
pub mod hnsw;
pub mod npy;
mod types;
#[cfg(feature = "usearch")]
pub mod usearch_index;

pub use backend::*;
pub use embeddings::{EmbeddingError, EmbeddingSet, EmbeddingSource};
pub use types::*;

/// Neighbor-list width used when the caller does not provide one.
pub const DEFAULT_NEIGHBOR_WIDTH: usize = 10;
