pub mod brute_force;
pub mod config;
pub mod graph;
pub mod io;
pub mod predicate;
pub mod store;

mod build;
mod math;
mod persist;
mod search;
mod visited;

pub use brute_force::{exact_knn, groundtruth, recall_at_k};
pub use build::BuildStats;
pub use config::{GraphConfig, RobustPolicy, SearchParams};
pub use graph::AcornIndex;
pub use predicate::{AcceptAll, LabelEquals, LabelMask, LabelSet, Predicate};
pub use search::SearchResult;
pub use store::{Label, VectorStore};

// Re-export RoaringBitmap for building label sets
pub use roaring::RoaringBitmap;

use serde::{Deserialize, Serialize};


/// Distance metric used by the proximity graph.
///
/// Both metrics are symmetric and non-negative, smaller means closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Metric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// Cosine distance, `1 - cos(a, b)`.
    Cosine,
}

impl Metric {
    /// Distance between two vectors of equal dimension.
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => math::l2_distance_sqr(a, b),
            Metric::Cosine => math::cosine_distance(a, b),
        }
    }
}

/// Errors that can occur when building, querying or persisting an index.
#[derive(thiserror::Error, Debug)]
pub enum AcornError {
    /// Returned when construction parameters or the store layout are malformed.
    #[error("invalid parameters: {0}")]
    InvalidParameters(&'static str),
    /// Returned when construction is attempted over zero vectors.
    #[error("cannot build an index over an empty vector store")]
    EmptyInput,
    /// Returned when a vector width or a vector/label count is inconsistent.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Returned when an identifier lies outside the vector store.
    #[error("identifier {id} out of range for store of {len} vectors")]
    OutOfRange { id: usize, len: usize },
    /// Returned when query parameters are unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Returned when persistence encounters an I/O failure.
    #[error("i/o error while reading or writing an index: {0}")]
    Io(#[from] std::io::Error),
    /// Returned when the persisted bytes are inconsistent or corrupt.
    #[error("invalid persisted index: {0}")]
    InvalidPersistence(&'static str),
}
