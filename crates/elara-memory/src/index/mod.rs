//! Vector index backends.
//!
//! The index is a derived cache over the relational store: it holds
//! `(id, embedding)` postings and answers nearest-neighbor queries. Its
//! authoritative content is always recoverable by replaying the store in id
//! order, which is both the first-time construction path and the corruption
//! recovery path (see [`crate::store`]'s synchronizer).
//!
//! Two backends implement the same [`IndexBackend`] trait:
//! - [`flat::FlatIndex`]: exact brute-force scan
//! - [`nsw::NswIndex`]: approximate navigable-small-world graph
//!
//! Backend and distance metric are chosen once at store construction and
//! fixed for the lifetime of the index.

pub mod flat;
pub mod nsw;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Distance Metric
// ─────────────────────────────────────────────────────────────────────────────

/// Distance function used for nearest-neighbor ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    #[default]
    SquaredL2,
    /// Cosine distance: `1 - cos(a, b)`.
    Cosine,
}

impl DistanceMetric {
    /// Compute the distance between two equal-length vectors.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            Self::SquaredL2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum(),
            Self::Cosine => {
                let mut dot = 0.0f32;
                let mut norm_a = 0.0f32;
                let mut norm_b = 0.0f32;
                for (x, y) in a.iter().zip(b.iter()) {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                if norm_a == 0.0 || norm_b == 0.0 {
                    // A zero vector has no direction; treat it as maximally far.
                    return 1.0;
                }
                1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Selection
// ─────────────────────────────────────────────────────────────────────────────

/// Which index backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Exact brute-force index.
    #[default]
    Flat,
    /// Approximate graph-based index.
    Nsw,
}

/// Construct an empty backend of the given kind.
pub fn new_backend(kind: IndexKind, metric: DistanceMetric, dims: usize) -> Box<dyn IndexBackend> {
    match kind {
        IndexKind::Flat => Box::new(flat::FlatIndex::new(metric, dims)),
        IndexKind::Nsw => Box::new(nsw::NswIndex::new(metric, dims)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A single nearest-neighbor result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// The entry id the posting belongs to.
    pub id: i64,
    /// Distance from the query vector (lower = more similar).
    pub distance: f32,
}

/// Nearest-neighbor index over entry embeddings.
///
/// Implementations must rank with their fixed [`DistanceMetric`] and break
/// distance ties by ascending id so results are reproducible.
pub trait IndexBackend: Send {
    /// The backend kind, for snapshot headers.
    fn kind(&self) -> IndexKind;

    /// The fixed distance metric.
    fn metric(&self) -> DistanceMetric;

    /// The fixed embedding dimension.
    fn dims(&self) -> usize;

    /// Number of postings held.
    fn len(&self) -> usize;

    /// Whether the index holds no postings.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a posting.
    ///
    /// Not idempotent: adding the same id twice creates duplicate postings.
    /// The store's single-writer discipline guarantees each id is added
    /// exactly once.
    fn add(&mut self, id: i64, vector: Vec<f32>) -> Result<()>;

    /// Return up to `k` hits ordered by ascending distance.
    ///
    /// Returns fewer than `k` hits if the index holds fewer postings, and an
    /// empty vec (never an error) when the index is empty.
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit>;

    /// Drop all postings.
    fn clear(&mut self);

    /// All postings in insertion order, for snapshotting.
    fn postings(&self) -> Vec<(i64, Vec<f32>)>;
}

/// Shared dimension check for `add` implementations.
pub(crate) fn check_dims(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(MemoryError::InvalidData(format!(
            "index vector dimension mismatch: expected {}, got {}",
            expected,
            vector.len()
        )));
    }
    Ok(())
}
