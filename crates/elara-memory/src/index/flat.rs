//! Exact brute-force index.

use crate::error::Result;

use super::{DistanceMetric, IndexBackend, IndexKind, SearchHit, check_dims};

/// Exact nearest-neighbor index: a linear scan over all postings.
///
/// O(n) per query, O(1) per insert. The right default for conversational
/// memory sizes, and the reference against which the approximate backend is
/// checked.
#[derive(Debug)]
pub struct FlatIndex {
    metric: DistanceMetric,
    dims: usize,
    postings: Vec<(i64, Vec<f32>)>,
}

impl FlatIndex {
    /// Create an empty flat index.
    pub fn new(metric: DistanceMetric, dims: usize) -> Self {
        Self {
            metric,
            dims,
            postings: Vec::new(),
        }
    }
}

impl IndexBackend for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn len(&self) -> usize {
        self.postings.len()
    }

    fn add(&mut self, id: i64, vector: Vec<f32>) -> Result<()> {
        check_dims(self.dims, &vector)?;
        self.postings.push((id, vector));
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .postings
            .iter()
            .map(|(id, vector)| SearchHit {
                id: *id,
                distance: self.metric.distance(query, vector),
            })
            .collect();

        // Ascending distance, ties broken by ascending id for reproducibility.
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        hits
    }

    fn clear(&mut self) {
        self.postings.clear();
    }

    fn postings(&self) -> Vec<(i64, Vec<f32>)> {
        self.postings.clone()
    }
}
