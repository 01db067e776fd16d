//! Approximate graph-based index.
//!
//! A navigable-small-world graph: each inserted posting is linked
//! bidirectionally to its nearest existing postings, and queries run a
//! greedy beam search from a fixed entry point. Recall is tunable through
//! the beam width `ef`; with `ef >= len` the search degenerates to an
//! exhaustive scan and results match the flat index exactly.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use crate::error::Result;

use super::{DistanceMetric, IndexBackend, IndexKind, SearchHit, check_dims};

/// Default number of graph links created per insert.
const DEFAULT_M: usize = 8;

/// Default beam width for searches.
const DEFAULT_EF: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// Graph Node
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Node {
    id: i64,
    vector: Vec<f32>,
    neighbors: Vec<usize>,
}

/// A beam-search candidate ordered by distance, ties by node index.
#[derive(Debug, PartialEq)]
struct Candidate {
    distance: f32,
    node: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NSW Index
// ─────────────────────────────────────────────────────────────────────────────

/// Approximate nearest-neighbor index over a small-world graph.
#[derive(Debug)]
pub struct NswIndex {
    metric: DistanceMetric,
    dims: usize,
    /// Links created per insert.
    m: usize,
    /// Beam width for searches.
    ef: usize,
    nodes: Vec<Node>,
}

impl NswIndex {
    /// Create an empty index with default graph parameters.
    pub fn new(metric: DistanceMetric, dims: usize) -> Self {
        Self::with_params(metric, dims, DEFAULT_M, DEFAULT_EF)
    }

    /// Create an empty index with explicit graph parameters.
    ///
    /// `m` is the number of links per insert (>= 1); `ef` is the search beam
    /// width. Larger values trade insert/query cost for recall.
    pub fn with_params(metric: DistanceMetric, dims: usize, m: usize, ef: usize) -> Self {
        Self {
            metric,
            dims,
            m: m.max(1),
            ef: ef.max(1),
            nodes: Vec::new(),
        }
    }

    /// Greedy beam search from the entry node.
    ///
    /// Returns up to `ef` node indices ordered by ascending distance. Visits
    /// every node when `ef >= self.nodes.len()` because the graph is
    /// connected (every insert links to at least one existing node).
    fn search_nodes(&self, query: &[f32], ef: usize) -> Vec<Candidate> {
        if self.nodes.is_empty() {
            return Vec::new();
        }

        let entry = 0usize;
        let entry_distance = self.metric.distance(query, &self.nodes[entry].vector);

        let mut visited: HashSet<usize> = HashSet::from([entry]);
        // Min-heap of nodes still to expand.
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        // Max-heap of the best `ef` nodes seen so far.
        let mut best: BinaryHeap<Candidate> = BinaryHeap::new();

        frontier.push(Reverse(Candidate {
            distance: entry_distance,
            node: entry,
        }));
        best.push(Candidate {
            distance: entry_distance,
            node: entry,
        });

        while let Some(Reverse(current)) = frontier.pop() {
            let worst_kept = best.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
            if best.len() >= ef && current.distance > worst_kept {
                break;
            }

            for &neighbor in &self.nodes[current.node].neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let distance = self.metric.distance(query, &self.nodes[neighbor].vector);
                let worst_kept = best.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);

                if best.len() < ef || distance < worst_kept {
                    frontier.push(Reverse(Candidate {
                        distance,
                        node: neighbor,
                    }));
                    best.push(Candidate { distance, node: neighbor });
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        let mut results = best.into_vec();
        results.sort();
        results
    }

    /// Prune a node's neighbor list back to the closest links.
    fn prune_neighbors(&mut self, node: usize) {
        let max_degree = self.m * 2;
        if self.nodes[node].neighbors.len() <= max_degree {
            return;
        }

        let anchor = self.nodes[node].vector.clone();
        let mut ranked: Vec<(f32, usize)> = self.nodes[node]
            .neighbors
            .iter()
            .map(|&n| (self.metric.distance(&anchor, &self.nodes[n].vector), n))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        ranked.truncate(max_degree);

        self.nodes[node].neighbors = ranked.into_iter().map(|(_, n)| n).collect();
    }
}

impl IndexBackend for NswIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Nsw
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn add(&mut self, id: i64, vector: Vec<f32>) -> Result<()> {
        check_dims(self.dims, &vector)?;

        let new_index = self.nodes.len();

        if self.nodes.is_empty() {
            self.nodes.push(Node {
                id,
                vector,
                neighbors: Vec::new(),
            });
            return Ok(());
        }

        // Link to the nearest existing nodes, searched with a beam wide
        // enough to cover the link count.
        let beam = self.ef.max(self.m);
        let nearest = self.search_nodes(&vector, beam);
        let links: Vec<usize> = nearest.iter().take(self.m).map(|c| c.node).collect();

        self.nodes.push(Node {
            id,
            vector,
            neighbors: links.clone(),
        });

        for link in links {
            self.nodes[link].neighbors.push(new_index);
            self.prune_neighbors(link);
        }

        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let beam = self.ef.max(k);
        let mut hits: Vec<SearchHit> = self
            .search_nodes(query, beam)
            .into_iter()
            .map(|c| SearchHit {
                id: self.nodes[c.node].id,
                distance: c.distance,
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        hits
    }

    fn clear(&mut self) {
        self.nodes.clear();
    }

    fn postings(&self) -> Vec<(i64, Vec<f32>)> {
        self.nodes
            .iter()
            .map(|n| (n.id, n.vector.clone()))
            .collect()
    }
}
