use serde::{Deserialize, Serialize};
use std::io::Write;

use ragdb_core::{IndexKind, Metric, Result};

use super::{check_dims, check_stored, encode, vector_bytes, Neighbor, VectorIndex};
use crate::distance::distance;

/// Exact linear scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    metric: Metric,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dim: usize, metric: Metric) -> Self {
        Self { dim, metric, vectors: Vec::new() }
    }
}

/// Exact top-`k` over `candidates`; shared with the clustered backend.
pub(crate) fn scan<'a>(
    metric: Metric,
    query: &[f32],
    k: usize,
    candidates: impl Iterator<Item = (usize, &'a Vec<f32>)>,
) -> Vec<Neighbor> {
    let mut hits: Vec<Neighbor> = candidates
        .map(|(position, v)| Neighbor { position, distance: distance(metric, query, v) })
        .collect();
    hits.sort_by(Neighbor::cmp_by_distance);
    hits.truncate(k);
    hits
}

impl VectorIndex for FlatIndex {
    fn kind(&self) -> IndexKind { IndexKind::Flat }
    fn dim(&self) -> usize { self.dim }
    fn metric(&self) -> Metric { self.metric }
    fn len(&self) -> usize { self.vectors.len() }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        check_dims(self.dim, vectors)?;
        self.vectors.extend_from_slice(vectors);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || query.len() != self.dim {
            return Vec::new();
        }
        scan(self.metric, query, k, self.vectors.iter().enumerate())
    }

    fn reset(&mut self) { self.vectors.clear(); }

    fn memory_bytes(&self) -> usize { vector_bytes(self.vectors.len(), self.dim) }

    fn save(&self, writer: &mut dyn Write) -> Result<()> { encode(self, writer) }

    fn validate(&self) -> Result<()> { check_stored(self.dim, &self.vectors) }
}
