//! Inverted-file index over a k-means quantizer.
//!
//! Vectors sit in an exact-scanned pending list until `min_train_size` of
//! them exist; the quantizer is then trained once over everything stored and
//! later additions are assigned to their nearest centroid. Queries probe the
//! `nprobe` closest clusters, widening until `k` candidates are found.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::io::Write;

use ragdb_core::{Error, IndexKind, Metric, Result};

use super::flat::scan;
use super::{check_dims, check_stored, encode, vector_bytes, IndexParams, Neighbor, VectorIndex};
use crate::distance::distance;

const KMEANS_SEED: u64 = 42;
const KMEANS_MAX_ITERS: usize = 25;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteredIndex {
    dim: usize,
    metric: Metric,
    nlist: Option<usize>,
    nprobe: usize,
    min_train_size: usize,
    vectors: Vec<Vec<f32>>,
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<usize>>,
}

/// Cluster count for `n` training vectors: `2·√n`, kept within `1..n`.
pub fn default_nlist(n: usize) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let two_sqrt = 2 * (n as f64).sqrt() as usize;
    if n > 1 { two_sqrt.clamp(1, n - 1) } else { 1 }
}

impl ClusteredIndex {
    pub fn new(params: &IndexParams) -> Self {
        Self {
            dim: params.dim,
            metric: params.metric,
            nlist: params.nlist,
            nprobe: params.nprobe.max(1),
            min_train_size: params.min_train_size.max(1),
            vectors: Vec::new(),
            centroids: Vec::new(),
            lists: Vec::new(),
        }
    }

    pub fn is_trained(&self) -> bool { !self.centroids.is_empty() }

    pub fn nlist(&self) -> usize { self.centroids.len() }

    fn train(&mut self) {
        let n = self.vectors.len();
        let k = self.nlist.unwrap_or_else(|| default_nlist(n)).clamp(1, n.max(1));
        let (centroids, assignment) = kmeans(&self.vectors, k, self.metric);
        self.lists = vec![Vec::new(); centroids.len()];
        for (position, cluster) in assignment.into_iter().enumerate() {
            self.lists[cluster].push(position);
        }
        self.centroids = centroids;
        tracing::info!(vectors = n, nlist = self.centroids.len(), "trained clustered index");
    }

    fn nearest_centroid(&self, v: &[f32]) -> usize {
        nearest(&self.centroids, v, self.metric).0
    }
}

fn nearest(centroids: &[Vec<f32>], v: &[f32], metric: Metric) -> (usize, f32) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, distance(metric, v, c)))
        .fold((0, f32::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// k-means++ seeding with a fixed seed followed by Lloyd iterations.
/// Returns centroids and the cluster of every input vector.
fn kmeans(vectors: &[Vec<f32>], k: usize, metric: Metric) -> (Vec<Vec<f32>>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(KMEANS_SEED);
    let mut centroids: Vec<Vec<f32>> = vec![vectors[rng.gen_range(0..vectors.len())].clone()];
    let mut nearest_d: Vec<f32> = vectors.iter().map(|v| distance(metric, v, &centroids[0])).collect();
    while centroids.len() < k {
        let weights: Vec<f32> = nearest_d.iter().map(|d| d * d).collect();
        let total: f32 = weights.iter().sum();
        if total <= 0.0 {
            break;
        }
        let mut target = rng.gen::<f32>() * total;
        let mut pick = vectors.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if target < *w {
                pick = i;
                break;
            }
            target -= w;
        }
        centroids.push(vectors[pick].clone());
        let newest = &centroids[centroids.len() - 1];
        for (d, v) in nearest_d.iter_mut().zip(vectors) {
            *d = d.min(distance(metric, v, newest));
        }
    }

    let dim = vectors[0].len();
    let mut assignment = vec![usize::MAX; vectors.len()];
    for _ in 0..KMEANS_MAX_ITERS {
        let mut changed = false;
        for (slot, v) in assignment.iter_mut().zip(vectors) {
            let cluster = nearest(&centroids, v, metric).0;
            if *slot != cluster {
                *slot = cluster;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        let mut sums = vec![vec![0f32; dim]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (cluster, v) in assignment.iter().zip(vectors) {
            counts[*cluster] += 1;
            for (s, x) in sums[*cluster].iter_mut().zip(v) {
                *s += x;
            }
        }
        for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            // empty clusters keep their previous centroid
            if count > 0 {
                #[allow(clippy::cast_precision_loss)]
                let inv = 1.0 / count as f32;
                *centroid = sum.into_iter().map(|s| s * inv).collect();
            }
        }
    }
    (centroids, assignment)
}

impl VectorIndex for ClusteredIndex {
    fn kind(&self) -> IndexKind { IndexKind::Clustered }
    fn dim(&self) -> usize { self.dim }
    fn metric(&self) -> Metric { self.metric }
    fn len(&self) -> usize { self.vectors.len() }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        check_dims(self.dim, vectors)?;
        let start = self.vectors.len();
        self.vectors.extend_from_slice(vectors);
        if self.is_trained() {
            for position in start..self.vectors.len() {
                let cluster = self.nearest_centroid(&self.vectors[position]);
                self.lists[cluster].push(position);
            }
        } else if self.vectors.len() >= self.min_train_size {
            self.train();
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || query.len() != self.dim {
            return Vec::new();
        }
        if !self.is_trained() {
            return scan(self.metric, query, k, self.vectors.iter().enumerate());
        }
        let mut order: Vec<(usize, f32)> =
            self.centroids.iter().enumerate().map(|(i, c)| (i, distance(self.metric, query, c))).collect();
        order.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut candidates: Vec<usize> = Vec::new();
        for (probed, (cluster, _)) in order.into_iter().enumerate() {
            if probed >= self.nprobe && candidates.len() >= k {
                break;
            }
            candidates.extend_from_slice(&self.lists[cluster]);
        }
        scan(self.metric, query, k, candidates.into_iter().map(|p| (p, &self.vectors[p])))
    }

    fn reset(&mut self) {
        self.vectors.clear();
        self.centroids.clear();
        self.lists.clear();
    }

    fn memory_bytes(&self) -> usize {
        vector_bytes(self.vectors.len() + self.centroids.len(), self.dim)
            + self.vectors.len() * std::mem::size_of::<usize>()
    }

    fn save(&self, writer: &mut dyn Write) -> Result<()> { encode(self, writer) }

    /// Untrained: no lists. Trained: one list per centroid and every
    /// position in exactly one list.
    fn validate(&self) -> Result<()> {
        check_stored(self.dim, &self.vectors)?;
        check_stored(self.dim, &self.centroids)?;
        if self.lists.len() != self.centroids.len() {
            return Err(Error::IndexCorrupt(format!(
                "{} inverted lists for {} centroids",
                self.lists.len(),
                self.centroids.len()
            )));
        }
        if !self.is_trained() {
            return Ok(());
        }
        let mut seen = vec![false; self.vectors.len()];
        for &position in self.lists.iter().flatten() {
            match seen.get_mut(position) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => return Err(Error::IndexCorrupt(format!("position {position} listed twice"))),
                None => return Err(Error::IndexCorrupt(format!("position {position} out of range"))),
            }
        }
        if seen.iter().any(|s| !s) {
            return Err(Error::IndexCorrupt("vector missing from inverted lists".into()));
        }
        Ok(())
    }

    fn apply_query_params(&mut self, params: &IndexParams) { self.nprobe = params.nprobe.max(1); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nlist_is_clamped() {
        assert_eq!(default_nlist(0), 1);
        assert_eq!(default_nlist(1), 1);
        assert_eq!(default_nlist(2), 1);
        assert_eq!(default_nlist(100), 20);
    }

    #[test]
    fn kmeans_separates_obvious_clusters() {
        let mut vectors = Vec::new();
        for i in 0..10 {
            #[allow(clippy::cast_precision_loss)]
            let jitter = i as f32 * 0.01;
            vectors.push(vec![jitter, 0.0]);
            vectors.push(vec![100.0 + jitter, 100.0]);
        }
        let (centroids, assignment) = kmeans(&vectors, 2, Metric::Euclidean);
        assert_eq!(centroids.len(), 2);
        for pair in assignment.chunks(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert!(assignment.iter().step_by(2).all(|c| *c == assignment[0]));
    }

    fn trained() -> ClusteredIndex {
        let mut params = IndexParams::new(IndexKind::Clustered, 2);
        params.min_train_size = 40;
        params.nprobe = 1;
        let mut index = ClusteredIndex::new(&params);
        #[allow(clippy::cast_precision_loss)]
        let vectors: Vec<Vec<f32>> = (0..60).map(|i| vec![(i % 8) as f32, (i / 8) as f32]).collect();
        index.add(&vectors).unwrap();
        assert!(index.is_trained());
        index
    }

    #[test]
    fn validate_rejects_broken_lists() {
        let index = trained();
        index.validate().unwrap();

        let mut out_of_range = index.clone();
        out_of_range.lists[0].push(9999);
        assert!(matches!(out_of_range.validate(), Err(Error::IndexCorrupt(_))));

        let mut duplicated = index.clone();
        let position = duplicated.lists.iter().flatten().copied().next().unwrap();
        duplicated.lists[0].push(position);
        assert!(matches!(duplicated.validate(), Err(Error::IndexCorrupt(_))));

        let mut missing = index.clone();
        let list = missing.lists.iter_mut().find(|l| !l.is_empty()).unwrap();
        list.pop();
        assert!(matches!(missing.validate(), Err(Error::IndexCorrupt(_))));

        let mut orphaned = index;
        orphaned.lists.pop();
        assert!(matches!(orphaned.validate(), Err(Error::IndexCorrupt(_))));
    }

    #[test]
    fn corrupt_payload_is_rejected_on_load() {
        let mut index = trained();
        index.lists[0].push(9999);
        let mut payload = Vec::new();
        index.save(&mut payload).unwrap();

        let loaded = crate::index::load_index(IndexKind::Clustered, &mut payload.as_slice());
        assert!(matches!(loaded.err(), Some(Error::IndexCorrupt(_))));
    }

    #[test]
    fn query_params_override_saved_nprobe() {
        let mut index = trained();
        let mut params = IndexParams::new(IndexKind::Clustered, 2);
        params.nprobe = 6;
        index.apply_query_params(&params);
        assert_eq!(index.nprobe, 6);
        params.nprobe = 0;
        index.apply_query_params(&params);
        assert_eq!(index.nprobe, 1);
    }
}
