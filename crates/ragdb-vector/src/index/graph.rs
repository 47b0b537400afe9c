//! HNSW (Hierarchical Navigable Small World) graph index.
//!
//! Higher layers hold exponentially fewer nodes. Insertion and search start
//! from the top entry point, descend greedily and run a beam search of width
//! `ef` on the lower layers. Level assignment uses a seeded LCG so the same
//! insertion order always produces the same graph.

use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::io::Write;

use ragdb_core::{Error, IndexKind, Metric, Result};

use super::{check_dims, check_stored, encode, vector_bytes, IndexParams, Neighbor, VectorIndex};
use crate::distance::distance;

const MAX_LEVEL: u8 = 16;
const RNG_SEED: u64 = 42;

#[derive(Debug, Clone, Copy)]
struct Scored {
    distance: f32,
    position: usize,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then(self.position.cmp(&other.position))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    /// One neighbor list per layer `0..=level`.
    neighbors: Vec<Vec<usize>>,
}

impl Node {
    fn level(&self) -> usize { self.neighbors.len() - 1 }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphIndex {
    dim: usize,
    metric: Metric,
    m: usize,
    m_max0: usize,
    ef_construction: usize,
    ef_search: usize,
    level_mult: f32,
    vectors: Vec<Vec<f32>>,
    nodes: Vec<Node>,
    entry_point: Option<usize>,
    rng_state: u64,
}

impl GraphIndex {
    pub fn new(params: &IndexParams) -> Self {
        let m = params.m.max(2);
        #[allow(clippy::cast_precision_loss)]
        let level_mult = 1.0 / (m as f32).ln();
        Self {
            dim: params.dim,
            metric: params.metric,
            m,
            m_max0: m * 2,
            ef_construction: params.ef_construction.max(1),
            ef_search: params.ef_search.max(1),
            level_mult,
            vectors: Vec::new(),
            nodes: Vec::new(),
            entry_point: None,
            rng_state: RNG_SEED,
        }
    }

    /// floor(-ln(uniform) * level_mult), from a 64-bit LCG.
    fn select_level(&mut self) -> usize {
        self.rng_state = self.rng_state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        #[allow(clippy::cast_precision_loss)]
        let r = ((self.rng_state >> 33) as f32 / (1u64 << 31) as f32).clamp(1e-7, 1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let level = (-r.ln() * self.level_mult).floor() as u8;
        usize::from(level.min(MAX_LEVEL))
    }

    fn dist(&self, position: usize, query: &[f32]) -> f32 {
        distance(self.metric, query, &self.vectors[position])
    }

    fn greedy(&self, mut current: usize, query: &[f32], level: usize) -> usize {
        let mut current_d = self.dist(current, query);
        loop {
            let mut changed = false;
            if let Some(list) = self.nodes[current].neighbors.get(level) {
                for &n in list {
                    let d = self.dist(n, query);
                    if d < current_d {
                        current = n;
                        current_d = d;
                        changed = true;
                    }
                }
            }
            if !changed {
                return current;
            }
        }
    }

    /// Beam search on one layer; result ascending by distance.
    fn search_layer(&self, entry: usize, query: &[f32], ef: usize, level: usize) -> Vec<Scored> {
        let mut visited: HashSet<usize> = HashSet::from([entry]);
        let first = Scored { distance: self.dist(entry, query), position: entry };
        // closest first
        let mut candidates: BinaryHeap<Reverse<Scored>> = BinaryHeap::from([Reverse(first)]);
        // farthest first, so the worst result is cheap to evict
        let mut results: BinaryHeap<Scored> = BinaryHeap::from([first]);

        while let Some(Reverse(current)) = candidates.pop() {
            let worst = results.peek().map_or(f32::INFINITY, |r| r.distance);
            if current.distance > worst && results.len() >= ef {
                break;
            }
            let Some(list) = self.nodes[current.position].neighbors.get(level) else { continue };
            for &n in list {
                if !visited.insert(n) {
                    continue;
                }
                let scored = Scored { distance: self.dist(n, query), position: n };
                let worst = results.peek().map_or(f32::INFINITY, |r| r.distance);
                if results.len() < ef || scored.distance < worst {
                    candidates.push(Reverse(scored));
                    results.push(scored);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }
        results.into_sorted_vec()
    }

    fn connect(&mut self, from: usize, to: usize, level: usize) {
        let list = &mut self.nodes[from].neighbors[level];
        if !list.contains(&to) {
            list.push(to);
        }
    }

    /// Keep the `max` closest neighbors of `position` on `level`.
    fn prune(&mut self, position: usize, level: usize, max: usize) {
        if self.nodes[position].neighbors[level].len() <= max {
            return;
        }
        let base = &self.vectors[position];
        let mut scored: Vec<Scored> = self.nodes[position].neighbors[level]
            .iter()
            .map(|&n| Scored { distance: distance(self.metric, base, &self.vectors[n]), position: n })
            .collect();
        scored.sort();
        scored.truncate(max);
        self.nodes[position].neighbors[level] = scored.into_iter().map(|s| s.position).collect();
    }

    fn insert(&mut self, vector: Vec<f32>) {
        let position = self.vectors.len();
        let level = self.select_level();
        self.vectors.push(vector);
        self.nodes.push(Node { neighbors: vec![Vec::new(); level + 1] });

        let Some(mut entry) = self.entry_point else {
            self.entry_point = Some(position);
            return;
        };
        let top = self.nodes[entry].level();
        let query = self.vectors[position].clone();

        for lc in ((level + 1)..=top).rev() {
            entry = self.greedy(entry, &query, lc);
        }
        for lc in (0..=level.min(top)).rev() {
            let found = self.search_layer(entry, &query, self.ef_construction, lc);
            let limit = if lc == 0 { self.m_max0 } else { self.m };
            let selected: Vec<usize> = found.iter().take(limit).map(|s| s.position).collect();
            for &n in &selected {
                self.connect(n, position, lc);
                self.connect(position, n, lc);
            }
            for &n in &selected {
                self.prune(n, lc, limit);
            }
            if let Some(best) = found.first() {
                entry = best.position;
            }
        }
        if level > top {
            self.entry_point = Some(position);
        }
    }
}

impl VectorIndex for GraphIndex {
    fn kind(&self) -> IndexKind { IndexKind::Graph }
    fn dim(&self) -> usize { self.dim }
    fn metric(&self) -> Metric { self.metric }
    fn len(&self) -> usize { self.vectors.len() }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        check_dims(self.dim, vectors)?;
        for v in vectors {
            self.insert(v.clone());
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let Some(mut entry) = self.entry_point else { return Vec::new() };
        if k == 0 || query.len() != self.dim {
            return Vec::new();
        }
        for lc in (1..=self.nodes[entry].level()).rev() {
            entry = self.greedy(entry, query, lc);
        }
        self.search_layer(entry, query, self.ef_search.max(k), 0)
            .into_iter()
            .take(k)
            .map(|s| Neighbor { position: s.position, distance: s.distance })
            .collect()
    }

    fn reset(&mut self) {
        self.vectors.clear();
        self.nodes.clear();
        self.entry_point = None;
        self.rng_state = RNG_SEED;
    }

    fn memory_bytes(&self) -> usize {
        let edges: usize = self.nodes.iter().flat_map(|n| &n.neighbors).map(Vec::len).sum();
        vector_bytes(self.vectors.len(), self.dim) + edges * std::mem::size_of::<usize>()
    }

    fn save(&self, writer: &mut dyn Write) -> Result<()> { encode(self, writer) }

    fn validate(&self) -> Result<()> {
        check_stored(self.dim, &self.vectors)?;
        let n = self.vectors.len();
        if self.nodes.len() != n {
            return Err(Error::IndexCorrupt(format!("{} graph nodes for {n} vectors", self.nodes.len())));
        }
        match self.entry_point {
            None if n == 0 => {}
            Some(entry) if entry < n => {}
            other => return Err(Error::IndexCorrupt(format!("entry point {other:?} invalid for {n} nodes"))),
        }
        for (position, node) in self.nodes.iter().enumerate() {
            if node.neighbors.is_empty() || node.neighbors.len() > usize::from(MAX_LEVEL) + 1 {
                return Err(Error::IndexCorrupt(format!("node {position} has {} layers", node.neighbors.len())));
            }
            if let Some(bad) = node.neighbors.iter().flatten().find(|&&link| link >= n) {
                return Err(Error::IndexCorrupt(format!("node {position} links to missing node {bad}")));
            }
        }
        Ok(())
    }

    fn apply_query_params(&mut self, params: &IndexParams) { self.ef_search = params.ef_search.max(1); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_distribution_decays() {
        let mut g = GraphIndex::new(&IndexParams::new(IndexKind::Graph, 2));
        let mut levels = [0u32; 17];
        for _ in 0..10_000 {
            levels[g.select_level()] += 1;
        }
        assert!(levels[0] > 5000, "level 0 should dominate: {levels:?}");
        assert!(levels[0] > levels[1]);
    }

    #[test]
    fn finds_exact_match() {
        let mut g = GraphIndex::new(&IndexParams::new(IndexKind::Graph, 2));
        let vectors: Vec<Vec<f32>> = (0..200).map(|i| vec![(i % 20) as f32, (i / 20) as f32]).collect();
        g.add(&vectors).unwrap();
        let hits = g.search(&[7.0, 3.0], 1);
        assert_eq!(hits[0].position, 3 * 20 + 7);
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn validate_rejects_dangling_links() {
        let mut g = GraphIndex::new(&IndexParams::new(IndexKind::Graph, 2));
        #[allow(clippy::cast_precision_loss)]
        let vectors: Vec<Vec<f32>> = (0..50).map(|i| vec![i as f32, 0.0]).collect();
        g.add(&vectors).unwrap();
        g.validate().unwrap();

        let mut dangling = g.clone();
        dangling.nodes[0].neighbors[0].push(9999);
        assert!(matches!(dangling.validate(), Err(Error::IndexCorrupt(_))));

        let mut bad_entry = g.clone();
        bad_entry.entry_point = Some(50);
        assert!(matches!(bad_entry.validate(), Err(Error::IndexCorrupt(_))));

        let mut short = g;
        short.nodes.pop();
        assert!(matches!(short.validate(), Err(Error::IndexCorrupt(_))));
    }

    #[test]
    fn query_params_override_saved_ef_search() {
        let mut g = GraphIndex::new(&IndexParams::new(IndexKind::Graph, 2));
        let mut params = IndexParams::new(IndexKind::Graph, 2);
        params.ef_search = 123;
        g.apply_query_params(&params);
        assert_eq!(g.ef_search, 123);
    }
}
