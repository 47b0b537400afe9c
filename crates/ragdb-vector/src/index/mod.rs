//! Nearest-neighbor backends behind one strategy trait.
//!
//! A backend only knows positions: position `i` is the `i`-th vector added
//! since the last reset. Mapping positions to documents, tombstones and
//! filtering live in [`crate::store::VectorStore`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::{Read, Write};

use ragdb_core::config::IndexConfig;
use ragdb_core::{Error, IndexKind, Metric, Result};

pub mod clustered;
pub mod flat;
pub mod graph;

pub use clustered::ClusteredIndex;
pub use flat::FlatIndex;
pub use graph::GraphIndex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

impl Neighbor {
    /// Ascending distance, ties broken by position.
    pub fn cmp_by_distance(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then(self.position.cmp(&other.position))
    }
}

pub trait VectorIndex: Send + Sync {
    fn kind(&self) -> IndexKind;
    fn dim(&self) -> usize;
    fn metric(&self) -> Metric;
    /// Number of slots, including ones the store has tombstoned.
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }
    /// Append vectors at positions `len()..len() + vectors.len()`.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()>;
    /// Up to `k` neighbors, ascending by distance.
    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor>;
    fn reset(&mut self);
    fn memory_bytes(&self) -> usize;
    fn save(&self, writer: &mut dyn Write) -> Result<()>;
    /// Structural check of a decoded payload: every stored position and
    /// link is in range, so a later search cannot index out of bounds.
    fn validate(&self) -> Result<()>;
    /// Take query-time settings from `params` rather than the saved payload.
    fn apply_query_params(&mut self, _params: &IndexParams) {}
}

/// Construction parameters shared by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexParams {
    pub kind: IndexKind,
    pub metric: Metric,
    pub dim: usize,
    pub nlist: Option<usize>,
    pub nprobe: usize,
    pub min_train_size: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub rebuild_tombstone_ratio: f32,
}

impl IndexParams {
    pub fn from_config(cfg: &IndexConfig, dim: usize) -> Self {
        Self {
            kind: cfg.kind,
            metric: cfg.metric,
            dim,
            nlist: cfg.nlist,
            nprobe: cfg.nprobe,
            min_train_size: cfg.min_train_size,
            m: cfg.m,
            ef_construction: cfg.ef_construction,
            ef_search: cfg.ef_search,
            rebuild_tombstone_ratio: cfg.rebuild_tombstone_ratio,
        }
    }

    /// Default index settings of the given kind.
    pub fn new(kind: IndexKind, dim: usize) -> Self {
        Self::from_config(&IndexConfig { kind, ..IndexConfig::default() }, dim)
    }
}

/// Fresh, empty backend of the configured kind.
pub fn build_index(params: &IndexParams) -> Box<dyn VectorIndex> {
    match params.kind {
        IndexKind::Flat => Box::new(FlatIndex::new(params.dim, params.metric)),
        IndexKind::Clustered => Box::new(ClusteredIndex::new(params)),
        IndexKind::Graph => Box::new(GraphIndex::new(params)),
    }
}

/// Decode a backend written by [`VectorIndex::save`] and check its structure.
pub fn load_index(kind: IndexKind, reader: &mut dyn Read) -> Result<Box<dyn VectorIndex>> {
    let index: Box<dyn VectorIndex> = match kind {
        IndexKind::Flat => Box::new(decode::<FlatIndex>(reader)?),
        IndexKind::Clustered => Box::new(decode::<ClusteredIndex>(reader)?),
        IndexKind::Graph => Box::new(decode::<GraphIndex>(reader)?),
    };
    index.validate()?;
    Ok(index)
}

pub(crate) fn encode<T: Serialize>(value: &T, writer: &mut dyn Write) -> Result<()> {
    bincode::serialize_into(writer, value).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(reader: &mut dyn Read) -> Result<T> {
    bincode::deserialize_from(reader).map_err(|e| Error::IndexCorrupt(e.to_string()))
}

pub(crate) fn check_dims(dim: usize, vectors: &[Vec<f32>]) -> Result<()> {
    match vectors.iter().find(|v| v.len() != dim) {
        Some(v) => Err(Error::DimensionMismatch { expected: dim, got: v.len() }),
        None => Ok(()),
    }
}

/// Every stored vector has the index dimension.
pub(crate) fn check_stored(dim: usize, vectors: &[Vec<f32>]) -> Result<()> {
    check_dims(dim, vectors).map_err(|e| Error::IndexCorrupt(e.to_string()))
}

/// Bytes held by `n` vectors of `dim` floats.
pub(crate) fn vector_bytes(n: usize, dim: usize) -> usize {
    n * dim * std::mem::size_of::<f32>()
}
