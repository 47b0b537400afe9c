//! Embedding generation for ragdb: a cache-first batch generator over any
//! [`Embedder`], a deterministic hash embedder, and (with the `candle`
//! feature) a local BGE-M3 model.

pub mod cache;
pub mod generator;
pub mod hash;

#[cfg(feature = "candle")]
pub mod device;
#[cfg(feature = "candle")]
pub mod model;
#[cfg(feature = "candle")]
pub mod pool;
#[cfg(feature = "candle")]
pub mod tokenize;

use std::path::Path;
use std::sync::Arc;

use ragdb_core::config::EmbeddingConfig;
use ragdb_core::{Embedder, Error, Result};

pub use cache::{content_hash, CacheStats, EmbeddingCache, CACHE_FILE};
pub use generator::EmbeddingGenerator;
pub use hash::HashEmbedder;
#[cfg(feature = "candle")]
pub use pool::masked_mean_l2;

/// `APP_USE_FAKE_EMBEDDINGS=1|true` forces the hash embedder.
pub fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Build the embedder named by `cfg.model`.
pub fn default_embedder(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    if fake_embeddings_requested() || cfg.model == "hash" {
        tracing::info!(dim = cfg.dimension, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(cfg.dimension)));
    }
    match cfg.model.as_str() {
        "bge-m3" => load_bge_m3(cfg.model_dir.as_deref(), cfg.dimension),
        other => Err(Error::Config(format!("unknown embedding model '{other}'"))),
    }
}

#[cfg(feature = "candle")]
fn load_bge_m3(model_dir: Option<&Path>, dimension: usize) -> Result<Arc<dyn Embedder>> {
    if dimension != model::BGE_M3_DIM {
        return Err(Error::DimensionMismatch { expected: dimension, got: model::BGE_M3_DIM });
    }
    let embedder = model::BgeM3Embedder::load(model_dir).map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "candle"))]
fn load_bge_m3(_model_dir: Option<&Path>, _dimension: usize) -> Result<Arc<dyn Embedder>> {
    Err(Error::EmbeddingUnavailable("bge-m3 requires building with the `candle` feature".into()))
}
