//! Embedding cache keyed by `content_hash`, scoped to one embedder.
//!
//! Bounded LRU in memory, persisted with bincode so cached vectors come back
//! bit-identical. The file carries the embedder id and dimension; a file
//! written by another embedder, or one that fails to decode, is discarded.

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use ragdb_core::{Error, Result};

pub const CACHE_FILE: &str = "embedding_cache.bin";

/// blake3 hex digest of the exact input text.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    embedder_id: String,
    dim: usize,
    /// Least recently used first.
    entries: Vec<(String, Vec<f32>)>,
}

struct Inner {
    entries: LruCache<String, Vec<f32>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    unflushed: usize,
}

pub struct EmbeddingCache {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
    embedder_id: String,
    dim: usize,
    flush_every: usize,
}

impl EmbeddingCache {
    /// Memory-only cache.
    pub fn in_memory(capacity: usize, embedder_id: impl Into<String>, dim: usize) -> Self {
        Self::build(capacity, embedder_id.into(), dim, None, usize::MAX)
    }

    /// Open (or start) the cache file at `path`. Never fails: unreadable,
    /// corrupt or foreign files yield an empty cache.
    pub fn open(path: impl Into<PathBuf>, capacity: usize, flush_every: usize, embedder_id: impl Into<String>, dim: usize) -> Self {
        let path = path.into();
        let cache = Self::build(capacity, embedder_id.into(), dim, Some(path.clone()), flush_every.max(1));
        match read_cache_file(&path) {
            Ok(None) => {}
            Ok(Some(file)) if file.embedder_id == cache.embedder_id && file.dim == dim => {
                let mut inner = cache.inner.lock();
                for (hash, vector) in file.entries.into_iter().filter(|(_, v)| v.len() == dim) {
                    inner.entries.put(hash, vector);
                }
                tracing::debug!(path = %path.display(), entries = inner.entries.len(), "loaded embedding cache");
            }
            Ok(Some(file)) => {
                tracing::warn!(
                    path = %path.display(),
                    found = %file.embedder_id,
                    expected = %cache.embedder_id,
                    "embedding cache written by another embedder; starting empty"
                );
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "unreadable embedding cache; starting empty"),
        }
        cache
    }

    fn build(capacity: usize, embedder_id: String, dim: usize, path: Option<PathBuf>, flush_every: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner { entries: LruCache::new(capacity), hits: 0, misses: 0, evictions: 0, unflushed: 0 }),
            path,
            embedder_id,
            dim,
            flush_every,
        }
    }

    pub fn len(&self) -> usize { self.inner.lock().entries.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn get(&self, hash: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock();
        let found = inner.entries.get(hash).cloned();
        if found.is_some() { inner.hits += 1 } else { inner.misses += 1 }
        found
    }

    /// Look up many hashes at once; absent hashes are simply missing from the map.
    pub fn get_many(&self, hashes: &[String]) -> HashMap<String, Vec<f32>> {
        let mut inner = self.inner.lock();
        let mut out = HashMap::with_capacity(hashes.len());
        for h in hashes {
            if out.contains_key(h) { continue; }
            match inner.entries.get(h).cloned() {
                Some(v) => { out.insert(h.clone(), v); inner.hits += 1; }
                None => inner.misses += 1,
            }
        }
        out
    }

    /// Insert entries; flushes to disk every `flush_every` insertions.
    /// A failed flush is logged and does not fail the insert.
    pub fn put_many(&self, entries: impl IntoIterator<Item = (String, Vec<f32>)>) {
        let should_flush = {
            let mut inner = self.inner.lock();
            for (hash, vector) in entries {
                if vector.len() != self.dim { continue; }
                if let Some((evicted, _)) = inner.entries.push(hash.clone(), vector) {
                    if evicted != hash { inner.evictions += 1; }
                }
                inner.unflushed += 1;
            }
            self.path.is_some() && inner.unflushed >= self.flush_every
        };
        if should_flush {
            if let Err(e) = self.flush() {
                tracing::warn!(error = %e, "embedding cache flush failed");
            }
        }
    }

    /// Write the cache file atomically (temp file + rename). No-op for
    /// memory-only caches.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let file = {
            let mut inner = self.inner.lock();
            inner.unflushed = 0;
            CacheFile {
                embedder_id: self.embedder_id.clone(),
                dim: self.dim,
                entries: inner.entries.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect(),
            }
        };
        let bytes = bincode::serialize(&file).map_err(|e| Error::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), entries = file.entries.len(), "flushed embedding cache");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            capacity: inner.entries.cap().get(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

fn read_cache_file(path: &Path) -> Result<Option<CacheFile>> {
    if !path.exists() { return Ok(None); }
    let bytes = fs::read(path)?;
    let file = bincode::deserialize(&bytes).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(Some(file))
}
