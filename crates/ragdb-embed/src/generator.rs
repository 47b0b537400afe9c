//! Cache-first batch embedding.
//!
//! Hashes every input, resolves hits from the [`EmbeddingCache`], embeds the
//! distinct misses in batches, writes them through to the cache and merges
//! everything back in input order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;

use ragdb_core::{Embedder, Error, Result};

use crate::cache::{content_hash, EmbeddingCache};

pub struct EmbeddingGenerator {
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    permits: Arc<Semaphore>,
}

struct Plan {
    /// One hash per input, in input order.
    hashes: Vec<String>,
    resolved: HashMap<String, Vec<f32>>,
    /// Distinct uncached `(hash, text)` pairs in first-seen order.
    misses: Vec<(String, String)>,
}

impl EmbeddingGenerator {
    pub fn new(embedder: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>, max_concurrency: usize) -> Self {
        Self { embedder, cache, permits: Arc::new(Semaphore::new(max_concurrency.max(1))) }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    pub fn cache(&self) -> &Arc<EmbeddingCache> { &self.cache }

    pub fn dim(&self) -> usize { self.embedder.dim() }

    fn plan(&self, texts: &[String]) -> Plan {
        let hashes: Vec<String> = texts.iter().map(|t| content_hash(t)).collect();
        let resolved = self.cache.get_many(&hashes);
        let mut seen = HashSet::new();
        let misses = hashes
            .iter()
            .zip(texts)
            .filter(|(h, _)| !resolved.contains_key(*h) && seen.insert((*h).clone()))
            .map(|(h, t)| (h.clone(), t.clone()))
            .collect::<Vec<_>>();
        tracing::debug!(inputs = texts.len(), hits = texts.len() - misses.len(), misses = misses.len(), "embedding plan");
        Plan { hashes, resolved, misses }
    }

    fn finish(&self, mut plan: Plan, fresh: Vec<(String, Vec<f32>)>) -> Result<Vec<Vec<f32>>> {
        self.cache.put_many(fresh.iter().cloned());
        plan.resolved.extend(fresh);
        plan.hashes
            .iter()
            .map(|h| {
                plan.resolved
                    .get(h)
                    .cloned()
                    .ok_or_else(|| Error::EmbeddingUnavailable(format!("no embedding produced for {h}")))
            })
            .collect()
    }

    /// Embed `texts`, one output vector per input in the same order.
    pub fn generate(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let plan = self.plan(texts);
        let mut fresh = Vec::with_capacity(plan.misses.len());
        for batch in plan.misses.chunks(batch_size.max(1)) {
            let inputs: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
            match embed_checked(self.embedder.as_ref(), &inputs) {
                Ok(vectors) => fresh.extend(batch.iter().map(|(h, _)| h.clone()).zip(vectors)),
                Err(e) => {
                    self.cache.put_many(fresh);
                    return Err(e);
                }
            }
        }
        self.finish(plan, fresh)
    }

    /// Like [`generate`](Self::generate), with miss batches running on the
    /// blocking pool, at most `max_concurrency` at a time.
    pub async fn generate_async(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let plan = self.plan(texts);
        let tasks = plan.misses.chunks(batch_size.max(1)).map(|batch| {
            let embedder = Arc::clone(&self.embedder);
            let permits = Arc::clone(&self.permits);
            let (hashes, inputs): (Vec<String>, Vec<String>) = batch.iter().cloned().unzip();
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;
                let vectors = tokio::task::spawn_blocking(move || embed_checked(embedder.as_ref(), &inputs))
                    .await
                    .map_err(|e| Error::EmbeddingUnavailable(format!("embedding task failed: {e}")))??;
                Ok::<_, Error>(hashes.into_iter().zip(vectors).collect::<Vec<_>>())
            }
        });
        let mut fresh = Vec::with_capacity(plan.misses.len());
        let mut failure = None;
        for outcome in futures::future::join_all(tasks).await {
            match outcome {
                Ok(pairs) => fresh.extend(pairs),
                Err(e) => { failure.get_or_insert(e); }
            }
        }
        if let Some(e) = failure {
            self.cache.put_many(fresh);
            return Err(e);
        }
        self.finish(plan, fresh)
    }
}

/// Call the model and reject outputs that break the 1:1, fixed-dimension contract.
fn embed_checked(embedder: &dyn Embedder, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
    let vectors = embedder.embed_batch(inputs)?;
    if vectors.len() != inputs.len() {
        return Err(Error::EmbeddingUnavailable(format!(
            "embedder returned {} vectors for {} inputs",
            vectors.len(),
            inputs.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dim()) {
        return Err(Error::DimensionMismatch { expected: embedder.dim(), got: bad.len() });
    }
    Ok(vectors)
}
