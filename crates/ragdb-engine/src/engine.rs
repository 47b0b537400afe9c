//! The RAG orchestrator: owns the vector store, the embedding pipeline and
//! the feedback log for one corpus under `data_dir`.
//!
//! Queries run concurrently under a read lock. Mutations embed first, then
//! take the async mutation lock followed by the store write lock, so a
//! persist never interleaves with an in-flight add.

use parking_lot::RwLock;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use ragdb_core::config::EngineConfig;
use ragdb_core::metadata::{KeywordExtractor, MetadataExtractor};
use ragdb_core::source::{SourceLoader, SourceText};
use ragdb_core::text::{clean, Chunker};
use ragdb_core::types::DocumentId;
use ragdb_core::{Document, Embedder, Error, Metadata, MetadataFilter, MetadataValue, Result, RetrievalResult};
use ragdb_embed::{default_embedder, CacheStats, EmbeddingCache, EmbeddingGenerator, CACHE_FILE};
use ragdb_vector::{IndexParams, VectorStore, VectorStoreStats};

use crate::feedback::{FeedbackEntry, FeedbackLog, FEEDBACK_FILE};
use crate::retriever::Retriever;
use crate::scoring::{scorer_for, RelevanceScorer};

/// Chunks of one source, tagged and embedded but not yet committed.
struct Staged {
    source: String,
    chunks: Vec<String>,
    metadata: Vec<Metadata>,
    vectors: Vec<Vec<f32>>,
}

pub struct RagEngine {
    config: EngineConfig,
    chunker: Chunker,
    extractor: Box<dyn MetadataExtractor>,
    generator: Arc<EmbeddingGenerator>,
    retriever: Retriever,
    store: RwLock<VectorStore>,
    mutation: Mutex<()>,
    feedback: FeedbackLog,
    session: String,
    query_seq: AtomicU64,
}

impl RagEngine {
    /// Open the corpus under `config.data_dir` with the configured embedder.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let embedder = default_embedder(&config.embedding)?;
        Self::with_embedder(config, embedder)
    }

    pub fn with_embedder(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let dim = config.embedding.dimension;
        if embedder.dim() != dim {
            return Err(Error::DimensionMismatch { expected: dim, got: embedder.dim() });
        }
        fs::create_dir_all(&config.data_dir)?;

        let cache = Arc::new(EmbeddingCache::open(
            config.data_dir.join(CACHE_FILE),
            config.embedding.cache_capacity,
            config.embedding.cache_flush_every,
            embedder.id(),
            dim,
        ));
        let generator = Arc::new(EmbeddingGenerator::new(embedder, cache, config.embedding.max_concurrency));
        let retriever = Retriever::new(
            Arc::clone(&generator),
            scorer_for(config.retrieval.scorer),
            config.retrieval.max_context_chars,
        );
        let store = VectorStore::open(&config.data_dir, IndexParams::from_config(&config.index, dim))?;
        info!(
            data_dir = %config.data_dir.display(),
            documents = store.len(),
            index = %config.index.kind,
            "opened rag engine"
        );
        Ok(Self {
            chunker: Chunker::new(config.chunking.clone())?,
            extractor: Box::new(KeywordExtractor::default()),
            generator,
            retriever,
            store: RwLock::new(store),
            mutation: Mutex::new(()),
            feedback: FeedbackLog::new(config.data_dir.join(FEEDBACK_FILE)),
            session: chrono::Utc::now().format("%Y%m%d%H%M%S").to_string(),
            query_seq: AtomicU64::new(0),
            config,
        })
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn MetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    #[must_use]
    pub fn with_scorer(mut self, scorer: Box<dyn RelevanceScorer>) -> Self {
        self.retriever.set_scorer(scorer);
        self
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Clean, chunk, tag, embed and commit `text`. Returns the number of
    /// documents created; empty input creates none. If the commit cannot be
    /// persisted none of the chunks remain in the corpus.
    #[instrument(skip(self, text), fields(bytes = text.len()))]
    pub async fn ingest(&self, text: &str, source: &str) -> Result<usize> {
        let Some(staged) = self.stage(text, source).await? else { return Ok(0) };
        let added = self.commit(vec![staged]).await?;
        info!(source, chunks = added, "ingested");
        Ok(added)
    }

    /// Ingest every `.txt`/`.md` file under `dir`, using each file's relative
    /// path (without extension) as its source. All files are embedded first
    /// and committed with a single persist. Returns documents created.
    #[instrument(skip(self))]
    pub async fn ingest_directory(&self, dir: &Path) -> Result<usize> {
        let sources = SourceLoader::new().load_directory(dir)?;
        self.ingest_sources(&sources, |_| {}).await
    }

    /// Embed every loaded source, calling `on_staged` after each one, then
    /// commit them together with a single persist.
    pub async fn ingest_sources(&self, sources: &[SourceText], mut on_staged: impl FnMut(&SourceText)) -> Result<usize> {
        let mut staged = Vec::with_capacity(sources.len());
        for source in sources {
            if let Some(s) = self.stage(&source.text, &source.source).await? {
                staged.push(s);
            }
            on_staged(source);
        }
        let added = self.commit(staged).await?;
        info!(files = sources.len(), documents = added, "ingested sources");
        Ok(added)
    }

    /// Chunk, tag and embed one source outside any lock.
    async fn stage(&self, text: &str, source: &str) -> Result<Option<Staged>> {
        let chunks: Vec<String> = self.chunker.split(text).into_iter().filter(|c| !c.is_empty()).collect();
        if chunks.is_empty() {
            return Ok(None);
        }
        let total = chunks.len();
        let metadata: Vec<Metadata> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut m = self.extractor.extract(chunk);
                m.insert("source".into(), MetadataValue::from(source));
                m.insert("chunk_id".into(), MetadataValue::from(i));
                m.insert("total_chunks".into(), MetadataValue::from(total));
                m
            })
            .collect();
        let vectors = self.generator.generate_async(&chunks, self.config.embedding.batch_size).await?;
        Ok(Some(Staged { source: source.to_string(), chunks, metadata, vectors }))
    }

    /// One all-or-nothing add followed by one persist. A failed persist
    /// removes the added documents again.
    async fn commit(&self, staged: Vec<Staged>) -> Result<usize> {
        if staged.is_empty() {
            return Ok(0);
        }
        let _mutation = self.mutation.lock().await;
        let ids: Vec<DocumentId> = {
            let mut store = self.store.write();
            let mut docs = Vec::new();
            for batch in staged {
                for ((chunk, m), v) in batch.chunks.into_iter().zip(batch.metadata).zip(batch.vectors) {
                    docs.push(Document::new(store.allocate_id(&batch.source), chunk).with_metadata(m).with_embedding(v));
                }
            }
            let ids = docs.iter().map(|d| d.id.clone()).collect();
            store.add(docs)?;
            ids
        };
        if let Err(e) = self.persist_locked() {
            let mut store = self.store.write();
            for id in &ids {
                store.delete(id);
            }
            warn!(documents = ids.len(), error = %e, "persist failed; rolled back added documents");
            Self::compact(&mut store);
            return Err(e);
        }
        Ok(ids.len())
    }

    /// Retrieve up to `k` documents for `query`, optionally filtered.
    #[instrument(skip(self, filter))]
    pub async fn query(&self, query: &str, k: usize, filter: Option<&MetadataFilter>) -> Result<RetrievalResult> {
        let query_id = format!("q-{}-{}", self.session, self.query_seq.fetch_add(1, Ordering::Relaxed) + 1);
        self.retriever.retrieve(&self.store, query_id, query, k, filter).await
    }

    /// Drop every document and reset the index, persisting immediately.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        let _mutation = self.mutation.lock().await;
        self.store.write().clear();
        self.persist_locked()?;
        info!("cleared corpus");
        Ok(())
    }

    /// Record relevance feedback for a prior query. Never touches the index.
    pub fn feedback(&self, query_id: &str, relevant: bool, comments: Option<&str>) -> Result<FeedbackEntry> {
        self.feedback.record(query_id, relevant, comments)
    }

    pub fn feedback_entries(&self) -> Result<Vec<FeedbackEntry>> { self.feedback.entries() }

    /// Replace the content of one document, re-deriving its metadata and
    /// embedding. `source`, `chunk_id` and `total_chunks` are kept.
    #[instrument(skip(self, content))]
    pub async fn update(&self, id: &str, content: &str) -> Result<()> {
        let previous = self.document(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        let content = clean(content);
        let mut metadata = self.extractor.extract(&content);
        for key in ["source", "chunk_id", "total_chunks"] {
            if let Some(v) = previous.metadata.get(key) {
                metadata.insert(key.into(), v.clone());
            }
        }
        let vector = self
            .generator
            .generate_async(std::slice::from_ref(&content), 1)
            .await?
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("no embedding returned".into()))?;

        let _mutation = self.mutation.lock().await;
        self.store
            .write()
            .update(Document::new(id, content).with_metadata(metadata).with_embedding(vector))?;
        self.rebuild_if_needed()?;
        if let Err(e) = self.persist_locked() {
            let mut store = self.store.write();
            if let Err(restore) = store.update(previous) {
                warn!(id, error = %restore, "could not restore document after failed persist");
            }
            Self::compact(&mut store);
            return Err(e);
        }
        Ok(())
    }

    /// Delete one document. Returns `false` when it did not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let _mutation = self.mutation.lock().await;
        let Some(previous) = self.document(id) else { return Ok(false) };
        self.store.write().delete(id);
        self.rebuild_if_needed()?;
        if let Err(e) = self.persist_locked() {
            let mut store = self.store.write();
            if let Err(restore) = store.add(vec![previous]) {
                warn!(id, error = %restore, "could not restore document after failed persist");
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Rebuild the index from stored embeddings, dropping tombstones.
    #[instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<()> {
        let _mutation = self.mutation.lock().await;
        self.store.write().rebuild()?;
        self.persist_locked()
    }

    pub async fn persist(&self) -> Result<()> {
        let _mutation = self.mutation.lock().await;
        self.persist_locked()
    }

    /// Best-effort rebuild after a rollback left tombstones behind.
    fn compact(store: &mut VectorStore) {
        if store.needs_rebuild() {
            if let Err(e) = store.rebuild() {
                warn!(error = %e, "rebuild after rollback failed");
            }
        }
    }

    fn rebuild_if_needed(&self) -> Result<()> {
        let mut store = self.store.write();
        if store.needs_rebuild() {
            info!(tombstones = store.tombstones(), slots = store.index_slots(), "tombstone ratio exceeded; rebuilding");
            store.rebuild()?;
        }
        Ok(())
    }

    /// Caller holds the mutation lock.
    fn persist_locked(&self) -> Result<()> {
        self.store.read().persist(&self.config.data_dir)?;
        if let Err(e) = self.generator.cache().flush() {
            warn!(error = %e, "embedding cache flush failed");
        }
        Ok(())
    }

    pub fn stats(&self) -> VectorStoreStats { self.store.read().stats() }

    pub fn cache_stats(&self) -> CacheStats { self.generator.cache().stats() }

    pub fn document(&self, id: &str) -> Option<Document> { self.store.read().get(id).cloned() }

    pub fn len(&self) -> usize { self.store.read().len() }

    pub fn is_empty(&self) -> bool { self.store.read().is_empty() }
}

impl Drop for RagEngine {
    fn drop(&mut self) {
        if let Err(e) = self.generator.cache().flush() {
            warn!(error = %e, "embedding cache flush on shutdown failed");
        }
    }
}
