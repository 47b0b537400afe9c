//! Query path: preprocess, embed, search, filter, score, assemble context.

use parking_lot::RwLock;
use std::sync::Arc;

use ragdb_core::{Error, MetadataFilter, Result, RetrievalResult, ScoredDocument};
use ragdb_embed::EmbeddingGenerator;
use ragdb_vector::VectorStore;

use crate::context::assemble_context;
use crate::query::preprocess_query;
use crate::scoring::RelevanceScorer;

pub struct Retriever {
    generator: Arc<EmbeddingGenerator>,
    scorer: Box<dyn RelevanceScorer>,
    max_context_chars: usize,
}

impl Retriever {
    pub fn new(generator: Arc<EmbeddingGenerator>, scorer: Box<dyn RelevanceScorer>, max_context_chars: usize) -> Self {
        Self { generator, scorer, max_context_chars }
    }

    pub fn set_scorer(&mut self, scorer: Box<dyn RelevanceScorer>) { self.scorer = scorer; }

    pub async fn retrieve(
        &self,
        store: &RwLock<VectorStore>,
        query_id: String,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievalResult> {
        if k == 0 || store.read().is_empty() {
            return Ok(RetrievalResult::empty(query_id, query));
        }
        let processed = preprocess_query(query);
        let vector = self
            .generator
            .generate_async(std::slice::from_ref(&processed), 1)
            .await?
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("no query embedding returned".into()))?;

        let mut documents: Vec<ScoredDocument> = {
            let store = store.read();
            let fetch = k.saturating_mul(2).min(store.len());
            store
                .search(&vector, fetch, filter)?
                .into_iter()
                .map(|(doc, distance)| {
                    let mut document = doc.clone();
                    document.embedding = None;
                    let score = self.scorer.score(&processed, &document, distance);
                    ScoredDocument { document, distance, score }
                })
                .collect()
        };
        documents.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        documents.truncate(k);
        tracing::debug!(query = %processed, returned = documents.len(), "retrieved");

        let context = assemble_context(&documents, self.max_context_chars);
        Ok(RetrievalResult { query_id, query: query.to_string(), documents, context })
    }
}
