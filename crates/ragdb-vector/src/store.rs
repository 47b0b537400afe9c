//! Document store + vector index kept in lockstep.
//!
//! `positions[i]` names the document whose vector sits at index slot `i`, or
//! `None` for a tombstone left by a delete or an update. `slots` is the
//! inverse map for live documents. Every mutation validates its input before
//! touching any state, so a failed call leaves the store unchanged.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::Utc;
use ragdb_core::types::DocumentId;
use ragdb_core::{Document, Error, MetadataFilter, Result};

use crate::documents::DocumentStore;
use crate::index::{build_index, IndexParams, VectorIndex};
use crate::persist::{self, DOCUMENTS_FILE, INDEX_FILE, STATS_FILE};
use crate::stats::VectorStoreStats;

pub struct VectorStore {
    params: IndexParams,
    documents: DocumentStore,
    index: Box<dyn VectorIndex>,
    positions: Vec<Option<DocumentId>>,
    slots: HashMap<DocumentId, usize>,
}

/// Keep an unusable `documents.json` as `documents.json.corrupt` so the next
/// persist does not overwrite the only copy of the corpus text.
fn move_aside(path: &Path) -> Result<()> {
    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupt");
    fs::rename(path, &aside)?;
    Ok(())
}

impl VectorStore {
    pub fn new(params: IndexParams) -> Self {
        let index = build_index(&params);
        Self { params, documents: DocumentStore::new(), index, positions: Vec::new(), slots: HashMap::new() }
    }

    /// Open the store persisted under `dir`.
    ///
    /// Missing files mean an empty store. An unreadable `documents.json`, or
    /// one whose embeddings do not have the configured dimension, is moved
    /// aside and the store starts empty. A missing, corrupt or
    /// mismatched `index.bin` is replaced by an index rebuilt from the
    /// documents.
    pub fn open(dir: &Path, params: IndexParams) -> Result<Self> {
        let mut store = Self::new(params);
        let docs_path = dir.join(DOCUMENTS_FILE);
        match persist::load_documents(&docs_path) {
            Ok(Some(documents)) => {
                let dim = store.params.dim;
                let unusable = documents
                    .all()
                    .find(|d| d.embedding.as_ref().map(Vec::len) != Some(dim))
                    .map(|d| d.id.clone());
                match unusable {
                    Some(id) => {
                        tracing::warn!(id = %id, dim, "stored embeddings do not match the index dimension; starting empty");
                        move_aside(&docs_path)?;
                    }
                    None => store.documents = documents,
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(path = %docs_path.display(), error = %e, "unreadable document store; starting empty");
                move_aside(&docs_path)?;
            }
        }

        match persist::load_index_file(&dir.join(INDEX_FILE), &store.params) {
            Ok(Some((index, positions))) if store.positions_consistent(&positions) => {
                store.index = index;
                store.set_positions(positions);
            }
            Ok(Some(_)) => {
                tracing::warn!("index position map disagrees with documents; rebuilding");
                store.rebuild()?;
            }
            Ok(None) => {
                if !store.documents.is_empty() {
                    tracing::info!(documents = store.documents.len(), "no index file; rebuilding from documents");
                }
                store.rebuild()?;
            }
            Err(e) => {
                tracing::warn!(error = %e, "index unusable; rebuilding from documents");
                store.rebuild()?;
            }
        }
        Ok(store)
    }

    /// Every live document appears exactly once and nothing else does.
    fn positions_consistent(&self, positions: &[Option<DocumentId>]) -> bool {
        let live: Vec<&DocumentId> = positions.iter().flatten().collect();
        let unique: HashSet<&DocumentId> = live.iter().copied().collect();
        live.len() == self.documents.len()
            && unique.len() == live.len()
            && live.iter().all(|id| self.documents.contains(id))
    }

    fn set_positions(&mut self, positions: Vec<Option<DocumentId>>) {
        self.slots = positions
            .iter()
            .enumerate()
            .filter_map(|(i, id)| id.as_ref().map(|id| (id.clone(), i)))
            .collect();
        self.positions = positions;
    }

    pub fn params(&self) -> &IndexParams { &self.params }

    pub fn dim(&self) -> usize { self.params.dim }

    /// Live document count.
    pub fn len(&self) -> usize { self.documents.len() }

    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    pub fn get(&self, id: &str) -> Option<&Document> { self.documents.get(id) }

    pub fn documents(&self) -> &DocumentStore { &self.documents }

    pub fn allocate_id(&mut self, source: &str) -> DocumentId { self.documents.allocate_id(source) }

    pub fn index_slots(&self) -> usize { self.positions.len() }

    pub fn tombstones(&self) -> usize { self.positions.len() - self.slots.len() }

    pub fn tombstone_ratio(&self) -> f32 {
        if self.positions.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.tombstones() as f32 / self.positions.len() as f32;
        ratio
    }

    pub fn needs_rebuild(&self) -> bool { self.tombstone_ratio() > self.params.rebuild_tombstone_ratio }

    fn embedding_of<'a>(&self, doc: &'a Document) -> Result<&'a Vec<f32>> {
        let v = doc
            .embedding
            .as_ref()
            .ok_or_else(|| Error::DimensionMismatch { expected: self.params.dim, got: 0 })?;
        if v.len() != self.params.dim {
            return Err(Error::DimensionMismatch { expected: self.params.dim, got: v.len() });
        }
        Ok(v)
    }

    /// Add new documents, all or nothing. Returns the number added.
    pub fn add(&mut self, docs: Vec<Document>) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut vectors = Vec::with_capacity(docs.len());
        for doc in &docs {
            if self.documents.contains(&doc.id) || !seen.insert(doc.id.as_str()) {
                return Err(Error::DuplicateId(doc.id.clone()));
            }
            vectors.push(self.embedding_of(doc)?.clone());
        }
        self.index.add(&vectors)?;
        let added = docs.len();
        for doc in docs {
            self.slots.insert(doc.id.clone(), self.positions.len());
            self.positions.push(Some(doc.id.clone()));
            self.documents.put(doc);
        }
        Ok(added)
    }

    /// Replace an existing document: its old slot becomes a tombstone and the
    /// new vector is appended.
    pub fn update(&mut self, doc: Document) -> Result<()> {
        let Some(&old) = self.slots.get(&doc.id) else {
            return Err(Error::NotFound(doc.id));
        };
        let vector = self.embedding_of(&doc)?.clone();
        self.index.add(std::slice::from_ref(&vector))?;
        self.positions[old] = None;
        self.slots.insert(doc.id.clone(), self.positions.len());
        self.positions.push(Some(doc.id.clone()));
        self.documents.put(doc);
        Ok(())
    }

    /// Remove a document; its slot is tombstoned until the next rebuild.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(slot) = self.slots.remove(id) else { return false };
        self.positions[slot] = None;
        self.documents.delete(id)
    }

    /// Rebuild the index from stored embeddings in store order, dropping tombstones.
    pub fn rebuild(&mut self) -> Result<()> {
        let mut ids = Vec::with_capacity(self.documents.len());
        let mut vectors = Vec::with_capacity(self.documents.len());
        for doc in self.documents.all() {
            vectors.push(self.embedding_of(doc)?.clone());
            ids.push(Some(doc.id.clone()));
        }
        let mut index = build_index(&self.params);
        index.add(&vectors)?;
        self.index = index;
        self.set_positions(ids);
        tracing::info!(documents = self.documents.len(), kind = %self.params.kind, "rebuilt vector index");
        Ok(())
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.index.reset();
        self.positions.clear();
        self.slots.clear();
    }

    /// Up to `n` nearest live documents passing `filter`, ascending by distance.
    ///
    /// Tombstoned slots are over-fetched and skipped. With a filter the
    /// search widens until `n` matches are found or the index is exhausted.
    pub fn search(&self, query: &[f32], n: usize, filter: Option<&MetadataFilter>) -> Result<Vec<(&Document, f32)>> {
        if query.len() != self.params.dim {
            return Err(Error::DimensionMismatch { expected: self.params.dim, got: query.len() });
        }
        let filter = filter.filter(|f| !f.is_empty());
        let n = n.min(self.documents.len());
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut fetch = n + self.tombstones();
        loop {
            let mut hits = Vec::with_capacity(n);
            for neighbor in self.index.search(query, fetch) {
                let Some(Some(id)) = self.positions.get(neighbor.position) else { continue };
                let Some(doc) = self.documents.get(id) else { continue };
                if filter.map_or(true, |f| f.matches(&doc.metadata)) {
                    hits.push((doc, neighbor.distance));
                    if hits.len() == n {
                        break;
                    }
                }
            }
            if hits.len() >= n || fetch >= self.index.len() {
                tracing::debug!(fetched = fetch, returned = hits.len(), "vector search");
                return Ok(hits);
            }
            fetch = (fetch * 2).min(self.index.len());
        }
    }

    pub fn stats(&self) -> VectorStoreStats {
        let mut categories = BTreeMap::new();
        let mut sources = BTreeMap::new();
        let mut content_bytes = 0;
        for doc in self.documents.all() {
            *categories.entry(doc.category().to_string()).or_insert(0) += 1;
            if let Some(source) = doc.source() {
                *sources.entry(source.to_string()).or_insert(0) += 1;
            }
            content_bytes += doc.id.len() + doc.content.len();
        }
        VectorStoreStats {
            document_count: self.documents.len(),
            dimension: self.params.dim,
            index_kind: self.params.kind,
            metric: self.params.metric,
            index_slots: self.positions.len(),
            tombstones: self.tombstones(),
            categories,
            sources,
            memory_bytes: self.index.memory_bytes() + content_bytes,
            generated_at: Utc::now(),
        }
    }

    /// Write `documents.json`, `index.bin` and `stats.json` under `dir`.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        persist::save_documents(&dir.join(DOCUMENTS_FILE), &self.documents)?;
        persist::save_index(&dir.join(INDEX_FILE), self.index.as_ref(), &self.positions)?;
        persist::save_stats(&dir.join(STATS_FILE), &self.stats())?;
        tracing::info!(dir = %dir.display(), documents = self.documents.len(), "persisted vector store");
        Ok(())
    }
}
