//! Insertion-ordered document store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use ragdb_core::types::DocumentId;
use ragdb_core::{Document, MetadataFilter};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStore {
    /// Next id sequence number; never reused, survives `clear`.
    next_seq: u64,
    documents: IndexMap<DocumentId, Document>,
}

impl DocumentStore {
    pub fn new() -> Self { Self::default() }

    /// Allocate a fresh id of the form `{source}-{seq}`.
    pub fn allocate_id(&mut self, source: &str) -> DocumentId {
        loop {
            let id = format!("{source}-{}", self.next_seq);
            self.next_seq += 1;
            if !self.documents.contains_key(&id) {
                return id;
            }
        }
    }

    /// Insert or replace; a replaced document keeps its position in the order.
    pub fn put(&mut self, doc: Document) -> Option<Document> {
        self.documents.insert(doc.id.clone(), doc)
    }

    pub fn get(&self, id: &str) -> Option<&Document> { self.documents.get(id) }

    pub fn contains(&self, id: &str) -> bool { self.documents.contains_key(id) }

    pub fn delete(&mut self, id: &str) -> bool { self.documents.shift_remove(id).is_some() }

    pub fn all(&self) -> impl Iterator<Item = &Document> { self.documents.values() }

    pub fn len(&self) -> usize { self.documents.len() }

    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    /// Linear scan, in insertion order.
    pub fn find_by_metadata(&self, filter: &MetadataFilter) -> Vec<&Document> {
        self.documents.values().filter(|d| filter.matches(&d.metadata)).collect()
    }

    pub fn clear(&mut self) { self.documents.clear(); }
}
