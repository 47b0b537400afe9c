use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use ragdb_core::{IndexKind, Metric};

/// Read-only snapshot derived from the document store and index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreStats {
    pub document_count: usize,
    pub dimension: usize,
    pub index_kind: IndexKind,
    pub metric: Metric,
    pub index_slots: usize,
    pub tombstones: usize,
    pub categories: BTreeMap<String, usize>,
    pub sources: BTreeMap<String, usize>,
    pub memory_bytes: usize,
    pub generated_at: DateTime<Utc>,
}
